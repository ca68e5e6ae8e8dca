use serde::{Deserialize, Serialize};
use std::fmt;

/// Action being authorized.
///
/// The set is closed and versioned: new operations are added as new tags,
/// never by reinterpreting existing ones, so wire tags stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Operation {
    /// Owner-initiated transfer
    Transfer = 0,
    /// Transfer as part of a sale
    SaleTransfer = 1,
    /// Grant of a delegate authority
    Delegate = 2,
    /// Destruction of the asset
    Burn = 3,
    /// Migration to a new asset standard
    Migrate = 4,
}

impl Operation {
    /// All operations, in wire-tag order.
    pub const ALL: [Operation; 5] = [
        Operation::Transfer,
        Operation::SaleTransfer,
        Operation::Delegate,
        Operation::Burn,
        Operation::Migrate,
    ];

    /// Wire tag for this operation.
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parse a wire tag. Unknown tags are rejected by the caller as a
    /// structural error.
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Operation::Transfer),
            1 => Some(Operation::SaleTransfer),
            2 => Some(Operation::Delegate),
            3 => Some(Operation::Burn),
            4 => Some(Operation::Migrate),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Transfer => "transfer",
            Operation::SaleTransfer => "sale_transfer",
            Operation::Delegate => "delegate",
            Operation::Burn => "burn",
            Operation::Migrate => "migrate",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "transfer" => Some(Operation::Transfer),
            "sale_transfer" => Some(Operation::SaleTransfer),
            "delegate" => Some(Operation::Delegate),
            "burn" => Some(Operation::Burn),
            "migrate" => Some(Operation::Migrate),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt;

use super::identity::Identity;

/// Small-integer key identifying a payload field.
///
/// Well-known keys are named constants; the key space itself is a single
/// byte to match the wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayloadKey(pub u8);

impl PayloadKey {
    /// Amount involved in the operation, in base units.
    pub const AMOUNT: PayloadKey = PayloadKey(0);
    /// Source address of a transfer.
    pub const SOURCE: PayloadKey = PayloadKey(1);
    /// Destination address of a transfer.
    pub const DESTINATION: PayloadKey = PayloadKey(2);
    /// Authority requesting the operation.
    pub const AUTHORITY: PayloadKey = PayloadKey(3);
    /// Target asset or account the operation applies to.
    pub const TARGET: PayloadKey = PayloadKey(4);
    /// Derivation seeds supporting a derived-address proof.
    pub const SEEDS: PayloadKey = PayloadKey(5);
    /// Unix seconds of the most recent prior occurrence, for frequency rules.
    pub const LAST_ACTIVITY: PayloadKey = PayloadKey(6);

    pub fn as_str(&self) -> &'static str {
        match *self {
            PayloadKey::AMOUNT => "amount",
            PayloadKey::SOURCE => "source",
            PayloadKey::DESTINATION => "destination",
            PayloadKey::AUTHORITY => "authority",
            PayloadKey::TARGET => "target",
            PayloadKey::SEEDS => "seeds",
            PayloadKey::LAST_ACTIVITY => "last_activity",
            _ => "custom",
        }
    }
}

impl fmt::Display for PayloadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            "custom" => write!(f, "key#{}", self.0),
            named => write!(f, "{}", named),
        }
    }
}

/// Derivation seed list. SmallVec optimizes for the common case of a
/// handful of short seeds.
pub type SeedList = SmallVec<[Vec<u8>; 4]>;

/// A typed payload fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PayloadValue {
    /// A 32-byte address/identity
    Address(Identity),
    /// An unsigned fixed-width integer
    Number(u64),
    /// An opaque byte sequence (hex in JSON/YAML)
    Bytes(#[serde(with = "hex_bytes")] Vec<u8>),
    /// A nested payload
    Map(Payload),
    /// A derivation seed list (hex per element in JSON/YAML)
    Seeds(#[serde(with = "hex_seeds")] SeedList),
}

impl PayloadValue {
    /// Short name of the variant, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            PayloadValue::Address(_) => "address",
            PayloadValue::Number(_) => "number",
            PayloadValue::Bytes(_) => "bytes",
            PayloadValue::Map(_) => "map",
            PayloadValue::Seeds(_) => "seeds",
        }
    }
}

/// Immutable fact-set describing the context of an operation.
///
/// Keys are unique, order is irrelevant. There is no mutation API beyond
/// the consuming builder, so evaluators always see a frozen snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload {
    entries: BTreeMap<PayloadKey, PayloadValue>,
}

impl Payload {
    pub fn new() -> Self {
        Payload::default()
    }

    /// Consuming builder step; a repeated key replaces the prior value.
    pub fn with(mut self, key: PayloadKey, value: PayloadValue) -> Self {
        self.entries.insert(key, value);
        self
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (PayloadKey, PayloadValue)>) -> Self {
        Payload {
            entries: pairs.into_iter().collect(),
        }
    }

    pub fn get(&self, key: PayloadKey) -> Option<&PayloadValue> {
        self.entries.get(&key)
    }

    /// Typed accessor; `None` for absent key *or* mismatched type. The
    /// evaluator treats both as the field being missing (closed world).
    pub fn number(&self, key: PayloadKey) -> Option<u64> {
        match self.entries.get(&key) {
            Some(PayloadValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn address(&self, key: PayloadKey) -> Option<&Identity> {
        match self.entries.get(&key) {
            Some(PayloadValue::Address(id)) => Some(id),
            _ => None,
        }
    }

    pub fn bytes(&self, key: PayloadKey) -> Option<&[u8]> {
        match self.entries.get(&key) {
            Some(PayloadValue::Bytes(b)) => Some(b.as_slice()),
            _ => None,
        }
    }

    pub fn seeds(&self, key: PayloadKey) -> Option<&SeedList> {
        match self.entries.get(&key) {
            Some(PayloadValue::Seeds(s)) => Some(s),
            _ => None,
        }
    }

    pub fn map(&self, key: PayloadKey) -> Option<&Payload> {
        match self.entries.get(&key) {
            Some(PayloadValue::Map(p)) => Some(p),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in key order (the wire encoding order).
    pub fn iter(&self) -> impl Iterator<Item = (&PayloadKey, &PayloadValue)> {
        self.entries.iter()
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

mod hex_seeds {
    use super::SeedList;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(seeds: &SeedList, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(seeds.iter().map(hex::encode))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SeedList, D::Error> {
        let strings = Vec::<String>::deserialize(deserializer)?;
        strings
            .iter()
            .map(|s| hex::decode(s).map_err(serde::de::Error::custom))
            .collect()
    }
}

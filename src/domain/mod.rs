pub mod identity;
pub mod operation;
pub mod payload;
pub mod ruleset;
pub mod verdict;

pub use identity::{Identity, IdentityError};
pub use operation::Operation;
pub use payload::{Payload, PayloadKey, PayloadValue, SeedList};
pub use ruleset::{RuleSet, RuleSetError, RULE_SET_FORMAT_VERSION};
pub use verdict::{Denial, DenialKind, Verdict};

pub mod loader;
pub mod reload;

pub use loader::{load_rule_set, PolicyError, RuleSetLoader};
pub use reload::RuleSetWatcher;

pub mod api;
pub mod config;
pub mod domain;
pub mod observability;
pub mod policy;
pub mod rules;
pub mod service;
pub mod storage;
pub mod wire;

pub use config::Config;
pub use domain::{Identity, Operation, Payload, PayloadKey, PayloadValue, RuleSet, Verdict};
pub use rules::{evaluate, CompareOp, EvalLimits, Rule};
pub use service::{ValidationService, Validation};
pub use storage::{MemoryStore, RuleSetRef, RuleSetStore};

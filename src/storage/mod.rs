pub mod buffer;
pub mod memory;
pub mod traits;

pub use buffer::{Buffer, MAX_BUFFER_LEN};
pub use memory::MemoryStore;
pub use traits::{BufferStatus, Revision, RuleSetRef, RuleSetStore, StoreError};

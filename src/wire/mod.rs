pub mod address;
pub mod codec;
pub mod instruction;

pub use address::{buffer_address, derived_address, rule_set_address, ADDRESS_PREFIX};
pub use codec::{WireError, WireReader, WireWriter};
pub use instruction::{
    CommitArgs, Instruction, ValidateArgs, WriteToBufferArgs, COMMIT, VALIDATE, WRITE_TO_BUFFER,
};

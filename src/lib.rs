pub mod error;
pub mod register;
pub mod operand;
pub mod isa;
pub mod program;
pub mod memory;
pub mod machine;
pub mod asm;
pub mod ring;
pub mod search;

pub use error::{DecodeError, VmError};
pub use isa::{Instruction, Opcode};
pub use machine::{CancelToken, Exit, JumpMode, Machine, MachineConfig, Status};
pub use operand::Operand;
pub use program::Program;
pub use register::{RegisterId, RegisterSet};

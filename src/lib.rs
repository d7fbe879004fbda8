// Machine model
mod isa;
pub use isa::{sign_extend, Instruction, JsrTarget, Opcode, Operand, TrapVect};
mod memory;
pub use memory::{Memory, KBDR, KBSR, MEMORY_MAX};
mod registers;
pub use registers::{RegisterFile, RunFlag};

// Running
mod runtime;
pub use runtime::{RunState, Status, PC_START};
mod loader;
pub use loader::Image;

// I/O
mod console;
pub use console::{BufferConsole, Console};
pub mod term;

mod error;
pub use error::{Fault, LoadError};

pub mod env;

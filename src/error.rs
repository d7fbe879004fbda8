use std::io;
use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::isa::{Opcode, TrapVect};

/// Failure to place a program image into memory. The run never starts.
#[derive(Debug, Error, Diagnostic)]
pub enum LoadError {
    #[error("Failed to open image {}", path.display())]
    #[diagnostic(
        code(load::open),
        help("check that the file exists and is readable")
    )]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read image stream")]
    #[diagnostic(code(load::read))]
    Read(#[source] io::Error),

    #[error("Image is empty")]
    #[diagnostic(
        code(load::no_orig),
        help("an image must start with a 16-bit origin address")
    )]
    MissingOrigin,

    #[error("Image is not aligned to 16 bits ({len} bytes)")]
    #[diagnostic(
        code(load::misaligned),
        help("images are made of big-endian 16-bit words")
    )]
    Misaligned { len: usize },

    #[error("Image of {words} words at origin 0x{orig:04x} does not fit in memory")]
    #[diagnostic(
        code(load::too_large),
        help("the last word would be placed past address 0xffff")
    )]
    TooLarge { orig: u16, words: usize },

    #[error("Invalid image pattern `{pattern}`")]
    #[diagnostic(code(load::pattern))]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("No image matches `{pattern}`")]
    #[diagnostic(code(load::no_match), help("check the pattern and current directory"))]
    NoMatch { pattern: String },
}

/// Unrecoverable error in the running program. Execution stops immediately.
#[derive(Debug, Error, Diagnostic)]
pub enum Fault {
    #[error("Reserved opcode {opcode} (0x{instr:04x}) at address 0x{addr:04x}")]
    #[diagnostic(
        code(run::reserved_opcode),
        help("RTI and the reserved opcode are not supported; the image may be corrupt")
    )]
    ReservedOpcode { opcode: Opcode, instr: u16, addr: u16 },

    #[error("Unknown trap vector x{vect:02X} at address 0x{addr:04x}")]
    #[diagnostic(
        code(run::unknown_trap),
        help("supported vectors are GETC, OUT, PUTS, IN, PUTSP and HALT (x20-x25)")
    )]
    UnknownTrap { vect: u8, addr: u16 },

    #[error("Console failure during {trap} at address 0x{addr:04x}")]
    #[diagnostic(code(run::console))]
    Console {
        trap: TrapVect,
        addr: u16,
        #[source]
        source: io::Error,
    },
}

impl Fault {
    /// Address of the instruction which caused the fault.
    pub fn addr(&self) -> u16 {
        match self {
            Fault::ReservedOpcode { addr, .. }
            | Fault::UnknownTrap { addr, .. }
            | Fault::Console { addr, .. } => *addr,
        }
    }
}

//! Atomic types of the Sparnel VM: machine words, the instruction set, the
//! function header and local symbol table encodings, and whole-program
//! (de)serialization.
//!
//! A program is a flat stream of [`Word`]s: a four-word function header, the
//! executable section, then the local symbol table. The same layout is used
//! in memory and on disk (`.spo` files), so serialization is a plain
//! little-endian word dump. Cross-platform portability of compiled files is
//! explicitly not a goal.

#![warn(missing_docs)]

mod disasm;
mod instr;
mod opcode;
mod program;
mod type_word;

#[cfg(test)]
mod encoding_tests;

pub use disasm::disassemble;
pub use instr::{
    decode_name, encode_name, name_words, pack_args, packed_arg_words, unpack_args, Instr,
    WORD_BYTES,
};
pub use opcode::{CaptureKind, ConstKind, Opcode, SymEntryKind};
pub use program::{DecodeError, FunctionHeader, Program, SymbolEntry};
pub use type_word::{Tag, TypeFlags, TypeWord};

/// The unit of the bytecode stream: the smallest unsigned integer with at
/// least 32 bits.
pub type Word = u32;

//! Bytecode format of the muali register VM.
//!
//! This crate defines everything the compiler and the interpreter have to
//! agree on: the opcode table and its hybrid one/two-byte encoding, the
//! register-operand encoding, typed immediates, branch offsets, fault
//! reasons, and an encoder/decoder pair plus a disassembler built on top of
//! them.
//!
//! ## Instruction stream layout
//!
//! An instruction is an opcode followed by its operands, all byte-aligned:
//!
//! * Opcodes `0x01..=0x7F` occupy one byte. Opcodes `0x80..` occupy two
//!   bytes: the low byte (high bit set) followed by the high byte. The fetch
//!   path always reads two bytes and masks to [`RAW_OPCODE_BITS`]; a raw
//!   value whose low byte has the high bit clear resolves from the low seven
//!   bits alone, so a stale high byte can never change the operation.
//! * Register operands are 16-bit little-endian indices.
//! * Typed immediates are a [`TypeId`] byte followed by the payload.
//! * Branch offsets are 32-bit signed little-endian values, applied to the
//!   program counter at the point immediately after the offset field.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

mod decode;
mod disasm;
mod encode;
mod fault;
mod imm;
mod opcode;
mod program;


pub use decode::Decoder;
pub use disasm::{Disasm, Instruction, Operand};
pub use encode::Encoder;
pub use fault::{Fault, FaultReason};
pub use imm::{CmpKind, Imm, TypeId};
pub use opcode::{Opcode, RAW_OPCODE_BITS, RAW_OPCODE_MASK};
pub use program::{Function, Program};

/// Register index operand, as read from the instruction stream.
pub type RegisterId = usize;

/// Raw (undecoded) opcode value, already masked to the table width.
pub type RawOpcode = u16;

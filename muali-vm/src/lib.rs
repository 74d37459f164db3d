//! Register VM interpreter for muali bytecode.
//!
//! Execution model: a call allocates a flat register file of
//! `num_vars + num_regs` [`Value`] slots, copies the arguments into the
//! first `num_args` slots, and runs the dispatch loop until a return
//! opcode writes the trampoline, an `EXIT` halts the interpreter, or a
//! fault terminates the call. Dispatch is a loop over a jump table rather
//! than a chain of guaranteed tail calls; nothing observable differs.
//!
//! Execution is single-threaded and cooperative. The only form of
//! reentrancy is the VM calling itself through the `CALL` family, which
//! recurses on the host stack; `BECOME` reuses the live frame instead.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

pub mod error;
pub mod interpreter;
pub mod state;
pub mod value;

pub use error::InterpreterError;
pub use interpreter::Interpreter;
pub use state::ExecuteState;
pub use value::{Value, ValueMap};

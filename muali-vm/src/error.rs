//! Runtime interpreter error implementation.

use muali_asm::{Fault, FaultReason, RawOpcode};

/// Interpreter runtime error variants.
///
/// Every VM fault terminates the current top-level call and surfaces here;
/// handlers never recover locally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InterpreterError {
    /// The execution resulted in a well-formed fault raised by an
    /// instruction.
    #[error("execution fault: {0}")]
    Fault(#[from] Fault),
    /// The requested entry function does not exist in the program.
    #[error("unknown function `{0}`")]
    FunctionNotFound(String),
}

impl InterpreterError {
    /// The fault reason that caused this error, if applicable.
    pub fn fault_reason(&self) -> Option<FaultReason> {
        match self {
            Self::Fault(fault) => Some(fault.reason()),
            _ => None,
        }
    }
}

/// Error type internal to instruction execution.
///
/// A handler raises a bare [`FaultReason`]; the dispatch site decorates it
/// with the raw opcode it was executing. A nested call that already failed
/// carries its own decorated error through unchanged, so a fault deep in a
/// callee reports the callee's instruction, not the `CALL` above it.
#[derive(Debug)]
pub(crate) enum RuntimeError {
    Raise(FaultReason),
    Nested(InterpreterError),
}

impl RuntimeError {
    /// Decorate with the raw opcode the dispatch site was executing.
    pub(crate) fn into_interpreter_error(
        self,
        opcode: RawOpcode,
        previous: Option<RawOpcode>,
    ) -> InterpreterError {
        match self {
            RuntimeError::Raise(reason) => {
                let mut fault = Fault::new(reason, opcode);
                if let Some(prev) = previous {
                    fault = fault.with_previous(prev);
                }
                InterpreterError::Fault(fault)
            }
            RuntimeError::Nested(err) => err,
        }
    }
}

impl From<FaultReason> for RuntimeError {
    fn from(reason: FaultReason) -> Self {
        RuntimeError::Raise(reason)
    }
}

impl From<InterpreterError> for RuntimeError {
    fn from(err: InterpreterError) -> Self {
        RuntimeError::Nested(err)
    }
}

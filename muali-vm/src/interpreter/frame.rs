use std::rc::Rc;

use muali_asm::{FaultReason, Function, RegisterId};

use crate::value::Value;

/// One live call: the function being executed, its program counter, and a
/// flat register file of `num_vars + num_regs` slots.
///
/// Registers `0..num_vars` are the named variable slots (arguments first);
/// everything above is scratch. The whole file starts as `Null` and the
/// compiler guarantees each scratch slot is written before it is read.
#[derive(Debug)]
pub(crate) struct CallFrame {
    pub(crate) func: Rc<Function>,
    pub(crate) pc: usize,
    regs: Vec<Value>,
    tail_called: bool,
}

impl CallFrame {
    /// Build a frame for a call, moving the arguments into the first
    /// `num_args` registers.
    pub(crate) fn new(func: Rc<Function>, args: Vec<Value>) -> Self {
        let mut regs = vec![Value::Null; func.frame_size()];
        for (slot, arg) in regs.iter_mut().zip(args) {
            *slot = arg;
        }
        Self {
            func,
            pc: 0,
            regs,
            tail_called: false,
        }
    }

    /// Replace this frame in place for a tail call.
    ///
    /// The register file is rebuilt for the target function and the program
    /// counter rewinds to its entry; the host stack does not grow.
    pub(crate) fn reset(&mut self, func: Rc<Function>, args: Vec<Value>) {
        let mut regs = vec![Value::Null; func.frame_size()];
        for (slot, arg) in regs.iter_mut().zip(args) {
            *slot = arg;
        }
        self.func = func;
        self.pc = 0;
        self.regs = regs;
        self.tail_called = true;
    }

    /// Whether [`CallFrame::reset`] ran during the current instruction.
    /// Reading the flag clears it.
    pub(crate) fn take_tail_called(&mut self) -> bool {
        std::mem::take(&mut self.tail_called)
    }

    pub(crate) fn reg(&self, index: RegisterId) -> Result<&Value, FaultReason> {
        self.regs
            .get(index)
            .ok_or(FaultReason::RegisterOutOfBounds)
    }

    pub(crate) fn reg_mut(&mut self, index: RegisterId) -> Result<&mut Value, FaultReason> {
        self.regs
            .get_mut(index)
            .ok_or(FaultReason::RegisterOutOfBounds)
    }

    /// Move a value out of a register, leaving `Null` behind.
    pub(crate) fn take_reg(&mut self, index: RegisterId) -> Result<Value, FaultReason> {
        Ok(std::mem::take(self.reg_mut(index)?))
    }
}

//! The register VM: call machinery and instruction dispatch.

use std::collections::BTreeMap;
use std::rc::Rc;

use tracing::trace;

use muali_asm::{Fault, FaultReason, Function, Program};

use crate::error::InterpreterError;
use crate::state::ExecuteState;
use crate::value::Value;

mod alu;
mod executor;
mod flow;
mod frame;

use frame::CallFrame;

/// A virtual machine instance over a compiled [`Program`].
///
/// The interpreter owns all runtime state: the function table, the global
/// slot vector and the single-slot return trampoline. Construction takes
/// the program by value; there is no module-level state. A single instance
/// is single-threaded and must not be re-entered from another thread, but
/// it may call itself through `CALL` handlers as deep as the host stack
/// allows; `BECOME` reuses the current frame instead of growing it.
#[derive(Debug)]
pub struct Interpreter {
    funcs: Vec<Rc<Function>>,
    func_names: BTreeMap<String, usize>,
    globals: Vec<Value>,
    global_names: BTreeMap<String, usize>,
    /// Return value trampoline, written by `RETURNVAL`/`RETURNIMM`.
    retval: Value,
    /// Set by `EXIT`; unwinds every live frame.
    halted: bool,
    #[cfg(feature = "debug")]
    prev_op: Option<muali_asm::RawOpcode>,
}

impl Interpreter {
    /// Construct a VM from a compiled program.
    pub fn new(program: Program) -> Self {
        let globals = vec![Value::Null; program.num_globals()];
        Self {
            funcs: program.funcs,
            func_names: program.func_names,
            globals,
            global_names: program.var_names,
            retval: Value::Null,
            halted: false,
            #[cfg(feature = "debug")]
            prev_op: None,
        }
    }

    /// Look up and call a function by name.
    pub fn call_func_by_name(
        &mut self,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, InterpreterError> {
        let index = *self
            .func_names
            .get(name)
            .ok_or_else(|| InterpreterError::FunctionNotFound(name.into()))?;
        let func = Rc::clone(&self.funcs[index]);
        self.call_func(func, args)
    }

    /// Call a compiled function as a fresh top-level invocation.
    pub fn call_func(
        &mut self,
        func: Rc<Function>,
        args: Vec<Value>,
    ) -> Result<Value, InterpreterError> {
        self.halted = false;
        self.retval = Value::Null;
        #[cfg(feature = "debug")]
        {
            self.prev_op = None;
        }
        self.call_frame(func, args)
    }

    /// Read a global slot by name.
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.global_names.get(name).map(|&i| &self.globals[i])
    }

    /// Run one call frame to completion. Also the reentry point for `CALL`.
    pub(crate) fn call_frame(
        &mut self,
        func: Rc<Function>,
        args: Vec<Value>,
    ) -> Result<Value, InterpreterError> {
        if args.len() != func.num_args {
            // Opcode zero marks a fault raised at the call boundary rather
            // than by an instruction.
            return Err(InterpreterError::Fault(Fault::new(
                FaultReason::ArityFault,
                0,
            )));
        }

        trace!(
            args = args.len(),
            frame = func.frame_size(),
            code = func.code.len(),
            "entering call frame"
        );

        let mut frame = CallFrame::new(func, args);
        loop {
            match self.step(&mut frame)? {
                ExecuteState::Proceed => {}
                ExecuteState::Returned | ExecuteState::Exited => {
                    return Ok(std::mem::take(&mut self.retval));
                }
            }
        }
    }
}

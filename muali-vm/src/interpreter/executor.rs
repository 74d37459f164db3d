//! Instruction dispatch.
//!
//! The source of truth for handler semantics. Dispatch is a fetch/resolve
//! loop over [`Opcode`]: the replicated-row fetch reads two bytes, the
//! resolved opcode decides how far the program counter advances, and each
//! arm reads its own operands through the shared [`Decoder`] so the VM can
//! never disagree with the encoder about operand widths.

use std::rc::Rc;

use tracing::trace;

use muali_asm::{Decoder, FaultReason, Opcode, RawOpcode};

use super::frame::CallFrame;
use super::{alu, flow, Interpreter};
use crate::error::{InterpreterError, RuntimeError};
use crate::state::ExecuteState;
use crate::value::{Value, ValueMap};

/// `op dst src` — read both registers, combine into `dst`.
fn binop(
    frame: &mut CallFrame,
    dec: &mut Decoder<'_>,
    f: impl FnOnce(&mut Value, &Value) -> Result<(), FaultReason>,
) -> Result<(), FaultReason> {
    let dst = dec.read_reg()?;
    let src = dec.read_reg()?;
    let rhs = frame.reg(src)?.clone();
    f(frame.reg_mut(dst)?, &rhs)
}

/// `op dst imm` — combine an inline immediate into `dst`.
fn binop_imm(
    frame: &mut CallFrame,
    dec: &mut Decoder<'_>,
    f: impl FnOnce(&mut Value, &Value) -> Result<(), FaultReason>,
) -> Result<(), FaultReason> {
    let dst = dec.read_reg()?;
    let rhs = Value::from(dec.read_imm()?);
    f(frame.reg_mut(dst)?, &rhs)
}

/// `op dst` — mutate a single register in place.
fn unop(
    frame: &mut CallFrame,
    dec: &mut Decoder<'_>,
    f: impl FnOnce(&mut Value) -> Result<(), FaultReason>,
) -> Result<(), FaultReason> {
    let dst = dec.read_reg()?;
    f(frame.reg_mut(dst)?)
}

/// `op dst` — overwrite a register with a constant.
fn store(
    frame: &mut CallFrame,
    dec: &mut Decoder<'_>,
    value: Value,
) -> Result<(), FaultReason> {
    let dst = dec.read_reg()?;
    *frame.reg_mut(dst)? = value;
    Ok(())
}

/// Copy `src` into `dst`, verifying the tag the specialized form assumes.
fn set_typed(
    frame: &mut CallFrame,
    dec: &mut Decoder<'_>,
    check: fn(&Value) -> bool,
) -> Result<(), FaultReason> {
    let dst = dec.read_reg()?;
    let src = dec.read_reg()?;
    let value = frame.reg(src)?.clone();
    if !check(&value) {
        return Err(FaultReason::TypeFault);
    }
    *frame.reg_mut(dst)? = value;
    Ok(())
}

impl Interpreter {
    /// Fetch, resolve and execute one instruction.
    pub(crate) fn step(&mut self, frame: &mut CallFrame) -> Result<ExecuteState, InterpreterError> {
        let func = Rc::clone(&frame.func);
        let mut dec = Decoder::at(&func.code, frame.pc);

        let raw = match dec.fetch_raw() {
            Ok(raw) => raw,
            Err(reason) => return Err(self.decorate(RuntimeError::Raise(reason), 0)),
        };
        let op = match Opcode::from_raw(raw) {
            Some(op) => op,
            None => {
                return Err(self.decorate(RuntimeError::Raise(FaultReason::UnknownOpcode), raw))
            }
        };
        dec.skip(op.encoded_len());

        let state = self
            .exec(frame, &mut dec, op)
            .map_err(|err| self.decorate(err, raw))?;

        if !frame.take_tail_called() {
            frame.pc = dec.pos();
        }

        #[cfg(feature = "debug")]
        {
            self.prev_op = Some(raw);
        }

        Ok(state)
    }

    fn decorate(&self, err: RuntimeError, raw: RawOpcode) -> InterpreterError {
        #[cfg(feature = "debug")]
        let previous = self.prev_op;
        #[cfg(not(feature = "debug"))]
        let previous = None;
        err.into_interpreter_error(raw, previous)
    }

    fn exec(
        &mut self,
        frame: &mut CallFrame,
        dec: &mut Decoder<'_>,
        op: Opcode,
    ) -> Result<ExecuteState, RuntimeError> {
        use Opcode::*;

        match op {
            SET => {
                let dst = dec.read_reg()?;
                let src = dec.read_reg()?;
                let value = frame.reg(src)?.clone();
                *frame.reg_mut(dst)? = value;
            }
            SET_I => set_typed(frame, dec, |v| matches!(v, Value::Int(_)))?,
            SET_F => set_typed(frame, dec, |v| matches!(v, Value::Float(_)))?,
            SETIMM => {
                let dst = dec.read_reg()?;
                let value = Value::from(dec.read_imm()?);
                *frame.reg_mut(dst)? = value;
            }

            ADD => binop(frame, dec, alu::add_assign)?,
            ADDIMM => binop_imm(frame, dec, alu::add_assign)?,
            SUB => binop(frame, dec, alu::sub_assign)?,
            SUBIMM => binop_imm(frame, dec, alu::sub_assign)?,
            MUL => binop(frame, dec, alu::mul_assign)?,
            MULIMM => binop_imm(frame, dec, alu::mul_assign)?,
            DIV => binop(frame, dec, alu::div_assign)?,
            DIVIMM => binop_imm(frame, dec, alu::div_assign)?,
            MOD => binop(frame, dec, alu::mod_assign)?,
            MODIMM => binop_imm(frame, dec, alu::mod_assign)?,

            ADD_F => binop(frame, dec, alu::add_float)?,
            ADD_FF => binop(frame, dec, alu::add_float_float)?,
            DIV_F => binop(frame, dec, alu::div_float)?,
            DIV_FI => binop(frame, dec, alu::div_float_int)?,
            DIV_FF => binop(frame, dec, alu::div_float_float)?,

            INCI | INCI_INT => unop(frame, dec, alu::inc_int)?,
            DECI | DECI_INT => unop(frame, dec, alu::dec_int)?,
            INCF => unop(frame, dec, alu::inc_float)?,
            DECF => unop(frame, dec, alu::dec_float)?,

            BITAND => binop(frame, dec, alu::bitand_assign)?,
            BITANDIMM => binop_imm(frame, dec, alu::bitand_assign)?,
            BITOR => binop(frame, dec, alu::bitor_assign)?,
            BITORIMM => binop_imm(frame, dec, alu::bitor_assign)?,
            BITXOR => binop(frame, dec, alu::bitxor_assign)?,
            BITXORIMM => binop_imm(frame, dec, alu::bitxor_assign)?,
            SHL => binop(frame, dec, alu::shl_assign)?,
            SHLIMM | SHLIMM_I => binop_imm(frame, dec, alu::shl_assign)?,
            SHR => binop(frame, dec, alu::shr_assign)?,
            SHRIMM => binop_imm(frame, dec, alu::shr_assign)?,

            NEGATE => unop(frame, dec, alu::negate)?,
            NEGATE_F => unop(frame, dec, alu::negate_float)?,
            NOT => unop(frame, dec, alu::not_value)?,
            BITNOT => unop(frame, dec, alu::bitnot)?,

            SETNULL => store(frame, dec, Value::Null)?,
            SETZEROI => store(frame, dec, Value::Int(0))?,
            SETZEROF => store(frame, dec, Value::Float(0.0))?,
            SETONEI => store(frame, dec, Value::Int(1))?,
            SETONEF => store(frame, dec, Value::Float(1.0))?,
            SETNEGONEI => store(frame, dec, Value::Int(-1))?,
            SETNEGONEF => store(frame, dec, Value::Float(-1.0))?,
            SETTRUE => store(frame, dec, Value::Bool(true))?,
            SETFALSE => store(frame, dec, Value::Bool(false))?,
            SETEMPTYSTR => store(frame, dec, Value::str(""))?,
            SETEMPTYARRAY => store(frame, dec, Value::array(Vec::new()))?,
            SETEMPTYDICT => store(frame, dec, Value::dict(ValueMap::new()))?,

            TOSTRING => unop(frame, dec, alu::to_string_value)?,
            TOINT => unop(frame, dec, alu::to_int)?,
            TOFLOAT => unop(frame, dec, alu::to_float)?,
            FTOIBITS => unop(frame, dec, alu::float_to_int_bits)?,
            ITOFBITS => unop(frame, dec, alu::int_to_float_bits)?,
            SQRT => unop(frame, dec, alu::sqrt_value)?,

            J => {
                let offset = dec.read_i32()?;
                dec.jump(offset)?;
            }
            JIF => {
                let src = dec.read_reg()?;
                let offset = dec.read_i32()?;
                let truthy = frame.reg(src)?.truthy().ok_or(FaultReason::TypeFault)?;
                if truthy {
                    dec.jump(offset)?;
                }
            }
            JIFNOT => {
                let src = dec.read_reg()?;
                let offset = dec.read_i32()?;
                let truthy = frame.reg(src)?.truthy().ok_or(FaultReason::TypeFault)?;
                if !truthy {
                    dec.jump(offset)?;
                }
            }
            JIFNULL => {
                let src = dec.read_reg()?;
                let offset = dec.read_i32()?;
                if matches!(frame.reg(src)?, Value::Null) {
                    dec.jump(offset)?;
                }
            }
            JIFNOTNULL => {
                let src = dec.read_reg()?;
                let offset = dec.read_i32()?;
                if !matches!(frame.reg(src)?, Value::Null) {
                    dec.jump(offset)?;
                }
            }
            JCMP => {
                let a = dec.read_reg()?;
                let b = dec.read_reg()?;
                let cmp = dec.read_cmp()?;
                let offset = dec.read_i32()?;
                if flow::cmp_holds(cmp, frame.reg(a)?, frame.reg(b)?)? {
                    dec.jump(offset)?;
                }
            }
            JCMPIMM => {
                let a = dec.read_reg()?;
                let cmp = dec.read_cmp()?;
                let rhs = Value::from(dec.read_imm()?);
                let offset = dec.read_i32()?;
                if flow::cmp_holds(cmp, frame.reg(a)?, &rhs)? {
                    dec.jump(offset)?;
                }
            }
            JILTIMM => {
                let dst = dec.read_reg()?;
                let limit = dec.read_i64()?;
                let offset = dec.read_i32()?;
                if flow::int_value(frame.reg(dst)?)? < limit {
                    dec.jump(offset)?;
                }
            }
            JINCILT => {
                let dst = dec.read_reg()?;
                let src = dec.read_reg()?;
                let offset = dec.read_i32()?;
                let limit = flow::int_value(frame.reg(src)?)?;
                if flow::inc_int_value(frame.reg_mut(dst)?)? < limit {
                    dec.jump(offset)?;
                }
            }
            JINCILTIMM | JINCILTIMM_INT => {
                let dst = dec.read_reg()?;
                let limit = dec.read_i64()?;
                let offset = dec.read_i32()?;
                if flow::inc_int_value(frame.reg_mut(dst)?)? < limit {
                    dec.jump(offset)?;
                }
            }

            CALL => {
                let func = self.read_callee(dec)?;
                let dst = dec.read_reg()?;
                let args = read_args(frame, dec)?;
                let value = self.call_frame(func, args)?;
                if self.halted {
                    self.retval = value;
                    return Ok(ExecuteState::Exited);
                }
                *frame.reg_mut(dst)? = value;
            }
            CALL_INDIRECT => {
                let func = read_callee_reg(frame, dec)?;
                let dst = dec.read_reg()?;
                let args = read_args(frame, dec)?;
                let value = self.call_frame(func, args)?;
                if self.halted {
                    self.retval = value;
                    return Ok(ExecuteState::Exited);
                }
                *frame.reg_mut(dst)? = value;
            }
            CALLDISCARD => {
                let func = self.read_callee(dec)?;
                let args = read_args(frame, dec)?;
                let value = self.call_frame(func, args)?;
                if self.halted {
                    self.retval = value;
                    return Ok(ExecuteState::Exited);
                }
            }
            CALLD_INDIRECT => {
                let func = read_callee_reg(frame, dec)?;
                let args = read_args(frame, dec)?;
                let value = self.call_frame(func, args)?;
                if self.halted {
                    self.retval = value;
                    return Ok(ExecuteState::Exited);
                }
            }
            BECOME => {
                let func = self.read_callee(dec)?;
                let args = read_args(frame, dec)?;
                if args.len() != func.num_args {
                    return Err(FaultReason::ArityFault.into());
                }
                trace!(frame = func.frame_size(), "tail call reuses the frame");
                frame.reset(func, args);
            }

            RETURNVAL => {
                let src = dec.read_reg()?;
                self.retval = frame.take_reg(src)?;
                return Ok(ExecuteState::Returned);
            }
            RETURNIMM => {
                self.retval = Value::from(dec.read_imm()?);
                return Ok(ExecuteState::Returned);
            }

            GETGLOBAL => {
                let dst = dec.read_reg()?;
                let index = dec.read_reg()?;
                let value = self
                    .globals
                    .get(index)
                    .ok_or(FaultReason::UnknownGlobal)?
                    .clone();
                *frame.reg_mut(dst)? = value;
            }
            SETGLOBAL => {
                let index = dec.read_reg()?;
                let src = dec.read_reg()?;
                let value = frame.reg(src)?.clone();
                *self
                    .globals
                    .get_mut(index)
                    .ok_or(FaultReason::UnknownGlobal)? = value;
            }
            SETGLOBALIMM => {
                let index = dec.read_reg()?;
                let value = Value::from(dec.read_imm()?);
                *self
                    .globals
                    .get_mut(index)
                    .ok_or(FaultReason::UnknownGlobal)? = value;
            }

            NOOP => {}
            EXIT => {
                self.halted = true;
                return Ok(ExecuteState::Exited);
            }
            FAULT => return Err(FaultReason::ExplicitFault.into()),

            _ => return Err(FaultReason::UnknownOpcode.into()),
        }

        Ok(ExecuteState::Proceed)
    }

    /// Resolve a function-index operand against the program.
    fn read_callee(
        &self,
        dec: &mut Decoder<'_>,
    ) -> Result<Rc<muali_asm::Function>, FaultReason> {
        let index = dec.read_reg()?;
        self.funcs
            .get(index)
            .cloned()
            .ok_or(FaultReason::UnknownFunction)
    }
}

/// Resolve an indirect callee from a register holding a `Func` value.
fn read_callee_reg(
    frame: &CallFrame,
    dec: &mut Decoder<'_>,
) -> Result<Rc<muali_asm::Function>, FaultReason> {
    let src = dec.read_reg()?;
    match frame.reg(src)? {
        Value::Func(func) => Ok(Rc::clone(func)),
        _ => Err(FaultReason::TypeFault),
    }
}

/// Read `argc` and gather the argument values.
fn read_args(frame: &CallFrame, dec: &mut Decoder<'_>) -> Result<Vec<Value>, FaultReason> {
    let argc = dec.read_u8()? as usize;
    let mut args = Vec::with_capacity(argc);
    for _ in 0..argc {
        let src = dec.read_reg()?;
        args.push(frame.reg(src)?.clone());
    }
    Ok(args)
}

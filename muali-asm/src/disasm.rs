use core::fmt;

use itertools::Itertools;

use crate::{CmpKind, Decoder, FaultReason, Imm, Opcode, RawOpcode, RegisterId};

/// One decoded operand, tagged with how the instruction uses it.
///
/// The register variants distinguish write-only, read-write and read-only
/// access so that tooling built on the disassembly (flow checkers, tests)
/// does not have to re-derive the access table per opcode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    /// Register written without being read first.
    Out(RegisterId),
    /// Register read and written.
    InOut(RegisterId),
    /// Register read.
    Src(RegisterId),
    /// Typed immediate payload.
    Imm(Imm),
    /// Raw 64-bit integer payload.
    Imm64(i64),
    /// Branch offset, relative to the end of its own field.
    Offset(i32),
    /// Comparison selector.
    Cmp(CmpKind),
    /// Function index.
    Func(usize),
    /// Global slot index.
    Global(usize),
    /// Call argument count.
    ArgCount(u8),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Out(r) | Operand::InOut(r) | Operand::Src(r) => write!(f, "r{r}"),
            Operand::Imm(Imm::Null) => write!(f, "null"),
            Operand::Imm(Imm::Int(n)) => write!(f, "int({n})"),
            Operand::Imm(Imm::Float(n)) => write!(f, "float({n})"),
            Operand::Imm64(n) => write!(f, "{n}"),
            Operand::Offset(n) => write!(f, "{n:+}"),
            Operand::Cmp(c) => write!(f, "{c}"),
            Operand::Func(i) => write!(f, "fn{i}"),
            Operand::Global(i) => write!(f, "g{i}"),
            Operand::ArgCount(n) => write!(f, "#{n}"),
        }
    }
}

/// One disassembled instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Byte offset of the opcode.
    pub offset: usize,
    /// Raw fetched opcode value.
    pub raw: RawOpcode,
    /// Resolved opcode.
    pub opcode: Opcode,
    /// Decoded operands in instruction-stream order.
    pub operands: Vec<Operand>,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}: {}", self.offset, self.opcode)?;
        if !self.operands.is_empty() {
            write!(f, " {}", self.operands.iter().join(", "))?;
        }
        Ok(())
    }
}

/// Iterator over the instructions of a code buffer.
///
/// Iteration ends at the end of the buffer or at a `0x00` byte — the
/// compiler's end-of-function sentinel. Any other unassigned opcode or a
/// truncated operand yields an `Err` item and ends iteration.
#[derive(Debug, Clone)]
pub struct Disasm<'a> {
    decoder: Decoder<'a>,
    code: &'a [u8],
    failed: bool,
}

impl<'a> Disasm<'a> {
    /// Disassemble from the start of a code buffer.
    pub fn new(code: &'a [u8]) -> Self {
        Self {
            decoder: Decoder::new(code),
            code,
            failed: false,
        }
    }

    /// Collect the whole buffer, or the first decode failure.
    pub fn collect_all(code: &'a [u8]) -> Result<Vec<Instruction>, FaultReason> {
        Self::new(code).collect()
    }

    fn read_operands(&mut self, opcode: Opcode) -> Result<Vec<Operand>, FaultReason> {
        use Opcode::*;

        let dec = &mut self.decoder;
        let ops = match opcode {
            SET | SET_I | SET_F => vec![Operand::Out(dec.read_reg()?), Operand::Src(dec.read_reg()?)],
            SETIMM => vec![Operand::Out(dec.read_reg()?), Operand::Imm(dec.read_imm()?)],

            ADD | SUB | MUL | DIV | MOD | BITAND | BITOR | BITXOR | SHL | SHR | ADD_F
            | ADD_FF | DIV_F | DIV_FI | DIV_FF => {
                vec![Operand::InOut(dec.read_reg()?), Operand::Src(dec.read_reg()?)]
            }
            ADDIMM | SUBIMM | MULIMM | DIVIMM | MODIMM | BITANDIMM | BITORIMM | BITXORIMM
            | SHLIMM | SHRIMM | SHLIMM_I => {
                vec![Operand::InOut(dec.read_reg()?), Operand::Imm(dec.read_imm()?)]
            }

            INCI | DECI | INCF | DECF | NEGATE | NOT | BITNOT | NEGATE_F | INCI_INT
            | DECI_INT | TOSTRING | TOINT | TOFLOAT | FTOIBITS | ITOFBITS | SQRT => {
                vec![Operand::InOut(dec.read_reg()?)]
            }

            SETNULL | SETZEROI | SETZEROF | SETONEI | SETONEF | SETNEGONEI | SETNEGONEF
            | SETTRUE | SETFALSE | SETEMPTYSTR | SETEMPTYARRAY | SETEMPTYDICT => {
                vec![Operand::Out(dec.read_reg()?)]
            }

            J => vec![Operand::Offset(dec.read_i32()?)],
            JIF | JIFNOT | JIFNULL | JIFNOTNULL => {
                vec![Operand::Src(dec.read_reg()?), Operand::Offset(dec.read_i32()?)]
            }
            JCMP => vec![
                Operand::Src(dec.read_reg()?),
                Operand::Src(dec.read_reg()?),
                Operand::Cmp(dec.read_cmp()?),
                Operand::Offset(dec.read_i32()?),
            ],
            JCMPIMM => vec![
                Operand::Src(dec.read_reg()?),
                Operand::Cmp(dec.read_cmp()?),
                Operand::Imm(dec.read_imm()?),
                Operand::Offset(dec.read_i32()?),
            ],
            JILTIMM => vec![
                Operand::Src(dec.read_reg()?),
                Operand::Imm64(dec.read_i64()?),
                Operand::Offset(dec.read_i32()?),
            ],
            JINCILT => vec![
                Operand::InOut(dec.read_reg()?),
                Operand::Src(dec.read_reg()?),
                Operand::Offset(dec.read_i32()?),
            ],
            JINCILTIMM | JINCILTIMM_INT => vec![
                Operand::InOut(dec.read_reg()?),
                Operand::Imm64(dec.read_i64()?),
                Operand::Offset(dec.read_i32()?),
            ],

            CALL | CALL_INDIRECT | CALLDISCARD | CALLD_INDIRECT | BECOME => {
                let mut ops = Vec::new();
                match opcode {
                    CALL_INDIRECT | CALLD_INDIRECT => ops.push(Operand::Src(dec.read_reg()?)),
                    _ => ops.push(Operand::Func(dec.read_reg()?)),
                }
                if matches!(opcode, CALL | CALL_INDIRECT) {
                    ops.push(Operand::Out(dec.read_reg()?));
                }
                let argc = dec.read_u8()?;
                ops.push(Operand::ArgCount(argc));
                for _ in 0..argc {
                    ops.push(Operand::Src(dec.read_reg()?));
                }
                ops
            }

            RETURNVAL => vec![Operand::Src(dec.read_reg()?)],
            RETURNIMM => vec![Operand::Imm(dec.read_imm()?)],

            GETGLOBAL => vec![Operand::Out(dec.read_reg()?), Operand::Global(dec.read_reg()?)],
            SETGLOBAL => vec![Operand::Global(dec.read_reg()?), Operand::Src(dec.read_reg()?)],
            SETGLOBALIMM => {
                vec![Operand::Global(dec.read_reg()?), Operand::Imm(dec.read_imm()?)]
            }

            NOOP | EXIT | FAULT => vec![],
        };
        Ok(ops)
    }
}

impl<'a> Iterator for Disasm<'a> {
    type Item = Result<Instruction, FaultReason>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.decoder.is_at_end() {
            return None;
        }
        // End-of-function sentinel.
        if self.code[self.decoder.pos()] == 0x00 {
            return None;
        }

        let offset = self.decoder.pos();
        let step: Result<Instruction, FaultReason> = (|| {
            let raw = self.decoder.fetch_raw()?;
            let opcode = Opcode::from_raw(raw).ok_or(FaultReason::UnknownOpcode)?;
            self.decoder.skip(opcode.encoded_len());
            let operands = self.read_operands(opcode)?;
            Ok(Instruction {
                offset,
                raw,
                opcode,
                operands,
            })
        })();

        if step.is_err() {
            self.failed = true;
        }
        Some(step)
    }
}

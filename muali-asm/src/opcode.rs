use crate::RawOpcode;

/// Width of the opcode table in bits.
///
/// The table has `2^10` raw slots; one-byte opcodes live below `0x80` and
/// everything above is encoded as two bytes.
pub const RAW_OPCODE_BITS: u32 = 10;

/// Mask applied to a two-byte fetch before resolving the opcode.
pub const RAW_OPCODE_MASK: u16 = (1 << RAW_OPCODE_BITS) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(non_camel_case_types, clippy::upper_case_acronyms)]
#[repr(u16)]
#[non_exhaustive]
/// Opcode representation for the muali VM.
///
/// `0x00` is deliberately unassigned: the compiler appends it as an
/// end-of-function sentinel, and executing it reports
/// [`FaultReason::UnknownOpcode`](crate::FaultReason::UnknownOpcode) instead
/// of running off the end of the code buffer.
pub enum Opcode {
    /// Copy a register into another register. `set dst src`
    SET = 0x01,
    /// Write a typed immediate into a register. `setimm dst imm`
    SETIMM = 0x02,

    /// Add a register into a register, dispatching on tags. `add dst src`
    ADD = 0x03,
    /// Add an immediate into a register. `addimm dst imm`
    ADDIMM = 0x04,
    /// Subtract a register from a register. `sub dst src`
    SUB = 0x05,
    /// Subtract an immediate from a register. `subimm dst imm`
    SUBIMM = 0x06,
    /// Multiply a register by a register. `mul dst src`
    MUL = 0x07,
    /// Multiply a register by an immediate. `mulimm dst imm`
    MULIMM = 0x08,
    /// Divide a register by a register. `div dst src`
    DIV = 0x09,
    /// Divide a register by an immediate. `divimm dst imm`
    DIVIMM = 0x0a,
    /// Remainder of a register by a register. `mod dst src`
    MOD = 0x0b,
    /// Remainder of a register by an immediate. `modimm dst imm`
    MODIMM = 0x0c,

    /// Increment an integer register. `inci dst`
    INCI = 0x0d,
    /// Decrement an integer register. `deci dst`
    DECI = 0x0e,
    /// Increment a float register. `incf dst`
    INCF = 0x0f,
    /// Decrement a float register. `decf dst`
    DECF = 0x10,

    /// Bitwise AND of two integer registers. `bitand dst src`
    BITAND = 0x11,
    /// Bitwise OR of two integer registers. `bitor dst src`
    BITOR = 0x12,
    /// Bitwise XOR of two integer registers. `bitxor dst src`
    BITXOR = 0x13,
    /// Shift an integer register left by a register count. `shl dst src`
    SHL = 0x14,
    /// Shift an integer register right by a register count. `shr dst src`
    SHR = 0x15,
    /// Bitwise AND with an immediate. `bitandimm dst imm`
    BITANDIMM = 0x16,
    /// Bitwise OR with an immediate. `bitorimm dst imm`
    BITORIMM = 0x17,
    /// Bitwise XOR with an immediate. `bitxorimm dst imm`
    BITXORIMM = 0x18,
    /// Shift left by an immediate count. `shlimm dst imm`
    SHLIMM = 0x19,
    /// Shift right by an immediate count. `shrimm dst imm`
    SHRIMM = 0x1a,

    /// Negate a numeric register in place. `negate dst`
    NEGATE = 0x1b,
    /// Logical NOT of a register's truthiness. `not dst`
    NOT = 0x1c,
    /// Bitwise NOT of an integer register. `bitnot dst`
    BITNOT = 0x1d,

    /// Write `null` into a register. `setnull dst`
    SETNULL = 0x20,
    /// Write integer `0` into a register. `setzeroi dst`
    SETZEROI = 0x21,
    /// Write float `0.0` into a register. `setzerof dst`
    SETZEROF = 0x22,
    /// Write integer `1` into a register. `setonei dst`
    SETONEI = 0x23,
    /// Write float `1.0` into a register. `setonef dst`
    SETONEF = 0x24,
    /// Write integer `-1` into a register. `setnegonei dst`
    SETNEGONEI = 0x25,
    /// Write float `-1.0` into a register. `setnegonef dst`
    SETNEGONEF = 0x26,
    /// Write `true` into a register. `settrue dst`
    SETTRUE = 0x27,
    /// Write `false` into a register. `setfalse dst`
    SETFALSE = 0x28,
    /// Write an empty string into a register. `setemptystr dst`
    SETEMPTYSTR = 0x29,
    /// Write an empty array into a register. `setemptyarray dst`
    SETEMPTYARRAY = 0x2a,
    /// Write an empty dict into a register. `setemptydict dst`
    SETEMPTYDICT = 0x2b,

    /// Convert a register to its string rendering. `tostring dst`
    TOSTRING = 0x30,
    /// Convert a register to an integer. `toint dst`
    TOINT = 0x31,
    /// Convert a register to a float. `tofloat dst`
    TOFLOAT = 0x32,
    /// Reinterpret a float register's bits as an integer. `ftoibits dst`
    FTOIBITS = 0x33,
    /// Reinterpret an integer register's bits as a float. `itofbits dst`
    ITOFBITS = 0x34,
    /// Square root of a numeric register, yielding a float. `sqrt dst`
    SQRT = 0x35,

    /// Unconditional relative jump. `j off32`
    J = 0x40,
    /// Jump when a register is truthy. `jif src off32`
    JIF = 0x41,
    /// Jump when a register is falsy. `jifnot src off32`
    JIFNOT = 0x42,
    /// Jump when a register is null. `jifnull src off32`
    JIFNULL = 0x43,
    /// Jump when a register is not null. `jifnotnull src off32`
    JIFNOTNULL = 0x44,
    /// Compare two registers and jump when the comparison holds.
    /// `jcmp a b cmp off32`
    JCMP = 0x45,
    /// Compare a register against an immediate and jump when the comparison
    /// holds. `jcmpimm a cmp imm off32`
    JCMPIMM = 0x46,
    /// Jump when an integer register is less than a raw 64-bit immediate.
    /// `jiltimm dst imm64 off32`
    JILTIMM = 0x47,
    /// Increment an integer register, jump while it is less than another
    /// integer register. `jincilt dst src off32`
    JINCILT = 0x48,
    /// Increment an integer register, jump while it is less than a raw
    /// 64-bit immediate. `jinciltimm dst imm64 off32`
    JINCILTIMM = 0x49,

    /// Call a function by index, storing the result.
    /// `call fn dst argc argv...`
    CALL = 0x50,
    /// Call a function held in a register, storing the result.
    /// `call_indirect src dst argc argv...`
    CALL_INDIRECT = 0x51,
    /// Call a function by index, discarding the result.
    /// `calldiscard fn argc argv...`
    CALLDISCARD = 0x52,
    /// Call a function held in a register, discarding the result.
    /// `calld_indirect src argc argv...`
    CALLD_INDIRECT = 0x53,
    /// Tail-call a function by index, reusing the current frame.
    /// `become fn argc argv...`
    BECOME = 0x54,

    /// Return the value held in a register. `returnval src`
    RETURNVAL = 0x58,
    /// Return an immediate value. `returnimm imm`
    RETURNIMM = 0x59,

    /// Read a global slot into a register. `getglobal dst idx`
    GETGLOBAL = 0x60,
    /// Write a register into a global slot. `setglobal idx src`
    SETGLOBAL = 0x61,
    /// Write an immediate into a global slot. `setglobalimm idx imm`
    SETGLOBALIMM = 0x62,

    /// Do nothing. `noop`
    NOOP = 0x70,
    /// Halt the whole interpreter. `exit`
    EXIT = 0x7e,
    /// Abort the current call unconditionally. `fault`
    FAULT = 0x7f,

    // Two-byte opcodes: type-specialized variants the compiler selects when
    // both operand static types are proven.
    /// `SET` with a statically-int source. `set_i dst src`
    SET_I = 0x80,
    /// `SET` with a statically-float source. `set_f dst src`
    SET_F = 0x81,
    /// `ADD` with a statically-float destination. `add_f dst src`
    ADD_F = 0x82,
    /// `ADD` with both sides statically float. `add_ff dst src`
    ADD_FF = 0x83,
    /// `DIV` with a statically-float destination. `div_f dst src`
    DIV_F = 0x84,
    /// `DIV` with a float destination and an int divisor. `div_fi dst src`
    DIV_FI = 0x85,
    /// `DIV` with both sides statically float. `div_ff dst src`
    DIV_FF = 0x86,
    /// `NEGATE` with a statically-float operand. `negate_f dst`
    NEGATE_F = 0x87,
    /// `SHLIMM` with a statically-int operand. `shlimm_i dst imm`
    SHLIMM_I = 0x88,
    /// `INCI` with a statically-int operand. `inci_int dst`
    INCI_INT = 0x89,
    /// `DECI` with a statically-int operand. `deci_int dst`
    DECI_INT = 0x8a,
    /// `JINCILTIMM` with a statically-int induction variable.
    /// `jinciltimm_int dst imm64 off32`
    JINCILTIMM_INT = 0x8b,
}

impl Opcode {
    /// Resolve a raw two-byte fetch into an opcode.
    ///
    /// When the low byte has the high bit clear the instruction was a
    /// one-byte opcode and the fetched high byte belongs to the next
    /// instruction; it is masked away here rather than branched on, which is
    /// what makes the always-read-two-bytes fetch safe.
    pub const fn from_raw(raw: RawOpcode) -> Option<Self> {
        use Opcode::*;

        let raw = if raw & 0x80 == 0 {
            raw & 0x7f
        } else {
            raw & RAW_OPCODE_MASK
        };

        match raw {
            0x01 => Some(SET),
            0x02 => Some(SETIMM),
            0x03 => Some(ADD),
            0x04 => Some(ADDIMM),
            0x05 => Some(SUB),
            0x06 => Some(SUBIMM),
            0x07 => Some(MUL),
            0x08 => Some(MULIMM),
            0x09 => Some(DIV),
            0x0a => Some(DIVIMM),
            0x0b => Some(MOD),
            0x0c => Some(MODIMM),
            0x0d => Some(INCI),
            0x0e => Some(DECI),
            0x0f => Some(INCF),
            0x10 => Some(DECF),
            0x11 => Some(BITAND),
            0x12 => Some(BITOR),
            0x13 => Some(BITXOR),
            0x14 => Some(SHL),
            0x15 => Some(SHR),
            0x16 => Some(BITANDIMM),
            0x17 => Some(BITORIMM),
            0x18 => Some(BITXORIMM),
            0x19 => Some(SHLIMM),
            0x1a => Some(SHRIMM),
            0x1b => Some(NEGATE),
            0x1c => Some(NOT),
            0x1d => Some(BITNOT),
            0x20 => Some(SETNULL),
            0x21 => Some(SETZEROI),
            0x22 => Some(SETZEROF),
            0x23 => Some(SETONEI),
            0x24 => Some(SETONEF),
            0x25 => Some(SETNEGONEI),
            0x26 => Some(SETNEGONEF),
            0x27 => Some(SETTRUE),
            0x28 => Some(SETFALSE),
            0x29 => Some(SETEMPTYSTR),
            0x2a => Some(SETEMPTYARRAY),
            0x2b => Some(SETEMPTYDICT),
            0x30 => Some(TOSTRING),
            0x31 => Some(TOINT),
            0x32 => Some(TOFLOAT),
            0x33 => Some(FTOIBITS),
            0x34 => Some(ITOFBITS),
            0x35 => Some(SQRT),
            0x40 => Some(J),
            0x41 => Some(JIF),
            0x42 => Some(JIFNOT),
            0x43 => Some(JIFNULL),
            0x44 => Some(JIFNOTNULL),
            0x45 => Some(JCMP),
            0x46 => Some(JCMPIMM),
            0x47 => Some(JILTIMM),
            0x48 => Some(JINCILT),
            0x49 => Some(JINCILTIMM),
            0x50 => Some(CALL),
            0x51 => Some(CALL_INDIRECT),
            0x52 => Some(CALLDISCARD),
            0x53 => Some(CALLD_INDIRECT),
            0x54 => Some(BECOME),
            0x58 => Some(RETURNVAL),
            0x59 => Some(RETURNIMM),
            0x60 => Some(GETGLOBAL),
            0x61 => Some(SETGLOBAL),
            0x62 => Some(SETGLOBALIMM),
            0x70 => Some(NOOP),
            0x7e => Some(EXIT),
            0x7f => Some(FAULT),
            0x80 => Some(SET_I),
            0x81 => Some(SET_F),
            0x82 => Some(ADD_F),
            0x83 => Some(ADD_FF),
            0x84 => Some(DIV_F),
            0x85 => Some(DIV_FI),
            0x86 => Some(DIV_FF),
            0x87 => Some(NEGATE_F),
            0x88 => Some(SHLIMM_I),
            0x89 => Some(INCI_INT),
            0x8a => Some(DECI_INT),
            0x8b => Some(JINCILTIMM_INT),
            _ => None,
        }
    }

    /// Raw table value of this opcode.
    pub const fn raw(self) -> RawOpcode {
        self as RawOpcode
    }

    /// Number of bytes this opcode occupies in the instruction stream.
    pub const fn encoded_len(self) -> usize {
        if (self as u16) < 0x80 {
            1
        } else {
            2
        }
    }

    /// Whether this opcode uses the two-byte encoding.
    pub const fn is_wide(self) -> bool {
        self.encoded_len() == 2
    }
}

impl From<Opcode> for RawOpcode {
    fn from(op: Opcode) -> Self {
        op.raw()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn raw_values_fit_the_table() {
        for op in Opcode::iter() {
            assert!(op.raw() <= RAW_OPCODE_MASK, "{op} overflows the table");
        }
    }

    #[test]
    fn wide_opcodes_keep_the_low_high_bit() {
        // The low byte of a two-byte opcode is the one the fetch path uses
        // to pick the instruction length.
        for op in Opcode::iter().filter(|op| op.is_wide()) {
            assert_eq!(op.raw() & 0x80, 0x80, "{op} would decode as one byte");
        }
        for op in Opcode::iter().filter(|op| !op.is_wide()) {
            assert_eq!(op.raw() & 0x80, 0, "{op} would decode as two bytes");
        }
    }

    #[test]
    fn sentinel_is_unassigned() {
        assert_eq!(Opcode::from_raw(0), None);
    }
}

use core::fmt;

use crate::RawOpcode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
#[non_exhaustive]
/// Fault reason representation for the interpreter.
///
/// Every fault terminates the current top-level call; handlers never recover
/// locally.
pub enum FaultReason {
    /// Dispatch landed on an unassigned opcode slot.
    UnknownOpcode = 0x00,
    /// A handler met operand tags it cannot combine.
    TypeFault = 0x01,
    /// Integer division or remainder by zero.
    ArithmeticFault = 0x02,
    /// A call supplied the wrong number of arguments.
    ArityFault = 0x03,
    /// Found a `FAULT` instruction.
    ExplicitFault = 0x04,
    /// An operand read ran past the end of the code buffer.
    CodeOverrun = 0x05,
    /// A branch target fell outside the code buffer.
    JumpOutOfBounds = 0x06,
    /// A register operand exceeded the call's register file.
    RegisterOutOfBounds = 0x07,
    /// An immediate carried a reserved or unassigned type tag.
    UnknownImmediate = 0x08,
    /// A call named a function index the program does not contain.
    UnknownFunction = 0x09,
    /// A global access named a slot the program does not contain.
    UnknownGlobal = 0x0a,
    /// A `JCMP`/`JCMPIMM` comparison selector byte is unassigned.
    UnknownComparison = 0x0b,
}

impl fmt::Display for FaultReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for FaultReason {}

/// A runtime fault paired with the opcode fetch that raised it.
///
/// `previous` is populated only when the interpreter is built with
/// previous-opcode tracking (the `debug` feature of the VM crate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Fault {
    reason: FaultReason,
    opcode: RawOpcode,
    previous: Option<RawOpcode>,
}

impl Fault {
    /// Pair a fault reason with the raw opcode that raised it.
    pub const fn new(reason: FaultReason, opcode: RawOpcode) -> Self {
        Self {
            reason,
            opcode,
            previous: None,
        }
    }

    /// Attach the previously executed raw opcode.
    pub const fn with_previous(mut self, previous: RawOpcode) -> Self {
        self.previous = Some(previous);
        self
    }

    /// The reason this fault was raised.
    pub const fn reason(&self) -> FaultReason {
        self.reason
    }

    /// The raw opcode that raised the fault.
    pub const fn opcode(&self) -> RawOpcode {
        self.opcode
    }

    /// The raw opcode executed before the faulting one, when tracked.
    pub const fn previous(&self) -> Option<RawOpcode> {
        self.previous
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at opcode {:#05x}", self.reason, self.opcode)?;
        if let Some(prev) = self.previous {
            write!(f, " (previous opcode {prev:#05x})")?;
        }
        Ok(())
    }
}

impl std::error::Error for Fault {}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn display_names_the_reason() {
        for reason in FaultReason::iter() {
            let fault = Fault::new(reason, 0x7f);
            assert!(fault.to_string().contains(&reason.to_string()));
        }
    }

    #[test]
    fn previous_opcode_is_off_by_default() {
        let fault = Fault::new(FaultReason::UnknownOpcode, 0);
        assert_eq!(fault.previous(), None);
        assert_eq!(fault.with_previous(0x49).previous(), Some(0x49));
    }
}

/// Wire type tags for runtime values and typed immediates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum TypeId {
    /// The null value.
    Null = 0,
    /// Signed 64-bit integer.
    Int = 1,
    /// One-byte boolean.
    Bool = 2,
    /// IEEE-754 binary64.
    Float = 3,
    /// Immutable shared byte string.
    String = 4,
    /// Shared dynamic array.
    Array = 5,
    /// Shared ordered map.
    Dict = 6,
    /// Compiled function reference.
    Func = 7,
}

impl TypeId {
    /// Decode a wire tag byte.
    pub const fn from_u8(b: u8) -> Option<Self> {
        match b {
            0 => Some(TypeId::Null),
            1 => Some(TypeId::Int),
            2 => Some(TypeId::Bool),
            3 => Some(TypeId::Float),
            4 => Some(TypeId::String),
            5 => Some(TypeId::Array),
            6 => Some(TypeId::Dict),
            7 => Some(TypeId::Func),
            _ => None,
        }
    }
}

/// A typed immediate operand.
///
/// Encoded as a [`TypeId`] byte followed by the payload: nothing for `Null`,
/// eight little-endian bytes for `Int`, eight little-endian IEEE-754 bytes
/// for `Float`. String immediates are reserved: the encoder refuses to emit
/// them and the decoder reports
/// [`FaultReason::UnknownImmediate`](crate::FaultReason::UnknownImmediate).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Imm {
    /// The null immediate.
    Null,
    /// An integer immediate.
    Int(i64),
    /// A float immediate.
    Float(f64),
}

impl Imm {
    /// Wire tag of this immediate.
    pub const fn type_id(&self) -> TypeId {
        match self {
            Imm::Null => TypeId::Null,
            Imm::Int(_) => TypeId::Int,
            Imm::Float(_) => TypeId::Float,
        }
    }

    /// Encoded size in bytes, tag included.
    pub const fn encoded_len(&self) -> usize {
        match self {
            Imm::Null => 1,
            Imm::Int(_) | Imm::Float(_) => 9,
        }
    }
}

/// Comparison selector byte for `JCMP`/`JCMPIMM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum CmpKind {
    /// Jump when equal.
    Eq = 0,
    /// Jump when not equal.
    Ne = 1,
    /// Jump when strictly greater.
    Gt = 2,
    /// Jump when strictly less.
    Lt = 3,
    /// Jump when greater or equal.
    Gte = 4,
    /// Jump when less or equal.
    Lte = 5,
}

impl CmpKind {
    /// Decode a comparison selector byte.
    pub const fn from_u8(b: u8) -> Option<Self> {
        match b {
            0 => Some(CmpKind::Eq),
            1 => Some(CmpKind::Ne),
            2 => Some(CmpKind::Gt),
            3 => Some(CmpKind::Lt),
            4 => Some(CmpKind::Gte),
            5 => Some(CmpKind::Lte),
            _ => None,
        }
    }

    /// Apply this comparison to an ordering result.
    pub const fn holds(self, ord: core::cmp::Ordering) -> bool {
        use core::cmp::Ordering::*;
        match (self, ord) {
            (CmpKind::Eq, Equal) => true,
            (CmpKind::Ne, Less | Greater) => true,
            (CmpKind::Gt, Greater) => true,
            (CmpKind::Lt, Less) => true,
            (CmpKind::Gte, Greater | Equal) => true,
            (CmpKind::Lte, Less | Equal) => true,
            _ => false,
        }
    }
}

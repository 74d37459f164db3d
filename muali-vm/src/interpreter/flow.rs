//! Comparison and induction helpers for the jump handlers.

use core::cmp::Ordering;

use muali_asm::{CmpKind, FaultReason};

use crate::value::Value;

/// Evaluate a `JCMP`/`JCMPIMM` comparison.
///
/// Numeric pairs compare with cross-type coercion; `Null` and `Bool` pairs
/// compare within their own tag. An unordered float comparison (NaN on
/// either side) holds only for `Ne`, per IEEE semantics.
pub(crate) fn cmp_holds(kind: CmpKind, a: &Value, b: &Value) -> Result<bool, FaultReason> {
    let ord = match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Int(x), Value::Float(y)) => (*x as f64).partial_cmp(y),
        (Value::Float(x), Value::Int(y)) => x.partial_cmp(&(*y as f64)),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => return Err(FaultReason::TypeFault),
    };
    Ok(match ord {
        Some(ord) => kind.holds(ord),
        None => matches!(kind, CmpKind::Ne),
    })
}

/// Read an integer register for a comparison operand.
pub(crate) fn int_value(v: &Value) -> Result<i64, FaultReason> {
    match v {
        Value::Int(n) => Ok(*n),
        _ => Err(FaultReason::TypeFault),
    }
}

/// Pre-increment an integer induction register, returning the new value.
pub(crate) fn inc_int_value(v: &mut Value) -> Result<i64, FaultReason> {
    match v {
        Value::Int(n) => {
            *n = n.wrapping_add(1);
            Ok(*n)
        }
        _ => Err(FaultReason::TypeFault),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(CmpKind::Eq, Value::Int(3), Value::Float(3.0), true)]
    #[case(CmpKind::Lt, Value::Int(3), Value::Float(3.5), true)]
    #[case(CmpKind::Gte, Value::Float(2.0), Value::Int(2), true)]
    #[case(CmpKind::Ne, Value::Bool(true), Value::Bool(false), true)]
    #[case(CmpKind::Eq, Value::Null, Value::Null, true)]
    #[case(CmpKind::Gt, Value::Int(1), Value::Int(2), false)]
    fn comparisons(
        #[case] kind: CmpKind,
        #[case] a: Value,
        #[case] b: Value,
        #[case] expected: bool,
    ) {
        assert_eq!(cmp_holds(kind, &a, &b), Ok(expected));
    }

    #[test]
    fn nan_is_unordered() {
        let nan = Value::Float(f64::NAN);
        assert_eq!(cmp_holds(CmpKind::Eq, &nan, &nan), Ok(false));
        assert_eq!(cmp_holds(CmpKind::Lte, &nan, &Value::Int(1)), Ok(false));
        assert_eq!(cmp_holds(CmpKind::Ne, &nan, &nan), Ok(true));
    }

    #[test]
    fn mixed_tags_fault() {
        assert_eq!(
            cmp_holds(CmpKind::Eq, &Value::Null, &Value::Int(0)),
            Err(FaultReason::TypeFault)
        );
        assert_eq!(
            cmp_holds(CmpKind::Lt, &Value::str("a"), &Value::str("b")),
            Err(FaultReason::TypeFault)
        );
    }
}

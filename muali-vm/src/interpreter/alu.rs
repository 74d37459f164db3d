//! Value-level arithmetic, bitwise and conversion operations.
//!
//! Every function here implements the in-place `op dst src` contract: the
//! destination register is both first operand and result. Integer
//! arithmetic wraps; integer division and remainder by zero fault. The
//! `*_float*` variants back the type-specialized opcodes — they still
//! verify operand tags and fault on mismatch rather than reinterpreting
//! the payload, which the compiler makes unreachable by only selecting
//! them on proven static types.

use muali_asm::FaultReason;

use crate::value::Value;

pub(crate) fn add_assign(dst: &mut Value, src: &Value) -> Result<(), FaultReason> {
    *dst = match (&*dst, src) {
        (Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_add(*b)),
        (Value::Int(a), Value::Float(b)) => Value::Float(*a as f64 + *b),
        (Value::Float(a), Value::Int(b)) => Value::Float(*a + *b as f64),
        (Value::Float(a), Value::Float(b)) => Value::Float(*a + *b),
        _ => return Err(FaultReason::TypeFault),
    };
    Ok(())
}

pub(crate) fn sub_assign(dst: &mut Value, src: &Value) -> Result<(), FaultReason> {
    *dst = match (&*dst, src) {
        (Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_sub(*b)),
        (Value::Int(a), Value::Float(b)) => Value::Float(*a as f64 - *b),
        (Value::Float(a), Value::Int(b)) => Value::Float(*a - *b as f64),
        (Value::Float(a), Value::Float(b)) => Value::Float(*a - *b),
        _ => return Err(FaultReason::TypeFault),
    };
    Ok(())
}

pub(crate) fn mul_assign(dst: &mut Value, src: &Value) -> Result<(), FaultReason> {
    *dst = match (&*dst, src) {
        (Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_mul(*b)),
        (Value::Int(a), Value::Float(b)) => Value::Float(*a as f64 * *b),
        (Value::Float(a), Value::Int(b)) => Value::Float(*a * *b as f64),
        (Value::Float(a), Value::Float(b)) => Value::Float(*a * *b),
        _ => return Err(FaultReason::TypeFault),
    };
    Ok(())
}

pub(crate) fn div_assign(dst: &mut Value, src: &Value) -> Result<(), FaultReason> {
    *dst = match (&*dst, src) {
        (Value::Int(a), Value::Int(b)) => {
            if *b == 0 {
                return Err(FaultReason::ArithmeticFault);
            }
            Value::Int(a.wrapping_div(*b))
        }
        (Value::Int(a), Value::Float(b)) => Value::Float(*a as f64 / *b),
        (Value::Float(a), Value::Int(b)) => Value::Float(*a / *b as f64),
        (Value::Float(a), Value::Float(b)) => Value::Float(*a / *b),
        _ => return Err(FaultReason::TypeFault),
    };
    Ok(())
}

pub(crate) fn mod_assign(dst: &mut Value, src: &Value) -> Result<(), FaultReason> {
    *dst = match (&*dst, src) {
        (Value::Int(a), Value::Int(b)) => {
            if *b == 0 {
                return Err(FaultReason::ArithmeticFault);
            }
            Value::Int(a.wrapping_rem(*b))
        }
        (Value::Int(a), Value::Float(b)) => Value::Float(*a as f64 % *b),
        (Value::Float(a), Value::Int(b)) => Value::Float(*a % *b as f64),
        (Value::Float(a), Value::Float(b)) => Value::Float(*a % *b),
        _ => return Err(FaultReason::TypeFault),
    };
    Ok(())
}

fn int_pair(dst: &Value, src: &Value) -> Result<(i64, i64), FaultReason> {
    match (dst, src) {
        (Value::Int(a), Value::Int(b)) => Ok((*a, *b)),
        _ => Err(FaultReason::TypeFault),
    }
}

pub(crate) fn bitand_assign(dst: &mut Value, src: &Value) -> Result<(), FaultReason> {
    let (a, b) = int_pair(dst, src)?;
    *dst = Value::Int(a & b);
    Ok(())
}

pub(crate) fn bitor_assign(dst: &mut Value, src: &Value) -> Result<(), FaultReason> {
    let (a, b) = int_pair(dst, src)?;
    *dst = Value::Int(a | b);
    Ok(())
}

pub(crate) fn bitxor_assign(dst: &mut Value, src: &Value) -> Result<(), FaultReason> {
    let (a, b) = int_pair(dst, src)?;
    *dst = Value::Int(a ^ b);
    Ok(())
}

/// Shift count is taken modulo 64.
pub(crate) fn shl_assign(dst: &mut Value, src: &Value) -> Result<(), FaultReason> {
    let (a, b) = int_pair(dst, src)?;
    *dst = Value::Int(a.wrapping_shl(b as u32));
    Ok(())
}

/// Arithmetic right shift; count taken modulo 64.
pub(crate) fn shr_assign(dst: &mut Value, src: &Value) -> Result<(), FaultReason> {
    let (a, b) = int_pair(dst, src)?;
    *dst = Value::Int(a.wrapping_shr(b as u32));
    Ok(())
}

pub(crate) fn inc_int(dst: &mut Value) -> Result<(), FaultReason> {
    match dst {
        Value::Int(n) => {
            *n = n.wrapping_add(1);
            Ok(())
        }
        _ => Err(FaultReason::TypeFault),
    }
}

pub(crate) fn dec_int(dst: &mut Value) -> Result<(), FaultReason> {
    match dst {
        Value::Int(n) => {
            *n = n.wrapping_sub(1);
            Ok(())
        }
        _ => Err(FaultReason::TypeFault),
    }
}

pub(crate) fn inc_float(dst: &mut Value) -> Result<(), FaultReason> {
    match dst {
        Value::Float(n) => {
            *n += 1.0;
            Ok(())
        }
        _ => Err(FaultReason::TypeFault),
    }
}

pub(crate) fn dec_float(dst: &mut Value) -> Result<(), FaultReason> {
    match dst {
        Value::Float(n) => {
            *n -= 1.0;
            Ok(())
        }
        _ => Err(FaultReason::TypeFault),
    }
}

pub(crate) fn negate(dst: &mut Value) -> Result<(), FaultReason> {
    match dst {
        Value::Int(n) => {
            *n = n.wrapping_neg();
            Ok(())
        }
        Value::Float(n) => {
            *n = -*n;
            Ok(())
        }
        _ => Err(FaultReason::TypeFault),
    }
}

pub(crate) fn negate_float(dst: &mut Value) -> Result<(), FaultReason> {
    match dst {
        Value::Float(n) => {
            *n = -*n;
            Ok(())
        }
        _ => Err(FaultReason::TypeFault),
    }
}

pub(crate) fn not_value(dst: &mut Value) -> Result<(), FaultReason> {
    let truthy = dst.truthy().ok_or(FaultReason::TypeFault)?;
    *dst = Value::Bool(!truthy);
    Ok(())
}

pub(crate) fn bitnot(dst: &mut Value) -> Result<(), FaultReason> {
    match dst {
        Value::Int(n) => {
            *n = !*n;
            Ok(())
        }
        _ => Err(FaultReason::TypeFault),
    }
}

pub(crate) fn to_string_value(dst: &mut Value) -> Result<(), FaultReason> {
    *dst = match &*dst {
        Value::Str(_) => return Ok(()),
        v @ (Value::Null | Value::Bool(_) | Value::Int(_) | Value::Float(_)) => {
            Value::str(v.to_string())
        }
        _ => return Err(FaultReason::TypeFault),
    };
    Ok(())
}

pub(crate) fn to_int(dst: &mut Value) -> Result<(), FaultReason> {
    *dst = match &*dst {
        Value::Int(_) => return Ok(()),
        Value::Float(n) => Value::Int(*n as i64),
        Value::Bool(b) => Value::Int(*b as i64),
        _ => return Err(FaultReason::TypeFault),
    };
    Ok(())
}

pub(crate) fn to_float(dst: &mut Value) -> Result<(), FaultReason> {
    *dst = match &*dst {
        Value::Float(_) => return Ok(()),
        Value::Int(n) => Value::Float(*n as f64),
        _ => return Err(FaultReason::TypeFault),
    };
    Ok(())
}

pub(crate) fn float_to_int_bits(dst: &mut Value) -> Result<(), FaultReason> {
    *dst = match &*dst {
        Value::Float(n) => Value::Int(n.to_bits() as i64),
        _ => return Err(FaultReason::TypeFault),
    };
    Ok(())
}

pub(crate) fn int_to_float_bits(dst: &mut Value) -> Result<(), FaultReason> {
    *dst = match &*dst {
        Value::Int(n) => Value::Float(f64::from_bits(*n as u64)),
        _ => return Err(FaultReason::TypeFault),
    };
    Ok(())
}

pub(crate) fn sqrt_value(dst: &mut Value) -> Result<(), FaultReason> {
    *dst = match &*dst {
        Value::Int(n) => Value::Float((*n as f64).sqrt()),
        Value::Float(n) => Value::Float(n.sqrt()),
        _ => return Err(FaultReason::TypeFault),
    };
    Ok(())
}

pub(crate) fn add_float(dst: &mut Value, src: &Value) -> Result<(), FaultReason> {
    *dst = match (&*dst, src) {
        (Value::Float(a), Value::Int(b)) => Value::Float(*a + *b as f64),
        (Value::Float(a), Value::Float(b)) => Value::Float(*a + *b),
        _ => return Err(FaultReason::TypeFault),
    };
    Ok(())
}

pub(crate) fn add_float_float(dst: &mut Value, src: &Value) -> Result<(), FaultReason> {
    *dst = match (&*dst, src) {
        (Value::Float(a), Value::Float(b)) => Value::Float(*a + *b),
        _ => return Err(FaultReason::TypeFault),
    };
    Ok(())
}

pub(crate) fn div_float(dst: &mut Value, src: &Value) -> Result<(), FaultReason> {
    *dst = match (&*dst, src) {
        (Value::Float(a), Value::Int(b)) => Value::Float(*a / *b as f64),
        (Value::Float(a), Value::Float(b)) => Value::Float(*a / *b),
        _ => return Err(FaultReason::TypeFault),
    };
    Ok(())
}

pub(crate) fn div_float_int(dst: &mut Value, src: &Value) -> Result<(), FaultReason> {
    *dst = match (&*dst, src) {
        (Value::Float(a), Value::Int(b)) => Value::Float(*a / *b as f64),
        _ => return Err(FaultReason::TypeFault),
    };
    Ok(())
}

pub(crate) fn div_float_float(dst: &mut Value, src: &Value) -> Result<(), FaultReason> {
    *dst = match (&*dst, src) {
        (Value::Float(a), Value::Float(b)) => Value::Float(*a / *b),
        _ => return Err(FaultReason::TypeFault),
    };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_retags_int_plus_float() {
        let mut dst = Value::Int(2);
        add_assign(&mut dst, &Value::Float(0.5)).unwrap();
        assert_eq!(dst, Value::Float(2.5));
    }

    #[test]
    fn add_rejects_non_numeric_operands() {
        let mut dst = Value::str("a");
        assert_eq!(
            add_assign(&mut dst, &Value::Int(1)),
            Err(FaultReason::TypeFault)
        );
        let mut dst = Value::Int(1);
        assert_eq!(
            add_assign(&mut dst, &Value::Null),
            Err(FaultReason::TypeFault)
        );
    }

    #[test]
    fn integer_division_by_zero_faults() {
        let mut dst = Value::Int(10);
        assert_eq!(
            div_assign(&mut dst, &Value::Int(0)),
            Err(FaultReason::ArithmeticFault)
        );
        assert_eq!(
            mod_assign(&mut dst, &Value::Int(0)),
            Err(FaultReason::ArithmeticFault)
        );
        // The destination is untouched on fault.
        assert_eq!(dst, Value::Int(10));
    }

    #[test]
    fn float_division_by_zero_is_ieee() {
        let mut dst = Value::Float(1.0);
        div_assign(&mut dst, &Value::Int(0)).unwrap();
        assert_eq!(dst, Value::Float(f64::INFINITY));
    }

    #[test]
    fn integer_arithmetic_wraps() {
        let mut dst = Value::Int(i64::MAX);
        add_assign(&mut dst, &Value::Int(1)).unwrap();
        assert_eq!(dst, Value::Int(i64::MIN));
        let mut dst = Value::Int(i64::MIN);
        negate(&mut dst).unwrap();
        assert_eq!(dst, Value::Int(i64::MIN));
    }

    #[test]
    fn shifts_require_integers() {
        let mut dst = Value::Int(3);
        shl_assign(&mut dst, &Value::Int(2)).unwrap();
        assert_eq!(dst, Value::Int(12));
        let mut dst = Value::Float(3.0);
        assert_eq!(
            shl_assign(&mut dst, &Value::Int(2)),
            Err(FaultReason::TypeFault)
        );
    }

    #[test]
    fn specialized_forms_fail_closed_on_wrong_tags() {
        let mut dst = Value::Int(1);
        assert_eq!(
            add_float_float(&mut dst, &Value::Float(1.0)),
            Err(FaultReason::TypeFault)
        );
        assert_eq!(negate_float(&mut dst), Err(FaultReason::TypeFault));
        assert_eq!(
            div_float_int(&mut Value::Float(1.0), &Value::Float(2.0)),
            Err(FaultReason::TypeFault)
        );
    }

    #[test]
    fn bit_conversions_round_trip() {
        let mut v = Value::Float(-1.5);
        float_to_int_bits(&mut v).unwrap();
        int_to_float_bits(&mut v).unwrap();
        assert_eq!(v, Value::Float(-1.5));
    }

    #[test]
    fn conversions_cover_the_documented_domains() {
        let mut v = Value::Float(2.9);
        to_int(&mut v).unwrap();
        assert_eq!(v, Value::Int(2));

        let mut v = Value::Bool(true);
        to_int(&mut v).unwrap();
        assert_eq!(v, Value::Int(1));

        let mut v = Value::Int(9);
        sqrt_value(&mut v).unwrap();
        assert_eq!(v, Value::Float(3.0));

        let mut v = Value::Null;
        to_string_value(&mut v).unwrap();
        assert_eq!(v, Value::str("null"));

        let mut v = Value::array(vec![]);
        assert_eq!(to_string_value(&mut v), Err(FaultReason::TypeFault));
    }
}

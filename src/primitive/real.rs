//! Scaled-decimal `Real` values.
//!
//! A `Real` is an exact signed mantissa plus a scaling hint drawn from a
//! bounded enumeration: decimal exponents 10^-14..10^7, binary fraction
//! denominators 1..256, and the non-numeric specials. The mantissa/hint
//! pair round-trips bit-exactly; [`Real::to_f64`] is the explicitly lossy
//! conversion.

use num_enum::TryFromPrimitive;

/// Wire marker for a blank Real (reserved hint slot 32).
pub const REAL_BLANK_MARKER: u8 = 0x20;

/// Scaling hints. 31 and 32 are reserved on the wire (32 doubles as the
/// blank marker) and are not representable here.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum RealHint {
    ExponentNeg14 = 0,
    ExponentNeg13 = 1,
    ExponentNeg12 = 2,
    ExponentNeg11 = 3,
    ExponentNeg10 = 4,
    ExponentNeg9 = 5,
    ExponentNeg8 = 6,
    ExponentNeg7 = 7,
    ExponentNeg6 = 8,
    ExponentNeg5 = 9,
    ExponentNeg4 = 10,
    ExponentNeg3 = 11,
    ExponentNeg2 = 12,
    ExponentNeg1 = 13,
    Exponent0 = 14,
    Exponent1 = 15,
    Exponent2 = 16,
    Exponent3 = 17,
    Exponent4 = 18,
    Exponent5 = 19,
    Exponent6 = 20,
    Exponent7 = 21,
    Fraction1 = 22,
    Fraction2 = 23,
    Fraction4 = 24,
    Fraction8 = 25,
    Fraction16 = 26,
    Fraction32 = 27,
    Fraction64 = 28,
    Fraction128 = 29,
    Fraction256 = 30,
    Infinity = 33,
    NegInfinity = 34,
    NotANumber = 35,
}

impl RealHint {
    /// Decimal exponent for exponent hints.
    pub fn exponent(self) -> Option<i32> {
        let v = self as u8;
        (v <= RealHint::Exponent7 as u8).then(|| v as i32 - 14)
    }

    /// Denominator for fraction hints.
    pub fn denominator(self) -> Option<u32> {
        let v = self as u8;
        (RealHint::Fraction1 as u8..=RealHint::Fraction256 as u8)
            .contains(&v)
            .then(|| 1u32 << (v - RealHint::Fraction1 as u8))
    }

    /// True for Infinity/NegInfinity/NotANumber, which carry no mantissa.
    pub fn is_special(self) -> bool {
        matches!(
            self,
            RealHint::Infinity | RealHint::NegInfinity | RealHint::NotANumber
        )
    }
}

/// Exact scaled decimal: `mantissa` interpreted through `hint`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct Real {
    pub mantissa: i64,
    pub hint: RealHint,
}

impl Real {
    pub fn new(mantissa: i64, hint: RealHint) -> Self {
        Real { mantissa, hint }
    }

    pub fn infinity() -> Self {
        Real {
            mantissa: 0,
            hint: RealHint::Infinity,
        }
    }

    pub fn neg_infinity() -> Self {
        Real {
            mantissa: 0,
            hint: RealHint::NegInfinity,
        }
    }

    pub fn not_a_number() -> Self {
        Real {
            mantissa: 0,
            hint: RealHint::NotANumber,
        }
    }

    /// Lossy floating approximation. The mantissa/hint pair itself never
    /// goes through floating point.
    pub fn to_f64(self) -> f64 {
        if let Some(exp) = self.hint.exponent() {
            self.mantissa as f64 * 10f64.powi(exp)
        } else if let Some(denom) = self.hint.denominator() {
            self.mantissa as f64 / denom as f64
        } else {
            match self.hint {
                RealHint::Infinity => f64::INFINITY,
                RealHint::NegInfinity => f64::NEG_INFINITY,
                _ => f64::NAN,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hint_classification() {
        assert_eq!(RealHint::ExponentNeg14.exponent(), Some(-14));
        assert_eq!(RealHint::Exponent0.exponent(), Some(0));
        assert_eq!(RealHint::Exponent7.exponent(), Some(7));
        assert_eq!(RealHint::Fraction1.denominator(), Some(1));
        assert_eq!(RealHint::Fraction256.denominator(), Some(256));
        assert!(RealHint::Infinity.is_special());
        assert!(RealHint::Fraction2.exponent().is_none());
    }

    #[test]
    fn reserved_hint_values_unrepresentable() {
        assert!(RealHint::try_from(31u8).is_err());
        assert!(RealHint::try_from(32u8).is_err());
        assert!(RealHint::try_from(36u8).is_err());
    }

    #[test]
    fn lossy_conversion() {
        assert_eq!(Real::new(11, RealHint::ExponentNeg2).to_f64(), 0.11);
        assert_eq!(Real::new(5, RealHint::Fraction2).to_f64(), 2.5);
        assert!(Real::not_a_number().to_f64().is_nan());
        assert_eq!(Real::neg_infinity().to_f64(), f64::NEG_INFINITY);
    }
}

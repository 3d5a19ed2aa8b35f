//! Physical quantities as (mantissa, power-of-ten exponent) pairs
//!
//! Voltages, currents and powers are exchanged on the wire as a scaled
//! integer mantissa plus a decimal exponent. Encoding picks the smallest
//! exponent whose rounded mantissa still fits the mantissa type, so no
//! precision beyond the representable range is invented.

use serde::{Deserialize, Serialize};

const MIN_EXPONENT: i32 = -6;
const MAX_EXPONENT: i32 = 6;

/// A physical value as `value * 10^exponent`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RationalNumber {
    pub value: i16,
    pub exponent: i8,
}

impl RationalNumber {
    pub const ZERO: RationalNumber = RationalNumber {
        value: 0,
        exponent: 0,
    };

    pub fn new(value: i16, exponent: i8) -> Self {
        Self { value, exponent }
    }

    /// Encode a native float, rounding to the nearest representable mantissa.
    pub fn from_f32(v: f32) -> Self {
        if v == 0.0 || !v.is_finite() {
            return Self::ZERO;
        }
        for exponent in MIN_EXPONENT..=MAX_EXPONENT {
            let scaled = (v / 10f32.powi(exponent)).round();
            if scaled.abs() <= f32::from(i16::MAX) {
                return Self {
                    value: scaled as i16,
                    exponent: exponent as i8,
                };
            }
        }
        // Out of representable range, saturate at the largest exponent.
        Self {
            value: if v > 0.0 { i16::MAX } else { i16::MIN },
            exponent: MAX_EXPONENT as i8,
        }
    }

    /// Decode to a native float. Exact up to float rounding.
    pub fn to_f32(self) -> f32 {
        f32::from(self.value) * 10f32.powi(i32::from(self.exponent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn zero_round_trips() {
        assert_eq!(RationalNumber::from_f32(0.0), RationalNumber::ZERO);
        assert_eq!(RationalNumber::ZERO.to_f32(), 0.0);
    }

    #[test]
    fn picks_most_precise_exponent() {
        let v = RationalNumber::from_f32(0.12345);
        assert_eq!(v, RationalNumber::new(12345, -5));
        let v = RationalNumber::from_f32(423.5);
        assert_eq!(v, RationalNumber::new(4235, -1));
        let v = RationalNumber::from_f32(100_000.0);
        assert_eq!(v, RationalNumber::new(10000, 1));
    }

    #[test]
    fn rounds_to_nearest_mantissa() {
        // 32767.6 does not fit at exponent 0 once rounded, so it moves up.
        let v = RationalNumber::from_f32(32767.6);
        assert_eq!(v, RationalNumber::new(3277, 1));
    }

    #[test]
    fn negative_values() {
        let v = RationalNumber::from_f32(-401.2);
        assert_eq!(v, RationalNumber::new(-4012, -1));
        assert_eq!(v.to_f32(), -401.2);
    }

    #[test]
    fn round_trip_within_rounding_error() {
        for raw in [0.001f32, 1.5, 52.3, 431.0, 3000.0, 29999.5, -12.75] {
            let encoded = RationalNumber::from_f32(raw);
            let decoded = encoded.to_f32();
            let err = (decoded - raw).abs();
            // One half unit in the last mantissa digit.
            let ulp = 0.5 * 10f32.powi(i32::from(encoded.exponent));
            assert!(err <= ulp, "{raw} -> {encoded:?} -> {decoded} (err {err})");
        }
    }

    #[test]
    fn decode_then_encode_is_stable() {
        for (value, exponent) in [(4235, -1), (10000, 1), (-300, 0), (1, -6)] {
            let original = RationalNumber::new(value, exponent);
            let round = RationalNumber::from_f32(original.to_f32());
            assert_eq!(round.to_f32(), original.to_f32());
        }
    }
}

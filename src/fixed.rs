use core::fmt::{self, Display};
use core::ops::{Add, AddAssign, Sub};

/// Number of fractional bits in a [`Fixed`].
const FRAC_BITS: u32 = 16;

/// Q48.16 fixed-point number.
///
/// The best-job-first rank mixes fractional weights with tick counts and
/// byte sizes. Floating point is off limits here because user FP registers
/// are not saved on kernel entry, so the weights and the rank are carried
/// as fixed-point integers instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Fixed(i64);

impl Fixed {
    pub const ZERO: Fixed = Fixed(0);
    pub const ONE: Fixed = Fixed(1 << FRAC_BITS);
    /// One tenth, the quantum credited per dispatch.
    pub const TENTH: Fixed = Fixed((1 << FRAC_BITS) / 10);

    pub const fn from_int(n: i64) -> Fixed {
        Fixed(n << FRAC_BITS)
    }

    pub const fn from_raw(raw: i64) -> Fixed {
        Fixed(raw)
    }

    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Integer part, truncated toward negative infinity.
    pub const fn to_int(self) -> i64 {
        self.0 >> FRAC_BITS
    }

    pub fn mul(self, rhs: Fixed) -> Fixed {
        Fixed(((self.0 as i128 * rhs.0 as i128) >> FRAC_BITS) as i64)
    }

    pub fn mul_int(self, n: i64) -> Fixed {
        Fixed(((self.0 as i128 * n as i128).clamp(i64::MIN as i128, i64::MAX as i128)) as i64)
    }
}

impl Add for Fixed {
    type Output = Fixed;

    fn add(self, rhs: Fixed) -> Fixed {
        Fixed(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Fixed {
    fn add_assign(&mut self, rhs: Fixed) {
        *self = *self + rhs;
    }
}

impl Sub for Fixed {
    type Output = Fixed;

    fn sub(self, rhs: Fixed) -> Fixed {
        Fixed(self.0.saturating_sub(rhs.0))
    }
}

impl Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let int = abs >> FRAC_BITS;
        let frac = ((abs & ((1 << FRAC_BITS) - 1)) * 100) >> FRAC_BITS;
        write!(f, "{}{}.{:02}", sign, int, frac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_round_trip() {
        assert_eq!(Fixed::from_int(7).to_int(), 7);
        assert_eq!(Fixed::from_int(-3).to_int(), -3);
        assert_eq!(Fixed::ZERO.to_int(), 0);
    }

    #[test]
    fn quantum_accumulates() {
        let mut cycle = Fixed::ZERO;
        for _ in 0..10 {
            cycle += Fixed::TENTH;
        }
        // ten quanta come out a hair under 1.0 from truncation
        assert!((Fixed::ONE.raw() - cycle.raw()).unsigned_abs() <= 10);
        assert!(cycle > Fixed::ZERO);
    }

    #[test]
    fn mul_int_scales() {
        assert_eq!(Fixed::from_int(3).mul_int(4).to_int(), 12);
        assert_eq!(Fixed::ONE.mul_int(100).to_int(), 100);
        assert_eq!(Fixed::ZERO.mul_int(9999), Fixed::ZERO);
    }

    #[test]
    fn mul_fixed_keeps_fraction() {
        let half = Fixed::from_raw(Fixed::ONE.raw() / 2);
        assert_eq!(Fixed::from_int(10).mul(half).to_int(), 5);
        assert_eq!(half.mul(Fixed::ONE), half);
    }

    #[test]
    fn ordering_follows_value() {
        assert!(Fixed::from_int(2) < Fixed::from_int(3));
        assert!(Fixed::TENTH < Fixed::ONE);
        assert!(Fixed::from_int(-1) < Fixed::ZERO);
    }

    #[test]
    fn display_two_decimals() {
        assert_eq!(alloc::format!("{}", Fixed::from_int(3)), "3.00");
        let half = Fixed::from_raw(Fixed::ONE.raw() / 2);
        assert_eq!(alloc::format!("{}", half), "0.50");
    }
}

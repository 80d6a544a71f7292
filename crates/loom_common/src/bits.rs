//! Bit-width arithmetic for fixed-width two's-complement values.
//!
//! Values are carried as raw `u128` bit patterns plus a width. Signed
//! interpretation happens on demand through [`sign_extend`].

/// The widest value the arithmetic helpers (and therefore constants and the
/// reference evaluator) can represent.
pub const MAX_WIDTH: u32 = 128;

/// Returns a mask with the low `width` bits set.
///
/// Widths of [`MAX_WIDTH`] or more yield an all-ones mask.
pub fn mask(width: u32) -> u128 {
    if width >= MAX_WIDTH {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

/// Truncates a raw bit pattern to `width` bits.
pub fn truncate(raw: u128, width: u32) -> u128 {
    raw & mask(width)
}

/// Interprets the low `width` bits of `raw` as a two's-complement number.
///
/// A zero-width value is always `0`.
pub fn sign_extend(raw: u128, width: u32) -> i128 {
    if width == 0 {
        return 0;
    }
    let raw = truncate(raw, width);
    if width >= MAX_WIDTH {
        return raw as i128;
    }
    if (raw >> (width - 1)) & 1 == 1 {
        (raw | !mask(width)) as i128
    } else {
        raw as i128
    }
}

/// Returns the number of bits needed to represent `value`.
///
/// Non-positive values always need a sign bit; positive values only get one
/// when `require_sign_bit` is set. Zero needs one bit.
pub fn bits_for(value: i128, require_sign_bit: bool) -> u32 {
    if value == 0 {
        return 1;
    }
    if value > 0 {
        let bits = MAX_WIDTH - (value as u128).leading_zeros();
        if require_sign_bit {
            bits + 1
        } else {
            bits
        }
    } else {
        // For negative n, -n - 1 == !n, which avoids overflow at i128::MIN.
        MAX_WIDTH - ((!value) as u128).leading_zeros() + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_widths() {
        assert_eq!(mask(0), 0);
        assert_eq!(mask(1), 1);
        assert_eq!(mask(8), 0xff);
        assert_eq!(mask(128), u128::MAX);
        assert_eq!(mask(200), u128::MAX);
    }

    #[test]
    fn bits_for_positive() {
        assert_eq!(bits_for(1, false), 1);
        assert_eq!(bits_for(2, false), 2);
        assert_eq!(bits_for(5, false), 3);
        assert_eq!(bits_for(255, false), 8);
        assert_eq!(bits_for(256, false), 9);
        assert_eq!(bits_for(5, true), 4);
    }

    #[test]
    fn bits_for_zero_and_negative() {
        assert_eq!(bits_for(0, false), 1);
        assert_eq!(bits_for(-1, false), 1);
        assert_eq!(bits_for(-4, false), 3);
        assert_eq!(bits_for(-5, false), 4);
        assert_eq!(bits_for(-128, false), 8);
        assert_eq!(bits_for(i128::MIN, false), 128);
    }

    #[test]
    fn sign_extension() {
        assert_eq!(sign_extend(0b111, 3), -1);
        assert_eq!(sign_extend(0b011, 3), 3);
        assert_eq!(sign_extend(0b100, 3), -4);
        assert_eq!(sign_extend(0xff, 0), 0);
        // Bits above the width are ignored.
        assert_eq!(sign_extend(0b1_0011, 4), 3);
    }

    #[test]
    fn truncate_negative_pattern() {
        let raw = (-3i128) as u128;
        assert_eq!(truncate(raw, 4), 0b1101);
        assert_eq!(sign_extend(truncate(raw, 4), 4), -3);
    }
}

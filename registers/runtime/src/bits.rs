// Licensed under the Apache-2.0 license

//! Bit manipulation primitives shared by the field codec and block transfers.
//!
//! Register, field and memory entry values are carried as `u128`; the
//! callbacks move `u64` words of at most [`MAX_WORD_WIDTH`] bits.

use bit_vec::BitVec;

/// Widest register, field or memory entry the runtime handles.
pub const MAX_VALUE_WIDTH: u32 = 128;

/// Widest single physical access.
pub const MAX_WORD_WIDTH: u32 = 64;

/// All-ones mask covering the lowest `width` bits of a word (`width` up to 64).
pub const fn low_mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// All-ones mask covering the lowest `width` bits of a value (`width` up to 128).
pub const fn value_mask(width: u32) -> u128 {
    if width >= 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

/// Mask with bits `low..=high` set.
pub const fn range_mask(low: u32, high: u32) -> u128 {
    value_mask(high - low + 1) << low
}

/// Reverses the lowest `width` bits of `value`: bit `i` moves to bit
/// `width - 1 - i`. Bits above `width` are dropped.
pub fn reverse_bits(value: u128, width: u32) -> u128 {
    debug_assert!((1..=MAX_VALUE_WIDTH).contains(&width));
    (value & value_mask(width)).reverse_bits() >> (128 - width)
}

/// Arbitrary-width variant of [`reverse_bits`] used for values wider than a
/// machine word, such as concatenated block transfers.
pub fn reverse_bits_wide(value: &BitVec) -> BitVec {
    let width = value.len();
    BitVec::from_fn(width, |i| value.get(width - 1 - i).unwrap_or(false))
}

/// Concatenates little-endian sub-words of `word_width` bits into one value,
/// `words[0]` in the least significant bits.
pub fn join_words(words: &[u64], word_width: u32) -> u128 {
    words.iter().enumerate().fold(0, |acc, (i, w)| {
        acc | (u128::from(*w & low_mask(word_width)) << (i as u32 * word_width))
    })
}

/// Inverse of [`join_words`]: splits the low `width` bits of `value` into
/// `width / word_width` sub-words.
pub fn split_words(value: u128, width: u32, word_width: u32) -> Vec<u64> {
    let mask = u128::from(low_mask(word_width));
    (0..width / word_width)
        .map(|i| ((value >> (i * word_width)) & mask) as u64)
        .collect()
}

/// Packs little-endian `values` of `width` bits into a bit vector of
/// `values.len() * width` bits, least significant bit first.
pub fn words_to_bits(values: &[u128], width: u32) -> BitVec {
    let width = width as usize;
    BitVec::from_fn(values.len() * width, |i| {
        (values[i / width] >> (i % width)) & 1 == 1
    })
}

/// Inverse of [`words_to_bits`].
pub fn bits_to_words(bits: &BitVec, width: u32) -> Vec<u128> {
    let width = width as usize;
    let mut values = vec![0u128; bits.len().div_ceil(width)];
    for (i, bit) in bits.iter().enumerate() {
        if bit {
            values[i / width] |= 1 << (i % width);
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masks() {
        assert_eq!(low_mask(0), 0);
        assert_eq!(low_mask(1), 1);
        assert_eq!(low_mask(16), 0xffff);
        assert_eq!(low_mask(64), u64::MAX);
        assert_eq!(value_mask(64), u128::from(u64::MAX));
        assert_eq!(value_mask(128), u128::MAX);
        assert_eq!(range_mask(0, 15), 0xffff);
        assert_eq!(range_mask(16, 17), 0x3_0000);
        assert_eq!(range_mask(63, 63), 1 << 63);
        assert_eq!(range_mask(64, 127), u128::MAX << 64);
    }

    #[test]
    fn test_reverse_bits() {
        assert_eq!(reverse_bits(0b1, 1), 0b1);
        assert_eq!(reverse_bits(0b001, 3), 0b100);
        assert_eq!(reverse_bits(0b110, 3), 0b011);
        assert_eq!(reverse_bits(0x1, 16), 0x8000);
        assert_eq!(reverse_bits(0xABCD, 16), 0xB3D5);
        assert_eq!(reverse_bits(1, 64), 1 << 63);
        assert_eq!(reverse_bits(1, 128), 1 << 127);
        assert_eq!(reverse_bits(0xff, 72), 0xff << 64);
    }

    #[test]
    fn test_reverse_bits_is_involution() {
        for width in 1..=MAX_VALUE_WIDTH {
            for i in 0..width {
                let x = 1u128 << i;
                let reversed = reverse_bits(x, width);
                assert_eq!(reversed, 1u128 << (width - 1 - i));
                assert_eq!(reverse_bits(reversed, width), x);
            }
        }
    }

    #[test]
    fn test_reverse_bits_wide() {
        for width in [1usize, 7, 64, 65, 128, 512, 600] {
            for i in [0, width / 2, width - 1] {
                let mut x = BitVec::from_elem(width, false);
                x.set(i, true);
                let reversed = reverse_bits_wide(&x);
                assert_eq!(reversed.len(), width);
                assert_eq!(reversed.get(width - 1 - i), Some(true));
                assert_eq!(reversed.iter().filter(|b| *b).count(), 1);
                assert_eq!(reverse_bits_wide(&reversed), x);
            }
        }
    }

    #[test]
    fn test_wide_matches_narrow() {
        let value = 0x0123_4567_89ab_cdef_fedc_ba98_7654_3210u128;
        let bits = words_to_bits(&[value], 128);
        let reversed = bits_to_words(&reverse_bits_wide(&bits), 128);
        assert_eq!(reversed, vec![reverse_bits(value, 128)]);
    }

    #[test]
    fn test_words_round_trip() {
        let words = vec![0xdead_beef, 0x1234_5678, 0x0];
        let bits = words_to_bits(&words, 32);
        assert_eq!(bits.len(), 96);
        assert_eq!(bits_to_words(&bits, 32), words);
    }

    #[test]
    fn test_sub_words() {
        let value = 0x0011_2233_4455_6677_8899_aabb_ccdd_eeffu128;
        let words = split_words(value, 128, 32);
        assert_eq!(words, vec![0xccdd_eeff, 0x8899_aabb, 0x4455_6677, 0x0011_2233]);
        assert_eq!(join_words(&words, 32), value);
        assert_eq!(split_words(value, 128, 64).len(), 2);
        assert_eq!(join_words(&split_words(value, 128, 64), 64), value);
    }
}

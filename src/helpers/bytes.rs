//! Little-endian readers over byte slices for the binary `.xls` containers.
//! Every accessor is bounds-checked: truncated files yield `None` instead of panicking.

/// Reads a `u8` at `offset`.
#[inline]
pub(crate) fn le_u8(bytes: &[u8], offset: usize) -> Option<u8> {
    bytes.get(offset).copied()
}

/// Reads a little-endian `u16` at `offset`.
#[inline]
pub(crate) fn le_u16(bytes: &[u8], offset: usize) -> Option<u16> {
    let chunk = bytes.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_le_bytes(chunk.try_into().ok()?))
}

/// Reads a little-endian `u32` at `offset`.
#[inline]
pub(crate) fn le_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let chunk = bytes.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes(chunk.try_into().ok()?))
}

/// Reads a little-endian `u64` at `offset`.
#[inline]
pub(crate) fn le_u64(bytes: &[u8], offset: usize) -> Option<u64> {
    let chunk = bytes.get(offset..offset.checked_add(8)?)?;
    Some(u64::from_le_bytes(chunk.try_into().ok()?))
}

/// Reads a little-endian IEEE-754 double at `offset`.
#[inline]
pub(crate) fn le_f64(bytes: &[u8], offset: usize) -> Option<f64> {
    le_u64(bytes, offset).map(f64::from_bits)
}

/// Splits a byte slice into little-endian `u32` words, ignoring a trailing partial word.
pub(crate) fn le_u32_words(bytes: &[u8]) -> impl Iterator<Item = u32> + '_ {
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_values() {
        let bytes = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        assert_eq!(le_u8(&bytes, 1), Some(0x02));
        assert_eq!(le_u16(&bytes, 0), Some(0x0201));
        assert_eq!(le_u32(&bytes, 4), Some(0x0807_0605));
        assert_eq!(le_u64(&bytes, 0), Some(0x0807_0605_0403_0201));
    }

    #[test]
    fn out_of_bounds_is_none() {
        let bytes = [0x01, 0x02, 0x03];
        assert_eq!(le_u16(&bytes, 2), None);
        assert_eq!(le_u32(&bytes, 0), None);
        assert_eq!(le_f64(&bytes, 0), None);
        assert_eq!(le_u16(&bytes, usize::MAX), None);
    }

    #[test]
    fn words_skip_partial_tail() {
        let bytes = [1, 0, 0, 0, 2, 0, 0, 0, 9];
        assert_eq!(le_u32_words(&bytes).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn reads_doubles() {
        let bytes = 2.5f64.to_le_bytes();
        assert_eq!(le_f64(&bytes, 0), Some(2.5));
    }
}

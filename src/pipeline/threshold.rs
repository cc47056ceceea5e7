//! Lineart/halftone threshold stage: packs 8 gray bytes into one output
//! bit each, against a per-column dynamic threshold curve.

/// Packs one gray row into lineart bits: `bit = gray < threshold_lut[x]`.
/// `threshold_lut` is indexed by column position and wraps if shorter than
/// the row (the noise-profile curve repeats across the line).
pub fn pack_lineart(gray_row: &[u8], threshold_lut: &[u8]) -> Vec<u8> {
    if threshold_lut.is_empty() {
        return pack_lineart(gray_row, &[128]);
    }
    let mut out = vec![0u8; (gray_row.len() + 7) / 8];
    for (x, &gray) in gray_row.iter().enumerate() {
        let threshold = threshold_lut[x % threshold_lut.len()];
        if gray < threshold {
            out[x / 8] |= 0x80 >> (x % 8);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_eight_pixels_per_byte() {
        let gray = vec![0u8, 255, 0, 255, 0, 255, 0, 255];
        let packed = pack_lineart(&gray, &[128]);
        assert_eq!(packed, vec![0b1010_1010]);
    }

    #[test]
    fn partial_byte_padded_with_zero_bits() {
        let gray = vec![0u8, 0, 0];
        let packed = pack_lineart(&gray, &[128]);
        assert_eq!(packed, vec![0b1110_0000]);
    }

    #[test]
    fn per_column_threshold_lut_is_honored() {
        let gray = vec![100u8, 100];
        // Column 0 threshold lower than the pixel (not set), column 1
        // threshold higher (set).
        let packed = pack_lineart(&gray, &[50, 150]);
        assert_eq!(packed, vec![0b0100_0000]);
    }
}

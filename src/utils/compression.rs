//! ECMA-335 II.23.2 compressed integer encoding.
//!
//! Signatures, blob length prefixes and custom attribute counts use a variable-width encoding of
//! 1, 2 or 4 bytes. The functions here compute and write that encoding; decoding lives on
//! [`crate::utils::Parser`].

use crate::Result;

/// Largest value representable as a compressed unsigned integer.
pub const MAX_COMPRESSED_UINT: u32 = 0x1FFF_FFFF;

/// Returns the number of bytes `value` occupies when compressed.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if `value` exceeds [`MAX_COMPRESSED_UINT`].
pub fn compressed_uint_size(value: u32) -> Result<usize> {
    match value {
        0..=0x7F => Ok(1),
        0x80..=0x3FFF => Ok(2),
        0x4000..=MAX_COMPRESSED_UINT => Ok(4),
        _ => Err(malformed_error!(
            "Value {:#x} is too large for a compressed integer",
            value
        )),
    }
}

/// Encodes `value` as a compressed unsigned integer into `out`.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if `value` exceeds [`MAX_COMPRESSED_UINT`].
pub fn write_compressed_uint(value: u32, out: &mut Vec<u8>) -> Result<()> {
    match compressed_uint_size(value)? {
        1 => out.push(value as u8),
        2 => {
            out.push(0x80 | (value >> 8) as u8);
            out.push(value as u8);
        }
        _ => {
            out.push(0xC0 | (value >> 24) as u8);
            out.push((value >> 16) as u8);
            out.push((value >> 8) as u8);
            out.push(value as u8);
        }
    }
    Ok(())
}

/// Encodes `value` as a compressed signed integer into `out`.
///
/// The magnitude is rotated left by one with the sign bit stored in bit 0, truncated to the
/// width chosen for the value's range (7, 14 or 29 bits).
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if `value` is outside `-2^28..2^28`.
pub fn write_compressed_int(value: i32, out: &mut Vec<u8>) -> Result<()> {
    #[allow(clippy::cast_sign_loss)]
    let rotated = |mask: u32| ((value << 1) as u32 & mask) | u32::from(value < 0);

    match value {
        -0x40..=0x3F => out.push(rotated(0x7F) as u8),
        -0x2000..=0x1FFF => {
            let encoded = rotated(0x3FFF);
            out.push(0x80 | (encoded >> 8) as u8);
            out.push(encoded as u8);
        }
        -0x1000_0000..=0x0FFF_FFFF => {
            let encoded = rotated(0x1FFF_FFFF);
            out.push(0xC0 | (encoded >> 24) as u8);
            out.push((encoded >> 16) as u8);
            out.push((encoded >> 8) as u8);
            out.push(encoded as u8);
        }
        _ => {
            return Err(malformed_error!(
                "Value {} is out of range for a compressed signed integer",
                value
            ))
        }
    }
    Ok(())
}

/// Returns the compressed encoding of `value` as a standalone vector.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if `value` exceeds [`MAX_COMPRESSED_UINT`].
pub fn compress_uint(value: u32) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(4);
    write_compressed_uint(value, &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uint_examples() -> Result<()> {
        // Examples from ECMA-335 II.23.2
        assert_eq!(compress_uint(0x03)?, vec![0x03]);
        assert_eq!(compress_uint(0x7F)?, vec![0x7F]);
        assert_eq!(compress_uint(0x80)?, vec![0x80, 0x80]);
        assert_eq!(compress_uint(0x2E57)?, vec![0xAE, 0x57]);
        assert_eq!(compress_uint(0x3FFF)?, vec![0xBF, 0xFF]);
        assert_eq!(compress_uint(0x4000)?, vec![0xC0, 0x00, 0x40, 0x00]);
        assert_eq!(
            compress_uint(0x1FFF_FFFF)?,
            vec![0xDF, 0xFF, 0xFF, 0xFF]
        );
        assert!(compress_uint(0x2000_0000).is_err());
        Ok(())
    }

    #[test]
    fn int_examples() -> Result<()> {
        let encode = |v: i32| -> Result<Vec<u8>> {
            let mut out = Vec::new();
            write_compressed_int(v, &mut out)?;
            Ok(out)
        };

        // Examples from ECMA-335 II.23.2
        assert_eq!(encode(3)?, vec![0x06]);
        assert_eq!(encode(-3)?, vec![0x7B]);
        assert_eq!(encode(64)?, vec![0x80, 0x80]);
        assert_eq!(encode(-64)?, vec![0x01]);
        assert_eq!(encode(8192)?, vec![0xC0, 0x00, 0x40, 0x00]);
        assert_eq!(encode(-8192)?, vec![0x80, 0x01]);
        assert_eq!(encode(268_435_455)?, vec![0xDF, 0xFF, 0xFF, 0xFE]);
        assert_eq!(encode(-268_435_456)?, vec![0xC0, 0x00, 0x00, 0x01]);
        Ok(())
    }

    #[test]
    fn sizes() -> Result<()> {
        assert_eq!(compressed_uint_size(0)?, 1);
        assert_eq!(compressed_uint_size(0x80)?, 2);
        assert_eq!(compressed_uint_size(0x4000)?, 4);
        Ok(())
    }
}

//! Little-endian primitive encoding shared by the buffer writer and the parser.
//!
//! All metadata structures emitted by this crate are little-endian. The [`CilIO`] trait gives
//! the [`crate::utils::ByteBuffer`] writer and the [`crate::utils::Parser`] reader one generic
//! entry point for every primitive type, so encode and decode paths stay symmetric.
//!
//! ## Supported Types
//! - **Unsigned integers**: `u8`, `u16`, `u32`, `u64`
//! - **Signed integers**: `i8`, `i16`, `i32`, `i64`
//! - **Floating point**: `f32`, `f64`

use crate::{Error::OutOfBounds, Result};

/// Trait for type-specific little-endian encoding of primitive values.
///
/// Each implementation defines a `Bytes` associated type that represents the fixed-size
/// byte array required for that particular type (e.g., `[u8; 4]` for `u32`).
pub trait CilIO: Sized + Copy {
    /// Associated type representing the byte array type for this numeric type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in little-endian
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_cil_io {
    ($($ty:ty => $len:expr),* $(,)?) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; $len];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_cil_io! {
    u8 => 1,
    i8 => 1,
    u16 => 2,
    i16 => 2,
    u32 => 4,
    i32 => 4,
    u64 => 8,
    i64 => 8,
    f32 => 4,
    f64 => 8,
}

/// Safely reads a value of type `T` in little-endian byte order at `offset`, advancing it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    if (type_len + *offset) > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..*offset + type_len].try_into() else {
        return Err(OutOfBounds);
    };

    *offset += type_len;

    Ok(T::from_le_bytes(read))
}

/// Safely writes a value of type `T` in little-endian byte order at `offset`, advancing it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn write_le_at<T: CilIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let type_len = std::mem::size_of::<T>();
    if (type_len + *offset) > data.len() {
        return Err(OutOfBounds);
    }

    let bytes = value.to_le_bytes();
    data[*offset..*offset + type_len].copy_from_slice(bytes.as_ref());
    *offset += type_len;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_symmetry() -> Result<()> {
        let mut data = [0u8; 14];
        let mut offset = 0;
        write_le_at(&mut data, &mut offset, 0x1234_u16)?;
        write_le_at(&mut data, &mut offset, -2_i32)?;
        write_le_at(&mut data, &mut offset, 1.5_f64)?;
        assert_eq!(offset, 14);
        assert_eq!(&data[..2], &[0x34, 0x12]);
        assert_eq!(&data[2..6], &[0xFE, 0xFF, 0xFF, 0xFF]);

        let mut offset = 0;
        assert_eq!(read_le_at::<u16>(&data, &mut offset)?, 0x1234);
        assert_eq!(read_le_at::<i32>(&data, &mut offset)?, -2);
        assert_eq!(read_le_at::<f64>(&data, &mut offset)?, 1.5);
        Ok(())
    }

    #[test]
    fn bounds_are_checked() {
        let mut data = [0u8; 3];
        let mut offset = 0;
        assert!(matches!(
            write_le_at(&mut data, &mut offset, 1_u32),
            Err(OutOfBounds)
        ));
        assert!(matches!(read_le_at::<u32>(&data, &mut offset), Err(OutOfBounds)));
        assert_eq!(offset, 0);
    }
}

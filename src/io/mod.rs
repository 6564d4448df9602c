//! [`BinaryOutput`] and [`BinaryInput`]: wire-level primitive byte I/O.
//!
//! All multi-byte primitives are big-endian; integers are two's complement
//! and floats are IEEE 754 bit patterns. Variable-length integers use
//! base-128 little-endian groups with a continuation bit, optionally zigzag
//! encoded so that small negative values stay compact.
use {
    crate::error::{deserialization_failure, serialization_failure, Result},
    std::io::{Read, Write},
};

pub use flate2::Compression;

mod input;
pub use input::{MemoryInput, SliceInput};

/// A sink for primitive binary values.
///
/// Implementors only provide [`BinaryOutput::write_bytes`]; everything else
/// is defined on top of it. The trait is object safe so that codecs can be
/// written against `&mut dyn BinaryOutput`.
pub trait BinaryOutput {
    /// Write raw bytes, no length prefix.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()>;

    #[inline]
    fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    #[inline]
    fn write_i8(&mut self, value: i8) -> Result<()> {
        self.write_u8(value as u8)
    }

    #[inline]
    fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    #[inline]
    fn write_i16(&mut self, value: i16) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    #[inline]
    fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    #[inline]
    fn write_i32(&mut self, value: i32) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    #[inline]
    fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    #[inline]
    fn write_i64(&mut self, value: i64) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    /// Write the IEEE 754 bit pattern, preserving NaN payloads.
    #[inline]
    fn write_f32(&mut self, value: f32) -> Result<()> {
        self.write_u32(value.to_bits())
    }

    #[inline]
    fn write_f64(&mut self, value: f64) -> Result<()> {
        self.write_u64(value.to_bits())
    }

    #[inline]
    fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_u8(value as u8)
    }

    /// Write a variable-length 32-bit integer in at most five bytes.
    ///
    /// With `optimize_for_positive` the raw bit pattern is emitted; without
    /// it the value is zigzag encoded first, keeping small negative values
    /// in one byte.
    fn write_var_int(&mut self, value: i32, optimize_for_positive: bool) -> Result<()> {
        let mut remaining = if optimize_for_positive {
            value as u32
        } else {
            ((value << 1) ^ (value >> 31)) as u32
        };
        loop {
            let group = (remaining & 0x7f) as u8;
            remaining >>= 7;
            if remaining == 0 {
                return self.write_u8(group);
            }
            self.write_u8(group | 0x80)?;
        }
    }

    /// Write a deflate-compressed blob.
    ///
    /// Empty input is a single `varint(0)`; otherwise the uncompressed
    /// length, the compressed length and the compressed bytes follow. The
    /// compression context is scoped to this call.
    fn write_compressed_byte_array(&mut self, data: &[u8], level: Compression) -> Result<()> {
        if data.is_empty() {
            return self.write_var_int(0, true);
        }
        let uncompressed_len = i32::try_from(data.len())
            .map_err(|_| serialization_failure("byte array length exceeds i32::MAX", None))?;
        let mut encoder = flate2::write::DeflateEncoder::new(Vec::new(), level);
        encoder
            .write_all(data)
            .and_then(|()| encoder.finish())
            .map_err(|e| serialization_failure("deflate stream failed", Some(Box::new(e))))
            .and_then(|compressed| {
                let compressed_len = i32::try_from(compressed.len()).map_err(|_| {
                    serialization_failure("compressed length exceeds i32::MAX", None)
                })?;
                self.write_var_int(uncompressed_len, true)?;
                self.write_var_int(compressed_len, true)?;
                self.write_bytes(&compressed)
            })
    }
}

/// A source of primitive binary values, mirroring [`BinaryOutput`].
pub trait BinaryInput {
    /// Fill `buf` completely or fail without a partial result.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Read exactly `len` bytes into a fresh buffer.
    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    #[inline]
    fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    #[inline]
    fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    #[inline]
    fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    #[inline]
    fn read_i16(&mut self) -> Result<i16> {
        let mut buf = [0u8; 2];
        self.read_exact(&mut buf)?;
        Ok(i16::from_be_bytes(buf))
    }

    #[inline]
    fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    #[inline]
    fn read_i32(&mut self) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(i32::from_be_bytes(buf))
    }

    #[inline]
    fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    #[inline]
    fn read_i64(&mut self) -> Result<i64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(i64::from_be_bytes(buf))
    }

    #[inline]
    fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    #[inline]
    fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(deserialization_failure(
                format!("invalid bool encoding: {other:#04x}"),
                None,
            )),
        }
    }

    /// Read a variable-length 32-bit integer written by
    /// [`BinaryOutput::write_var_int`] with the same `optimize_for_positive`.
    fn read_var_int(&mut self, optimize_for_positive: bool) -> Result<i32> {
        let mut raw: u32 = 0;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            raw |= ((byte & 0x7f) as u32) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
            if shift > 28 {
                return Err(deserialization_failure(
                    "variable-length integer exceeds five bytes",
                    None,
                ));
            }
        }
        Ok(if optimize_for_positive {
            raw as i32
        } else {
            ((raw >> 1) as i32) ^ -((raw & 1) as i32)
        })
    }

    /// Read a blob written by [`BinaryOutput::write_compressed_byte_array`].
    fn read_compressed_byte_array(&mut self) -> Result<Vec<u8>> {
        let uncompressed_len = self.read_var_int(true)?;
        if uncompressed_len == 0 {
            return Ok(Vec::new());
        }
        let uncompressed_len = usize::try_from(uncompressed_len).map_err(|_| {
            deserialization_failure("negative uncompressed length in compressed blob", None)
        })?;
        let compressed_len = usize::try_from(self.read_var_int(true)?).map_err(|_| {
            deserialization_failure("negative compressed length in compressed blob", None)
        })?;
        let compressed = self.read_bytes(compressed_len)?;
        let mut inflated = Vec::with_capacity(uncompressed_len);
        flate2::read::DeflateDecoder::new(compressed.as_slice())
            .read_to_end(&mut inflated)
            .map_err(|e| deserialization_failure("inflate stream failed", Some(Box::new(e))))?;
        if inflated.len() != uncompressed_len {
            return Err(deserialization_failure(
                format!(
                    "decompressed size {} does not match recorded size {uncompressed_len}",
                    inflated.len()
                ),
                None,
            ));
        }
        Ok(inflated)
    }
}

/// Appending output over a growable vector.
impl BinaryOutput for Vec<u8> {
    #[inline]
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, proptest::prelude::*};

    fn var_int_bytes(value: i32, optimize_for_positive: bool) -> Vec<u8> {
        let mut out = Vec::new();
        out.write_var_int(value, optimize_for_positive).unwrap();
        out
    }

    #[test]
    fn var_int_known_encodings() {
        assert_eq!(var_int_bytes(0, true), [0x00]);
        assert_eq!(var_int_bytes(1, true), [0x01]);
        assert_eq!(var_int_bytes(127, true), [0x7f]);
        assert_eq!(var_int_bytes(128, true), [0x80, 0x01]);
        // zigzag keeps small negatives small
        assert_eq!(var_int_bytes(0, false), [0x00]);
        assert_eq!(var_int_bytes(-1, false), [0x01]);
        assert_eq!(var_int_bytes(1, false), [0x02]);
        assert_eq!(var_int_bytes(5, false), [0x0a]);
        assert_eq!(var_int_bytes(-2, false), [0x03]);
        // without zigzag a negative takes the full five bytes
        assert_eq!(var_int_bytes(-1, true).len(), 5);
    }

    #[test]
    fn var_int_overlong_input_rejected() {
        let mut input = SliceInput::new(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x01]);
        assert!(input.read_var_int(true).is_err());
    }

    #[test]
    fn fixed_width_big_endian() {
        let mut out = Vec::new();
        out.write_i32(100).unwrap();
        assert_eq!(out, [0x00, 0x00, 0x00, 0x64]);

        let mut out = Vec::new();
        out.write_i16(-2).unwrap();
        assert_eq!(out, [0xff, 0xfe]);

        let mut out = Vec::new();
        out.write_f64(1.0).unwrap();
        assert_eq!(out, 1.0f64.to_bits().to_be_bytes());
    }

    #[test]
    fn bool_strict_decoding() {
        assert!(!SliceInput::new(&[0x00]).read_bool().unwrap());
        assert!(SliceInput::new(&[0x01]).read_bool().unwrap());
        assert!(SliceInput::new(&[0x02]).read_bool().is_err());
    }

    #[test]
    fn compressed_empty_is_single_byte() {
        let mut out = Vec::new();
        out.write_compressed_byte_array(&[], Compression::default())
            .unwrap();
        assert_eq!(out, [0x00]);
        assert_eq!(
            SliceInput::new(&out).read_compressed_byte_array().unwrap(),
            Vec::<u8>::new()
        );
    }

    #[test]
    fn compressed_length_mismatch_rejected() {
        let mut out = Vec::new();
        out.write_compressed_byte_array(&[7u8; 64], Compression::default())
            .unwrap();
        // lie about the uncompressed size
        let mut forged = Vec::new();
        forged.write_var_int(63, true).unwrap();
        forged.extend_from_slice(&out[1..]);
        assert!(SliceInput::new(&forged)
            .read_compressed_byte_array()
            .is_err());
    }

    proptest! {
        #[test]
        fn var_int_round_trip(value in any::<i32>(), optimize in any::<bool>()) {
            let bytes = var_int_bytes(value, optimize);
            prop_assert!(bytes.len() <= 5);
            let mut input = SliceInput::new(&bytes);
            prop_assert_eq!(input.read_var_int(optimize).unwrap(), value);
            prop_assert!(input.is_empty());
        }

        #[test]
        fn compressed_round_trip(data in proptest::collection::vec(any::<u8>(), 0..=512)) {
            let mut out = Vec::new();
            out.write_compressed_byte_array(&data, Compression::default()).unwrap();
            let mut input = SliceInput::new(&out);
            prop_assert_eq!(input.read_compressed_byte_array().unwrap(), data);
            prop_assert!(input.is_empty());
        }

        #[test]
        fn primitive_round_trip(a in any::<i64>(), b in any::<u16>(), c in any::<f32>()) {
            let mut out = Vec::new();
            out.write_i64(a).unwrap();
            out.write_u16(b).unwrap();
            out.write_f32(c).unwrap();
            let mut input = SliceInput::new(&out);
            prop_assert_eq!(input.read_i64().unwrap(), a);
            prop_assert_eq!(input.read_u16().unwrap(), b);
            prop_assert_eq!(input.read_f32().unwrap().to_bits(), c.to_bits());
        }
    }
}

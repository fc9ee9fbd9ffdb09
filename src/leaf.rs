//! Concrete value-element kinds: unsigned/signed integers, floats, text,
//! binary blobs and timestamps. Each is a thin const-generic wrapper over
//! a Rust primitive, parameterised by the element's EBML tag so that a
//! schema can simply name `UnsignedInteger<0x4286>` as a slot's type.

use crate::element::Element;
use crate::error::Error;
use crate::functional::{Buf, BufMut};
use crate::vint::VInt64;
use std::ops::Deref;

/// Bottom type for *unsigned integers*: big-endian, minimum width that
/// fits the value (zero width for `0`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct UnsignedInteger<const ID: u64>(pub u64);

/// Bottom type for *signed integers*: two's complement big-endian,
/// minimum width that fits the value.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SignedInteger<const ID: u64>(pub i64);

/// Bottom type for *floating point numbers*: decodes 4- or 8-byte
/// IEEE-754 big-endian payloads; encodes 4 bytes when the value round
/// trips losslessly through `f32`, 8 bytes otherwise.
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Default)]
pub struct FloatElement<const ID: u64>(pub f64);

/// Bottom type for *text strings*: UTF-8 decoding of the payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TextElement<const ID: u64>(pub String);

/// Bottom type for *timestamps*: signed 64-bit nanoseconds relative to
/// the fixed epoch `2001-01-01T00:00:00Z`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct DateElement<const ID: u64>(pub i64);

/// Bottom type for *raw binary data*: the payload, untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BinElement<const ID: u64>(pub Vec<u8>);

impl<const ID: u64> Deref for UnsignedInteger<ID> {
    type Target = u64;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
impl<const ID: u64> Deref for SignedInteger<ID> {
    type Target = i64;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
impl<const ID: u64> Deref for FloatElement<ID> {
    type Target = f64;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
impl<const ID: u64> Deref for TextElement<ID> {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
impl<const ID: u64> Deref for DateElement<ID> {
    type Target = i64;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
impl<const ID: u64> Deref for BinElement<ID> {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<const ID: u64> From<u64> for UnsignedInteger<ID> {
    fn from(v: u64) -> Self {
        Self(v)
    }
}
impl<const ID: u64> From<i64> for SignedInteger<ID> {
    fn from(v: i64) -> Self {
        Self(v)
    }
}
impl<const ID: u64> From<f64> for FloatElement<ID> {
    fn from(v: f64) -> Self {
        Self(v)
    }
}
impl<const ID: u64> From<String> for TextElement<ID> {
    fn from(v: String) -> Self {
        Self(v)
    }
}
impl<const ID: u64> From<Vec<u8>> for BinElement<ID> {
    fn from(v: Vec<u8>) -> Self {
        Self(v)
    }
}

impl<const ID: u64> Element for UnsignedInteger<ID> {
    const ID: VInt64 = VInt64::from_encoded(ID);

    fn decode_body(buf: &mut &[u8]) -> crate::Result<Self> {
        if buf.len() > 8 {
            return Err(Error::UnderDecode(Self::ID));
        }
        let len = buf.len();
        let mut value = [0u8; 8];
        value[8 - len..].copy_from_slice(buf);
        buf.advance(len);
        Ok(Self(u64::from_be_bytes(value)))
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> crate::Result<()> {
        let bytes = self.0.to_be_bytes();
        let first_non_zero = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
        buf.append_slice(&bytes[first_non_zero..]);
        Ok(())
    }

    fn encoded_body_size(&self) -> usize {
        let bytes = self.0.to_be_bytes();
        let first_non_zero = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
        bytes.len() - first_non_zero
    }
}

impl<const ID: u64> Element for SignedInteger<ID> {
    const ID: VInt64 = VInt64::from_encoded(ID);

    fn decode_body(buf: &mut &[u8]) -> crate::Result<Self> {
        if buf.len() > 8 {
            return Err(Error::UnderDecode(Self::ID));
        }
        if buf.is_empty() {
            return Ok(Self(0));
        }
        let negative = buf[0] & 0x80 != 0;
        let fill = if negative { 0xFFu8 } else { 0x00 };
        let mut value = [fill; 8];
        let len = buf.len();
        value[8 - len..].copy_from_slice(buf);
        buf.advance(len);
        Ok(Self(i64::from_be_bytes(value)))
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> crate::Result<()> {
        let bytes = self.0.to_be_bytes();
        let sign_byte = if self.0 < 0 { 0xFFu8 } else { 0x00u8 };
        let mut cut = 0;
        while cut < 7
            && bytes[cut] == sign_byte
            && (bytes[cut + 1] & 0x80 != 0) == (sign_byte == 0xFF)
        {
            cut += 1;
        }
        buf.append_slice(&bytes[cut..]);
        Ok(())
    }

    fn encoded_body_size(&self) -> usize {
        let mut scratch = Vec::new();
        self.encode_body(&mut scratch).expect("infallible");
        scratch.len()
    }
}

impl<const ID: u64> Element for FloatElement<ID> {
    const ID: VInt64 = VInt64::from_encoded(ID);

    fn decode_body(buf: &mut &[u8]) -> crate::Result<Self> {
        match buf.len() {
            0 => Ok(Self(0.0)),
            4 => {
                let bytes: [u8; 4] = buf[..4].try_into().expect("length checked");
                buf.advance(4);
                Ok(Self(f32::from_be_bytes(bytes) as f64))
            }
            8 => {
                let bytes: [u8; 8] = buf[..8].try_into().expect("length checked");
                buf.advance(8);
                Ok(Self(f64::from_be_bytes(bytes)))
            }
            _ => Err(Error::UnderDecode(Self::ID)),
        }
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> crate::Result<()> {
        let narrow = self.0 as f32;
        if narrow as f64 == self.0 {
            buf.append_slice(&narrow.to_be_bytes());
        } else {
            buf.append_slice(&self.0.to_be_bytes());
        }
        Ok(())
    }

    fn encoded_body_size(&self) -> usize {
        let narrow = self.0 as f32;
        if narrow as f64 == self.0 {
            4
        } else {
            8
        }
    }
}

impl<const ID: u64> Element for TextElement<ID> {
    const ID: VInt64 = VInt64::from_encoded(ID);

    fn decode_body(buf: &mut &[u8]) -> crate::Result<Self> {
        let s = std::str::from_utf8(buf)
            .map_err(|_| Error::UnderDecode(Self::ID))?
            .to_owned();
        buf.advance(buf.len());
        Ok(Self(s))
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> crate::Result<()> {
        buf.append_slice(self.0.as_bytes());
        Ok(())
    }

    fn encoded_body_size(&self) -> usize {
        self.0.len()
    }
}

impl<const ID: u64> Element for DateElement<ID> {
    const ID: VInt64 = VInt64::from_encoded(ID);

    fn decode_body(buf: &mut &[u8]) -> crate::Result<Self> {
        if buf.len() != 8 {
            return Err(Error::UnderDecode(Self::ID));
        }
        let bytes: [u8; 8] = buf[..8].try_into().expect("length checked");
        buf.advance(8);
        Ok(Self(i64::from_be_bytes(bytes)))
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> crate::Result<()> {
        buf.append_slice(&self.0.to_be_bytes());
        Ok(())
    }

    fn encoded_body_size(&self) -> usize {
        8
    }
}

impl<const ID: u64> Element for BinElement<ID> {
    const ID: VInt64 = VInt64::from_encoded(ID);

    fn decode_body(buf: &mut &[u8]) -> crate::Result<Self> {
        let v = buf.to_vec();
        buf.advance(buf.len());
        Ok(Self(v))
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> crate::Result<()> {
        buf.append_slice(&self.0);
        Ok(())
    }

    fn encoded_body_size(&self) -> usize {
        self.0.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_UINT: u64 = 0x12;
    const TEST_SINT: u64 = 0x13;
    const TEST_FLOAT: u64 = 0x14;
    const TEST_TEXT: u64 = 0x15;
    const TEST_DATE: u64 = 0x16;
    const TEST_BIN: u64 = 0x17;

    #[test]
    fn test_uint_round_trip() {
        let test_pair = [
            (vec![], 0u64),
            (vec![1u8], 1u64),
            (vec![0xFFu8], 255u64),
            (vec![0x01u8, 0], 256u64),
            (vec![0xFFu8, 0xFFu8], 2u64.pow(16) - 1),
            (vec![1, 0, 0, 0, 0, 0, 0, 0], 2u64.pow(56)),
            (vec![0xFF; 8], u64::MAX),
        ];
        for (encoded, decoded) in test_pair {
            let v = UnsignedInteger::<TEST_UINT>::decode_body(&mut &*encoded).unwrap();
            assert_eq!(v, UnsignedInteger(decoded));

            let mut buf = vec![];
            UnsignedInteger::<TEST_UINT>(decoded)
                .encode_body(&mut buf)
                .unwrap();
            assert_eq!(buf, encoded);
        }
    }

    #[test]
    fn test_sint_round_trip() {
        let test_pair: [(Vec<u8>, i64); 5] = [
            (vec![], 0),
            (vec![0x01], 1),
            (vec![0xFF], -1),
            (vec![0x00, 0x80], 128),
            (vec![0xFF, 0x7F], -129),
        ];
        for (encoded, decoded) in test_pair {
            let v = SignedInteger::<TEST_SINT>::decode_body(&mut &*encoded).unwrap();
            assert_eq!(v, SignedInteger(decoded), "decode {encoded:?}");

            let mut buf = vec![];
            SignedInteger::<TEST_SINT>(decoded)
                .encode_body(&mut buf)
                .unwrap();
            assert_eq!(buf, encoded, "encode {decoded}");
        }
    }

    #[test]
    fn test_float_decodes_4_and_8_byte() {
        let f4 = FloatElement::<TEST_FLOAT>::decode_body(&mut &1.5f32.to_be_bytes()[..]).unwrap();
        assert_eq!(f4.0, 1.5);

        let f8 = FloatElement::<TEST_FLOAT>::decode_body(&mut &1.0e300f64.to_be_bytes()[..])
            .unwrap();
        assert_eq!(f8.0, 1.0e300);
    }

    #[test]
    fn test_float_encode_prefers_narrow_when_lossless() {
        let mut buf = vec![];
        FloatElement::<TEST_FLOAT>(1.5).encode_body(&mut buf).unwrap();
        assert_eq!(buf.len(), 4);

        let mut buf8 = vec![];
        FloatElement::<TEST_FLOAT>(1.0e300)
            .encode_body(&mut buf8)
            .unwrap();
        assert_eq!(buf8.len(), 8);
    }

    #[test]
    fn test_text_round_trip() {
        let mut buf = vec![];
        TextElement::<TEST_TEXT>("test".to_owned())
            .encode_body(&mut buf)
            .unwrap();
        assert_eq!(buf, b"test");
        let decoded = TextElement::<TEST_TEXT>::decode_body(&mut &buf[..]).unwrap();
        assert_eq!(decoded.0, "test");
    }

    #[test]
    fn test_date_round_trip() {
        let mut buf = vec![];
        DateElement::<TEST_DATE>(42).encode_body(&mut buf).unwrap();
        assert_eq!(buf.len(), 8);
        let decoded = DateElement::<TEST_DATE>::decode_body(&mut &buf[..]).unwrap();
        assert_eq!(decoded.0, 42);
    }

    #[test]
    fn test_bin_round_trip() {
        let payload = vec![1u8, 2, 3, 4, 5];
        let mut buf = vec![];
        BinElement::<TEST_BIN>(payload.clone())
            .encode_body(&mut buf)
            .unwrap();
        assert_eq!(buf, payload);
        let decoded = BinElement::<TEST_BIN>::decode_body(&mut &buf[..]).unwrap();
        assert_eq!(decoded.0, payload);
    }
}

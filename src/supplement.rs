use std::ops::Deref;

use crate::element::Element;
use crate::functional::*;
use crate::vint::VInt64;

/// Void element, a filler used to reserve or obliterate space within a
/// master element's payload without disturbing its declared size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Void {
    /// Size of the void element in bytes.
    pub size: u64,
}
impl Element for Void {
    const ID: VInt64 = VInt64::from_encoded(0xEC);
    fn decode_body(buf: &mut &[u8]) -> crate::Result<Self> {
        let len = buf.len() as u64;
        buf.advance(buf.len());
        Ok(Self { size: len })
    }
    fn encode_body<B: BufMut>(&self, buf: &mut B) -> crate::Result<()> {
        buf.append_slice(&vec![0; self.size as usize]);
        Ok(())
    }
    fn encoded_body_size(&self) -> usize {
        self.size as usize
    }
}

/// CRC-32 element, used for integrity checking. The CRC-32 is stored as a little-endian u32.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crc32(pub u32);
impl Deref for Crc32 {
    type Target = u32;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
impl Element for Crc32 {
    const ID: VInt64 = VInt64::from_encoded(0xBF);
    fn decode_body(buf: &mut &[u8]) -> crate::Result<Self> {
        let buf = <[u8; 4]>::decode_exact(buf, 4)?;
        Ok(Self(u32::from_le_bytes(buf)))
    }
    fn encode_body<B: BufMut>(&self, buf: &mut B) -> crate::Result<()> {
        buf.append_slice(&self.0.to_le_bytes());
        Ok(())
    }
    fn encoded_body_size(&self) -> usize {
        4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_void_round_trip() {
        let mut buf = vec![];
        Void { size: 5 }.encode_body(&mut buf).unwrap();
        assert_eq!(buf, [0u8; 5]);
        let decoded = Void::decode_body(&mut &buf[..]).unwrap();
        assert_eq!(decoded.size, 5);
    }

    #[test]
    fn test_crc32_round_trip() {
        let mut buf = vec![];
        Crc32(0xDEADBEEF).encode_body(&mut buf).unwrap();
        assert_eq!(buf, [0xEF, 0xBE, 0xAD, 0xDE]);
        let decoded = Crc32::decode_body(&mut &buf[..]).unwrap();
        assert_eq!(*decoded, 0xDEADBEEF);
    }
}

//! The `Element` trait: the common contract every value and master
//! element type implements to plug into the generic decode/encode/read
//! pipeline.

use crate::error::Error;
use crate::functional::*;
use crate::vint::*;

/// A typed element identified by a fixed EBML tag.
///
/// Implementors provide only the body-level `decode_body`/`encode_body`
/// pair; the header-level `Decode`/`Encode`/`ReadFrom` blanket impls below
/// take care of reading and writing the surrounding `(tag, size)` header
/// and translating buffer-exhaustion into the element-scoped
/// over-decode/under-decode errors.
pub trait Element: Sized {
    /// The element's EBML tag.
    const ID: VInt64;
    /// Whether decoding may substitute a default value when the element is
    /// altogether absent from its parent (used by optional schema slots).
    const HAS_DEFAULT_VALUE: bool = false;

    /// Decode the element's body from a buffer positioned at its first
    /// payload byte, populated with exactly `size` bytes of payload.
    fn decode_body(buf: &mut &[u8]) -> crate::Result<Self>;

    /// Encode the element's body (payload only, no header) to `buf`.
    fn encode_body<B: BufMut>(&self, buf: &mut B) -> crate::Result<()>;

    /// The exact byte length `encode_body` will produce. The default
    /// implementation encodes into a scratch buffer and measures it;
    /// override when the length is cheaper to compute directly.
    fn encoded_body_size(&self) -> usize {
        let mut scratch = Vec::new();
        // encode_body is expected to be infallible into a Vec; any error
        // here indicates a bug in the implementor, not bad input.
        self.encode_body(&mut scratch)
            .expect("encode_body failed while measuring encoded_body_size");
        scratch.len()
    }
}

impl<T: Element> Decode for T {
    fn decode(buf: &mut &[u8]) -> crate::Result<Self> {
        let header = Header::decode(buf)?;
        let body_size = *header.size as usize;
        if buf.remaining() < body_size {
            return Err(Error::OutOfBounds);
        }
        let mut body = buf.slice(body_size);
        let element = match T::decode_body(&mut body) {
            Ok(e) => e,
            Err(Error::OutOfBounds) => return Err(Error::OverDecode(Self::ID)),
            Err(Error::ShortRead) => return Err(Error::UnderDecode(Self::ID)),
            Err(e) => return Err(e),
        };

        if body.has_remaining() {
            return Err(Error::UnderDecode(Self::ID));
        }

        buf.advance(body_size);
        Ok(element)
    }
}

impl<T: Element> Encode for T {
    fn encode<B: BufMut>(&self, buf: &mut B) -> crate::Result<()> {
        let mut body_buf = Vec::new();
        self.encode_body(&mut body_buf)?;
        let expected = self.encoded_body_size();
        if body_buf.len() != expected {
            return Err(Error::EncodeSizeMismatch {
                actual: body_buf.len(),
                expected,
            });
        }
        let header = Header {
            id: T::ID,
            size: VInt64::new(body_buf.len() as u64),
        };
        header.encode(buf)?;
        buf.append_slice(&body_buf);
        Ok(())
    }
}

impl<T: Element> ReadFrom for T {
    fn read_from<R: std::io::Read>(r: &mut R) -> crate::Result<Self> {
        let header = Header::read_from(r)?;
        let body = header.read_body(r)?;
        match T::decode_body(&mut &body[..]) {
            Ok(e) => Ok(e),
            Err(Error::OutOfBounds) => Err(Error::OverDecode(Self::ID)),
            Err(Error::ShortRead) => Err(Error::UnderDecode(Self::ID)),
            Err(e) => Err(e),
        }
    }
}

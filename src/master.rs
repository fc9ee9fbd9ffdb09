//! Master elements held entirely in memory: a schema-driven decode/encode
//! pipeline over a payload slice, generalizing the class-specific
//! generated decoders of a concrete application schema into one
//! declarative macro.

use crate::element::*;
use crate::functional::*;
use crate::leaf::*;
use crate::supplement::*;
use crate::vint::*;
use crate::Error;

/// A master element's schema additionally declares whether child tags it
/// does not recognize should be tolerated (and retained verbatim) or
/// treated as a decode error.
pub trait MasterElement: Element {
    /// Whether an unrecognized child tag is retained as an opaque element
    /// rather than rejected.
    const ALLOW_UNKNOWN: bool = false;
}

/// A child element whose tag is not covered by the enclosing master's
/// schema, retained verbatim so that `encode(decode(bytes)) == bytes` for
/// any master decoded with `allow_unknown = true`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unknown {
    /// The unrecognized child's tag.
    pub tag: VInt64,
    /// The unrecognized child's raw payload.
    pub payload: Vec<u8>,
}

impl Encode for Unknown {
    fn encode<B: BufMut>(&self, buf: &mut B) -> crate::Result<()> {
        let header = Header {
            id: self.tag,
            size: VInt64::new(self.payload.len() as u64),
        };
        header.encode(buf)?;
        buf.append_slice(&self.payload);
        Ok(())
    }
}

/// Generates `decode_body`/`encode_body` for a master element struct given
/// its required, optional, and list-valued ("multiple") child slots.
///
/// Implements the decode algorithm of a schema-driven master element:
/// scan the payload into `(tag, size, payload)` triples, dispatch each to
/// its schema slot (or to the overflow `unknown` list when
/// `allow_unknown` is set), reject a second value for a singleton slot,
/// and fail after the scan if any required slot is still empty. `Void`
/// and `Crc32` children are always accepted regardless of schema and
/// merged/captured into the `void`/`crc32` fields every generated struct
/// must declare alongside its slots.
///
/// The generated struct must also declare an `unknown: Vec<Unknown>`
/// field; it stays empty whenever `allow_unknown: false`.
macro_rules! master_schema {
    (
        allow_unknown: $allow_unknown:expr,
        required: [$($required:ident),*$(,)?],
        optional: [$($optional:ident),*$(,)?],
        multiple: [$($multiple:ident),*$(,)?],
    ) => {
        paste::paste! {
            fn decode_body(buf: &mut &[u8]) -> crate::Result<Self> {
                let mut crc32: Option<Crc32> = None;
                $( let mut [<$required:snake>] = None;)*
                $( let mut [<$optional:snake>] = None;)*
                $( let mut [<$multiple:snake>] = Vec::new();)*
                let mut void: Option<Void> = None;
                let mut unknown: Vec<Unknown> = Vec::new();

                while buf.has_remaining() {
                    let header = Header::decode(buf)?;
                    match header.id {
                        id if id == Crc32::ID => {
                            if crc32.is_some() {
                                return Err(Error::DuplicateElement { id, parent: Self::ID });
                            }
                            crc32 = Some(Crc32::decode_element(&header, buf)?);
                        }
                        $( id if id == $required::ID => {
                            if [<$required:snake>].is_some() {
                                return Err(Error::DuplicateElement { id, parent: Self::ID });
                            }
                            [<$required:snake>] = Some($required::decode_element(&header, buf)?);
                        } )*
                        $( id if id == $optional::ID => {
                            if [<$optional:snake>].is_some() {
                                return Err(Error::DuplicateElement { id, parent: Self::ID });
                            }
                            [<$optional:snake>] = Some($optional::decode_element(&header, buf)?);
                        } )*
                        $( id if id == $multiple::ID => {
                            [<$multiple:snake>].push($multiple::decode_element(&header, buf)?);
                        } )*
                        id if id == Void::ID => {
                            let v = Void::decode_element(&header, buf)?;
                            void = Some(match void {
                                Some(previous) => Void { size: previous.size + v.size },
                                None => v,
                            });
                            log::debug!("skipping void in element {}, size {}B", Self::ID, *header.size);
                        }
                        other => {
                            if $allow_unknown {
                                let size = *header.size as usize;
                                if buf.remaining() < size {
                                    return Err(Error::OutOfBounds);
                                }
                                let payload = buf.slice(size).to_vec();
                                buf.advance(size);
                                log::warn!(
                                    "unrecognized element {other} ({size}B) in element {}",
                                    Self::ID
                                );
                                unknown.push(Unknown { tag: other, payload });
                            } else {
                                return Err(Error::UnrecognizedElement { id: other, parent: Self::ID });
                            }
                        }
                    }
                }

                if buf.has_remaining() {
                    return Err(Error::ShortRead);
                }

                Ok(Self {
                    crc32,
                    $( [<$required:snake>]: [<$required:snake>]
                        .or_else(|| if $required::HAS_DEFAULT_VALUE { Some($required::default()) } else { None })
                        .ok_or(Error::MissingElement($required::ID))?, )*
                    $( [<$optional:snake>], )*
                    $( [<$multiple:snake>], )*
                    unknown,
                    void,
                })
            }

            fn encode_body<B: BufMut>(&self, buf: &mut B) -> crate::Result<()> {
                self.crc32.encode(buf)?;
                $( self.[<$required:snake>].encode(buf)?; )*
                $( self.[<$optional:snake>].encode(buf)?; )*
                $( self.[<$multiple:snake>].encode(buf)?; )*
                for child in &self.unknown {
                    child.encode(buf)?;
                }
                self.void.encode(buf)?;
                Ok(())
            }
        }
    };
}

/// `EBMLVersion`: indicates the version of the container format in use.
pub type EbmlVersion = UnsignedInteger<0x4286>;
/// `DocType`: the name of the application schema layered on top of this
/// core (an external collaborator concern; the core only round-trips the
/// string).
pub type DocType = TextElement<0x4282>;

/// The document header: the first element of any file in this family,
/// naming the container version and the application schema that
/// interprets the body that follows it. This is the generic EBML-layer
/// header (tag `0x1A45DFA3`); any schema-specific header fields belong to
/// an external collaborator's own master type built with
/// [`master_schema`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DocumentHeader {
    /// Optional CRC-32 element for integrity checking.
    pub crc32: Option<Crc32>,
    /// Container format version in use.
    pub ebml_version: EbmlVersion,
    /// Name of the application schema layered on top of this container.
    pub doc_type: DocType,
    /// Children with tags not covered by this schema, retained verbatim.
    pub unknown: Vec<Unknown>,
    /// Void filler, if one was present.
    pub void: Option<Void>,
}

impl Element for DocumentHeader {
    const ID: VInt64 = VInt64::from_encoded(0x1A45DFA3);

    master_schema! {
        allow_unknown: true,
        required: [ EbmlVersion, DocType ],
        optional: [ ],
        multiple: [ ],
    }
}

impl MasterElement for DocumentHeader {
    const ALLOW_UNKNOWN: bool = true;
}

#[cfg(test)]
mod tests {
    use super::*;

    // S2: a minimal document header with two required children.
    const MINIMAL_HEADER: &[u8] = &[
        0x1A, 0x45, 0xDF, 0xA3, 0x88, 0x42, 0x86, 0x81, 0x01, 0x42, 0x82, 0x84, 0x74, 0x65, 0x73,
        0x74,
    ];

    #[test]
    fn test_decode_minimal_document_header() {
        let mut buf = MINIMAL_HEADER;
        let header = DocumentHeader::decode(&mut buf).unwrap();
        assert_eq!(*header.ebml_version, 1);
        assert_eq!(&*header.doc_type, "test");
        assert!(header.unknown.is_empty());
        assert!(!buf.has_remaining());
    }

    #[test]
    fn test_round_trip_minimal_document_header() {
        let mut buf = MINIMAL_HEADER;
        let header = DocumentHeader::decode(&mut buf).unwrap();
        let mut out = vec![];
        header.encode(&mut out).unwrap();
        assert_eq!(out, MINIMAL_HEADER);
    }

    #[test]
    fn test_missing_required_slot_is_decode_error() {
        // Only EBMLVersion, no DocType.
        let bytes = [0x1A, 0x45, 0xDF, 0xA3, 0x84, 0x42, 0x86, 0x81, 0x01];
        let mut buf = &bytes[..];
        let err = DocumentHeader::decode(&mut buf).unwrap_err();
        assert!(matches!(err, Error::MissingElement(_)));
    }

    #[test]
    fn test_duplicate_required_slot_is_decode_error() {
        let mut doubled = MINIMAL_HEADER[4..].to_vec();
        doubled.extend_from_slice(&MINIMAL_HEADER[4..12]); // repeat EBMLVersion
        let mut header_bytes = vec![0x1A, 0x45, 0xDF, 0xA3];
        VInt64::new(doubled.len() as u64)
            .encode(&mut header_bytes)
            .unwrap();
        header_bytes.extend_from_slice(&doubled);

        let mut buf = &header_bytes[..];
        let err = DocumentHeader::decode(&mut buf).unwrap_err();
        assert!(matches!(err, Error::DuplicateElement { .. }));
    }

    #[test]
    fn test_unknown_child_retained_when_allowed() {
        // An unrecognized tag 0x80 with a 1-byte payload inserted before DocType.
        let body = [
            0x42, 0x86, 0x81, 0x01, // EBMLVersion = 1
            0x80, 0x81, 0xAA, // unknown(0x80) = [0xAA]
            0x42, 0x82, 0x84, b't', b'e', b's', b't', // DocType = "test"
        ];
        let mut header_bytes = vec![0x1A, 0x45, 0xDF, 0xA3];
        VInt64::new(body.len() as u64)
            .encode(&mut header_bytes)
            .unwrap();
        header_bytes.extend_from_slice(&body);

        let mut buf = &header_bytes[..];
        let decoded = DocumentHeader::decode(&mut buf).unwrap();
        assert_eq!(decoded.unknown.len(), 1);
        assert_eq!(decoded.unknown[0].payload, vec![0xAA]);

        let mut out = vec![];
        decoded.encode(&mut out).unwrap();
        assert_eq!(out, header_bytes);
    }
}

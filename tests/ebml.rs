use ebml_vault::prelude::*;

#[test]
fn read_document_header() {
    use ebml_vault::io::blocking_impl::*;
    let bytes = [
        0x1A, 0x45, 0xDF, 0xA3, 0x8B, 0x42, 0x86, 0x81, 0x01, 0x42, 0x82, 0x84, b'g', b'e', b'n',
        b'c',
    ];
    let mut cursor = std::io::Cursor::new(bytes);
    let header = DocumentHeader::read_from(&mut cursor).unwrap();
    assert_eq!(*header.ebml_version, 1);
    assert_eq!(&*header.doc_type, "genc");
    assert!(header.crc32.is_none());
    assert!(header.void.is_none());
}

#[test]
fn write_then_read_document_header() {
    use ebml_vault::io::blocking_impl::*;
    let header = DocumentHeader {
        crc32: None,
        ebml_version: EbmlVersion::from(1),
        doc_type: DocType::from("genc".to_string()),
        unknown: vec![],
        void: None,
    };
    let mut buf = Vec::new();
    header.write_to(&mut buf).unwrap();
    let read_back = DocumentHeader::read_from(&mut &buf[..]).unwrap();
    assert_eq!(header, read_back);
}

#[cfg(feature = "tokio")]
#[tokio::test]
async fn read_document_header_tokio() {
    use ebml_vault::io::tokio_impl::*;

    let bytes = [
        0x1A, 0x45, 0xDF, 0xA3, 0x8B, 0x42, 0x86, 0x81, 0x01, 0x42, 0x82, 0x84, b'g', b'e', b'n',
        b'c',
    ];
    let mut cursor = std::io::Cursor::new(bytes);
    let header = DocumentHeader::async_read_from(&mut cursor).await.unwrap();
    assert_eq!(*header.ebml_version, 1);
    assert_eq!(&*header.doc_type, "genc");
}

#[cfg(feature = "tokio")]
#[tokio::test]
async fn write_then_read_document_header_tokio() {
    use ebml_vault::io::tokio_impl::*;
    let header = DocumentHeader {
        crc32: None,
        ebml_version: EbmlVersion::from(1),
        doc_type: DocType::from("genc".to_string()),
        unknown: vec![],
        void: None,
    };
    let mut buf = Vec::new();
    header.async_write_to(&mut buf).await.unwrap();
    let read_back = DocumentHeader::async_read_from(&mut &buf[..]).await.unwrap();
    assert_eq!(header, read_back);
}

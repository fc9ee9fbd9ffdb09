//! A [`Document`] binds the generic EBML header to a body root whose
//! children live directly in an open file, rather than in memory, via
//! [`InFileMaster`](crate::file::InFileMaster).
//!
//! Unlike the in-memory master elements of [`crate::master`], a document's
//! body is never fully decoded: opening one reads the header and scans
//! the body's immediate children into an offset index, and every mutation
//! after that touches only the file and that index.

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::sync::Arc;

use crate::file::{Child, ChildFactory, ChildIter, InFileMaster};
use crate::io::blocking_impl::WriteTo;
use crate::master::DocumentHeader;
use crate::vint::{ReadFrom, VInt64};

/// A document: a [`DocumentHeader`] followed by a body root whose
/// children are added, read, moved, and removed in place in the
/// underlying file.
pub struct Document {
    header: DocumentHeader,
    body: InFileMaster,
}

impl Document {
    /// Write `header` to `file` at its current position, then allocate a
    /// fresh, empty body root right after it.
    pub fn create(
        mut file: File,
        header: DocumentHeader,
        body_tag: VInt64,
        size_vint_width: usize,
        initial_body_size: u64,
        factory: Arc<dyn ChildFactory>,
    ) -> crate::Result<Self> {
        header.write_to(&mut file)?;
        let body_offset = file.stream_position()?;
        let body = InFileMaster::create_root(
            file,
            body_offset,
            body_tag,
            size_vint_width,
            initial_body_size,
            factory,
        )?;
        Ok(Self { header, body })
    }

    /// Read an existing [`DocumentHeader`] from `file`, then open and
    /// scan the body root that immediately follows it.
    pub fn open(mut file: File, factory: Arc<dyn ChildFactory>) -> crate::Result<Self> {
        let header = DocumentHeader::read_from(&mut file)?;
        let body_offset = file.stream_position()?;
        let body = InFileMaster::open_root(file, body_offset, None, factory)?;
        Ok(Self { header, body })
    }

    /// The document header.
    pub fn header(&self) -> &DocumentHeader {
        &self.header
    }

    /// The body root, for callers that need the full in-file master API
    /// (resize, insert/collapse range, move, and so on).
    pub fn body(&self) -> &InFileMaster {
        &self.body
    }

    /// Write a non-master child into the body at `offset`. See
    /// [`InFileMaster::add_value_child`].
    pub fn add_value_child(&self, offset: u64, tag: VInt64, payload: &[u8]) -> crate::Result<()> {
        self.body.add_value_child(offset, tag, payload)
    }

    /// Allocate a nested master child in the body at `offset`. See
    /// [`InFileMaster::add_master_child`].
    pub fn add_master_child(
        &self,
        offset: u64,
        tag: VInt64,
        size_vint_width: usize,
        initial_size: u64,
    ) -> crate::Result<InFileMaster> {
        self.body
            .add_master_child(offset, tag, size_vint_width, initial_size)
    }

    /// Remove the body child registered at `offset`.
    pub fn remove_child(&self, offset: u64) -> crate::Result<()> {
        self.body.remove_child(offset)
    }

    /// Hydrate the body child at `offset`.
    pub fn get_child(&self, offset: u64) -> crate::Result<Child> {
        self.body.get_child(offset)
    }

    /// Iterate the body's direct children in offset order.
    pub fn iter_children(&self) -> ChildIter {
        self.body.iter_children()
    }

    /// Shrink the body's declared size down to the end of its last child
    /// and rewrite its size field, discarding any trailing slack. The gap
    /// index itself needs no further cleanup: every mutating operation
    /// already leaves `Void` fillers covering every gap as it happens,
    /// rather than deferring that bookkeeping to this call.
    pub fn close(self) -> crate::Result<()> {
        let last_end = self.body.end_of_last_child();
        if self.body.data_size() != last_end {
            self.body.resize(last_end)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::NoMasterChildren;
    use crate::master::{DocType, EbmlVersion};

    const BODY_TAG: VInt64 = VInt64::from_encoded(0x18538067);
    const CHILD_TAG: VInt64 = VInt64::from_encoded(0x80);

    fn sample_header() -> DocumentHeader {
        DocumentHeader {
            crc32: None,
            ebml_version: EbmlVersion::from(1),
            doc_type: DocType::from("test".to_owned()),
            unknown: vec![],
            void: None,
        }
    }

    #[test]
    fn create_then_add_and_read_back() {
        let file = tempfile::tempfile().unwrap();
        let doc = Document::create(
            file,
            sample_header(),
            BODY_TAG,
            4,
            256,
            Arc::new(NoMasterChildren),
        )
        .unwrap();

        doc.add_value_child(0, CHILD_TAG, &[1, 2, 3]).unwrap();
        let Child::Leaf { payload, .. } = doc.get_child(0).unwrap() else {
            panic!("expected leaf");
        };
        assert_eq!(payload, vec![1, 2, 3]);
        assert_eq!(&*doc.header().doc_type, "test");
    }

    #[test]
    fn reopen_round_trips_header_and_body() {
        let mut file = tempfile::tempfile().unwrap();
        {
            let doc = Document::create(
                file.try_clone().unwrap(),
                sample_header(),
                BODY_TAG,
                4,
                256,
                Arc::new(NoMasterChildren),
            )
            .unwrap();
            doc.add_value_child(0, CHILD_TAG, &[9]).unwrap();
        }
        file.seek(SeekFrom::Start(0)).unwrap();
        let reopened = Document::open(file, Arc::new(NoMasterChildren)).unwrap();
        assert_eq!(*reopened.header().ebml_version, 1);
        let Child::Leaf { payload, .. } = reopened.get_child(0).unwrap() else {
            panic!("expected leaf");
        };
        assert_eq!(payload, vec![9]);
    }

    #[test]
    fn close_trims_trailing_slack() {
        let mut file = tempfile::tempfile().unwrap();
        let doc = Document::create(
            file.try_clone().unwrap(),
            sample_header(),
            BODY_TAG,
            4,
            4096,
            Arc::new(NoMasterChildren),
        )
        .unwrap();
        doc.add_value_child(0, CHILD_TAG, &[1]).unwrap();
        let end = doc.body().end_of_last_child();
        doc.close().unwrap();

        file.seek(SeekFrom::Start(0)).unwrap();
        let reopened = Document::open(file, Arc::new(NoMasterChildren)).unwrap();
        assert_eq!(reopened.body().data_size(), end);
    }
}

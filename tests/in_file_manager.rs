use std::io::{Seek, SeekFrom};
use std::sync::Arc;

use ebml_vault::prelude::*;

const ROOT_TAG: VInt64 = VInt64::from_encoded(0x18538067);
const CHILD_TAG: VInt64 = VInt64::from_encoded(0x80);
const SUB_TAG: VInt64 = VInt64::from_encoded(0x81);

struct OneLevelFactory;
impl ChildFactory for OneLevelFactory {
    fn is_master(&self, tag: VInt64) -> bool {
        tag == SUB_TAG
    }
}

#[test]
fn mutation_scenario_add_remove_move_resize() {
    let file = tempfile::tempfile().unwrap();
    let root = InFileMaster::create_root(file, 0, ROOT_TAG, 4, 1024, Arc::new(NoMasterChildren)).unwrap();

    root.add_value_child(0, CHILD_TAG, b"hello").unwrap();
    root.add_value_child(64, CHILD_TAG, b"world").unwrap();

    let offsets: Vec<u64> = root
        .iter_children()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
        .into_iter()
        .map(|_| 0)
        .collect();
    assert_eq!(offsets.len(), 2);

    root.move_child(0, 32).unwrap();
    let Child::Leaf { payload, .. } = root.get_child(32).unwrap() else {
        panic!("expected leaf");
    };
    assert_eq!(payload, b"hello");

    root.remove_child(64).unwrap();
    assert!(root.get_child(64).is_err());

    root.resize(2048).unwrap();
    assert_eq!(root.data_size(), 2048);
}

#[test]
fn document_header_plus_in_file_body_round_trips() {
    let mut file = tempfile::tempfile().unwrap();
    let header = DocumentHeader {
        crc32: None,
        ebml_version: EbmlVersion::from(1),
        doc_type: DocType::from("vault".to_owned()),
        unknown: vec![],
        void: None,
    };

    {
        let doc = Document::create(
            file.try_clone().unwrap(),
            header.clone(),
            ROOT_TAG,
            4,
            4096,
            Arc::new(OneLevelFactory),
        )
        .unwrap();

        let sub = doc.add_master_child(0, SUB_TAG, 4, 512).unwrap();
        sub.add_value_child(0, CHILD_TAG, b"nested").unwrap();
    }

    file.seek(SeekFrom::Start(0)).unwrap();
    let reopened = Document::open(file, Arc::new(OneLevelFactory)).unwrap();
    assert_eq!(&*reopened.header().doc_type, "vault");

    let Child::Master(sub) = reopened.get_child(0).unwrap() else {
        panic!("expected nested master");
    };
    let Child::Leaf { payload, .. } = sub.get_child(0).unwrap() else {
        panic!("expected leaf");
    };
    assert_eq!(payload, b"nested");
}

#[test]
fn insert_then_collapse_range_are_inverses() {
    let file = tempfile::tempfile().unwrap();
    let root = InFileMaster::create_root(file, 0, ROOT_TAG, 8, 4096, Arc::new(NoMasterChildren)).unwrap();
    root.add_value_child(0, CHILD_TAG, b"fixed").unwrap();

    let before = root.data_size();
    root.insert_range(4096, 1024).unwrap();
    assert_eq!(root.data_size(), before + 1024);

    root.collapse_range(4096, 1024).unwrap();
    assert_eq!(root.data_size(), before);

    let Child::Leaf { payload, .. } = root.get_child(0).unwrap() else {
        panic!("expected leaf");
    };
    assert_eq!(payload, b"fixed");
}

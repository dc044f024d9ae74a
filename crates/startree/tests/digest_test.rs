//! Integration tests for segment digests over real store files.

use alopex_startree::digest::{SegmentDigest, SEGMENT_CREATION_META};
use alopex_startree::{CircularBufferStore, Dictionary, RecordSchema, StarTreeRecord, StoreConfig};
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use uuid::Uuid;

fn write_segment(dir: &Path, metric: i64) {
    let schema = RecordSchema::new(["A"], ["M"]).unwrap();
    let dictionary = Dictionary::builder().dimension("A", ["a0", "a1"]).build();
    let store = CircularBufferStore::new(
        Uuid::new_v4(),
        dir.join("records.buf"),
        schema,
        &dictionary,
        StoreConfig::default().with_max_records(8),
    )
    .unwrap();
    store.open().unwrap();
    store
        .append(&StarTreeRecord::new(vec!["a0".into()], vec![metric], 0))
        .unwrap();
    store.close().unwrap();

    fs::create_dir_all(dir.join("index")).unwrap();
    fs::write(dir.join("index").join("forward.idx"), b"a0=2\na1=3\n").unwrap();
}

#[test]
fn test_digest_is_deterministic() {
    let temp_dir = TempDir::new().unwrap();
    write_segment(temp_dir.path(), 1);

    let first = SegmentDigest::for_all_files_in_folder(temp_dir.path()).unwrap();
    let second = SegmentDigest::for_all_files_in_folder(temp_dir.path()).unwrap();
    assert_eq!(first.files().len(), 2);
    assert_eq!(first.compute_checksum().unwrap(), second.compute_checksum().unwrap());

    let digest = first.compute_digest().unwrap();
    assert_eq!(digest, second.compute_digest().unwrap());
    assert_eq!(digest.len(), 32);
    assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
}

#[test]
fn test_known_fingerprints_across_files() {
    let temp_dir = TempDir::new().unwrap();
    fs::create_dir(temp_dir.path().join("part")).unwrap();
    fs::write(temp_dir.path().join("a.bin"), b"hello").unwrap();
    fs::write(temp_dir.path().join("part").join("b.bin"), b" world").unwrap();

    let digest = SegmentDigest::for_all_files_in_folder(temp_dir.path()).unwrap();
    assert_eq!(digest.compute_checksum().unwrap(), 0x1A0B_045D);
    assert_eq!(
        digest.compute_digest().unwrap(),
        "5EB63BBBE01EEED093CB22BB8F5ACDC3"
    );
}

#[test]
fn test_identical_segments_share_digest() {
    let left = TempDir::new().unwrap();
    let right = TempDir::new().unwrap();
    write_segment(left.path(), 7);
    write_segment(right.path(), 7);

    let left = SegmentDigest::for_all_files_in_folder(left.path()).unwrap();
    let right = SegmentDigest::for_all_files_in_folder(right.path()).unwrap();
    assert_eq!(left.compute_digest().unwrap(), right.compute_digest().unwrap());
    assert_eq!(left.compute_checksum().unwrap(), right.compute_checksum().unwrap());
}

#[test]
fn test_changed_record_changes_digest() {
    let left = TempDir::new().unwrap();
    let right = TempDir::new().unwrap();
    write_segment(left.path(), 1);
    write_segment(right.path(), 2);

    let left = SegmentDigest::for_all_files_in_folder(left.path()).unwrap();
    let right = SegmentDigest::for_all_files_in_folder(right.path()).unwrap();
    assert_ne!(left.compute_digest().unwrap(), right.compute_digest().unwrap());
    assert_ne!(left.compute_checksum().unwrap(), right.compute_checksum().unwrap());
}

#[test]
fn test_creation_meta_is_excluded() {
    let temp_dir = TempDir::new().unwrap();
    write_segment(temp_dir.path(), 1);
    let before = SegmentDigest::for_all_files_in_folder(temp_dir.path())
        .unwrap()
        .compute_digest()
        .unwrap();

    fs::write(temp_dir.path().join(SEGMENT_CREATION_META), b"created=1").unwrap();
    let digest = SegmentDigest::for_all_files_in_folder(temp_dir.path()).unwrap();
    assert_eq!(digest.files().len(), 2);
    assert_eq!(digest.compute_digest().unwrap(), before);

    fs::write(temp_dir.path().join(SEGMENT_CREATION_META), b"created=2").unwrap();
    let digest = SegmentDigest::for_all_files_in_folder(temp_dir.path()).unwrap();
    assert_eq!(digest.compute_digest().unwrap(), before);
}

#[path = "common/mod.rs"]
mod common;

use common::*;
use tqload::{LineStream, LoadError};

/// Two plain files and one compressed file, read as one stream:
/// records come out in list order, within-file order preserved, with line
/// terminators (including `\r\n`) stripped.
#[test]
fn reads_files_in_order_across_formats() {
    let tmp = tempfile::tempdir().unwrap();
    let a = tmp.path().join("a.tql");
    let b = tmp.path().join("b.tql.zst");
    let c = tmp.path().join("c.tql");
    write_lines(&a, &["a1".to_string(), "a2".to_string()]);
    write_zst_lines(&b, &["b1".to_string()]);
    std::fs::write(&c, "c1\r\nc2").unwrap(); // CRLF and no trailing newline

    let mut stream = LineStream::new([&a, &b, &c]);
    let got: Vec<String> = stream.by_ref().map(|r| r.unwrap()).collect();

    assert_eq!(got, vec!["a1", "a2", "b1", "c1", "c2"]);
    assert_eq!(stream.records_read(), 5);
    assert!(stream.bytes_read() > 0);
    assert!(stream.current_path().is_none(), "last file is released at EOF");
}

/// A missing file in the middle yields one `Io` error naming it, after the records of
/// the files before it; later files are never read and the stream stays finished.
#[test]
fn missing_file_fails_once_and_ends_stream() {
    let tmp = tempfile::tempdir().unwrap();
    let a = tmp.path().join("a.tql");
    let missing = tmp.path().join("missing.tql");
    let c = tmp.path().join("c.tql");
    write_lines(&a, &["a1".to_string()]);
    write_lines(&c, &["c1".to_string()]);

    let mut stream = LineStream::new([&a, &missing, &c]);
    assert_eq!(stream.next().unwrap().unwrap(), "a1");
    match stream.next() {
        Some(Err(LoadError::Io { path, .. })) => assert_eq!(path, missing),
        other => panic!("expected Io error, got {:?}", other),
    }
    assert!(stream.next().is_none());
    assert!(stream.next().is_none());
}

/// A corrupt `.zst` surfaces as an `Io` error rather than garbage records.
#[test]
fn corrupt_zstd_is_an_io_error() {
    let tmp = tempfile::tempdir().unwrap();
    let bad = tmp.path().join("bad.tql.zst");
    std::fs::write(&bad, "insert $x isa person;\n").unwrap();

    let results: Vec<_> = LineStream::new([&bad]).collect();
    assert_eq!(results.len(), 1);
    assert!(matches!(results[0], Err(LoadError::Io { .. })));
}

/// Undecodable bytes are replaced, not fatal: the record is still yielded and the
/// stream carries on to the next line and file.
#[test]
fn invalid_utf8_is_replaced_not_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let a = tmp.path().join("a.tql");
    let b = tmp.path().join("b.tql");
    std::fs::write(&a, b"ok\n\xffbad\r\nafter\n").unwrap();
    write_lines(&b, &["b1".to_string()]);

    let got: Vec<String> = LineStream::new([&a, &b]).map(|r| r.unwrap()).collect();
    assert_eq!(got, vec!["ok", "\u{FFFD}bad", "after", "b1"]);
}

/// Blank lines are records by default; `skip_blank_lines` drops them.
#[test]
fn blank_lines_kept_unless_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    let a = tmp.path().join("a.tql");
    std::fs::write(&a, "s1\n\n   \ns2\n").unwrap();

    let kept: Vec<String> = LineStream::new([&a]).map(|r| r.unwrap()).collect();
    assert_eq!(kept, vec!["s1", "", "   ", "s2"]);

    let skipped: Vec<String> = LineStream::new([&a]).skip_blank_lines(true).map(|r| r.unwrap()).collect();
    assert_eq!(skipped, vec!["s1", "s2"]);
}

/// No paths, or only empty files: an empty stream, not an error.
#[test]
fn empty_inputs_yield_nothing() {
    assert!(LineStream::new(Vec::<std::path::PathBuf>::new()).next().is_none());

    let tmp = tempfile::tempdir().unwrap();
    let empty = tmp.path().join("empty.tql");
    std::fs::write(&empty, "").unwrap();
    assert_eq!(LineStream::new([&empty, &empty]).count(), 0);
}

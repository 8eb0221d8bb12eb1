use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tqload::LoadError;

/// Write a plain statement file, one line per entry.
pub fn write_lines(path: &Path, lines: &[String]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut f = File::create(path).unwrap();
    for l in lines {
        writeln!(&mut f, "{}", l).unwrap();
    }
}

/// Write a compressed `.tql.zst` file containing the provided lines.
pub fn write_zst_lines(path: &Path, lines: &[String]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let f = File::create(path).unwrap();
    let mut enc = zstd::stream::write::Encoder::new(f, 3).unwrap();
    for l in lines {
        writeln!(&mut enc, "{}", l).unwrap();
    }
    enc.finish().unwrap();
}

/// Read a text file line-by-line into strings (skips empty lines).
pub fn read_lines(path: &Path) -> Vec<String> {
    let f = File::open(path).unwrap();
    let r = BufReader::new(f);
    r.lines().map(|l| l.unwrap()).filter(|s| !s.is_empty()).collect()
}

/// `n` distinct insert statements tagged with `kind`, e.g. `insert $x isa person, has id "person-3";`.
pub fn statements(kind: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("insert $x isa {kind}, has id \"{kind}-{i}\";")).collect()
}

/// A small dataset:
/// - `schema.tql`: a two-type schema definition.
/// - `person.tql`: 25 plain statements.
/// - `company.tql.zst`: 7 compressed statements.
pub fn make_dataset() -> (TempDir, PathBuf) {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("dataset");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("schema.tql"),
        "define\nperson sub entity, owns id;\ncompany sub entity, owns id;\nid sub attribute, value string;\n",
    )
    .unwrap();
    write_lines(&dir.join("person.tql"), &statements("person", 25));
    write_zst_lines(&dir.join("company.tql.zst"), &statements("company", 7));
    (tmp, dir)
}

/// The `LoadError` anywhere in an anyhow chain, if any.
pub fn find_load_error(err: &anyhow::Error) -> Option<&LoadError> {
    err.chain().find_map(|c| c.downcast_ref::<LoadError>())
}

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use walkdir::WalkDir;

/// A statement file scheduled for loading.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataFile {
    /// File name without `.tql` / `.tql.zst`; keys the report columns.
    pub label: String,
    pub path: PathBuf,
}

impl DataFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self { label: file_label(&path), path }
    }
}

fn statement_file_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?P<label>.+?)\.tql(?:\.zst)?$").unwrap())
}

pub fn file_label(path: &Path) -> String {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    match statement_file_re().captures(&name) {
        Some(caps) => caps["label"].to_string(),
        None => name.strip_suffix(".zst").unwrap_or(&name).to_string(),
    }
}

/// Resolve configured entries to files. An entry may be a path or a bare name looked up
/// under `dataset_dir` as `<name>`, `<name>.tql`, then `<name>.tql.zst`.
///
/// Entries that match nothing are kept as given so that opening them reports the
/// I/O error at load time, in file order.
pub fn resolve_data_files(dataset_dir: Option<&Path>, entries: &[PathBuf]) -> Vec<DataFile> {
    entries
        .iter()
        .map(|entry| {
            let base = match dataset_dir {
                Some(dir) if entry.is_relative() => dir.join(entry),
                _ => entry.clone(),
            };
            let candidates = [
                base.clone(),
                PathBuf::from(format!("{}.tql", base.display())),
                PathBuf::from(format!("{}.tql.zst", base.display())),
            ];
            match candidates.iter().find(|p| p.is_file()) {
                Some(found) => DataFile::new(found.clone()),
                None => {
                    tracing::warn!("no statement file found for {}", base.display());
                    DataFile::new(base)
                }
            }
        })
        .collect()
}

/// All `*.tql` and `*.tql.zst` files directly under `dir`, sorted by name.
pub fn discover_data_files(dir: &Path) -> Vec<DataFile> {
    let mut found = Vec::new();
    if !dir.exists() {
        return found;
    }
    for ent in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name().into_iter().flatten() {
        if !ent.file_type().is_file() {
            continue;
        }
        if let Some(name) = ent.file_name().to_str() {
            if statement_file_re().is_match(name) {
                found.push(DataFile::new(ent.path()));
            }
        }
    }
    found
}

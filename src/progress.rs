//! Progress reporting: byte-based bars over the source files of a run.

use crate::paths::DataFile;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::fs;
use std::sync::{Arc, OnceLock};

/// Optional global MultiProgress that allows multiple bars to render concurrently.
/// If unset, progress bars draw to the default terminal target.
static GLOBAL_MP: OnceLock<Arc<MultiProgress>> = OnceLock::new();

/// Install a global MultiProgress used by all subsequently created progress bars.
/// Safe to call once; additional calls are ignored.
pub fn set_global_multiprogress(mp: Arc<MultiProgress>) {
    let _ = GLOBAL_MP.set(mp);
}

fn new_bar(total: u64) -> ProgressBar {
    match GLOBAL_MP.get() {
        Some(mp) => mp.add(ProgressBar::new(total)),
        None => ProgressBar::new(total),
    }
}

pub fn make_progress_bar_labeled(total_bytes: u64, label: Option<&str>) -> ProgressBar {
    let pb = new_bar(total_bytes);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} {msg} {bytes:>10}/{total_bytes:<10} [{bar:.cyan/blue}] {percent:>3}%  \
         {bytes_per_sec}  elapsed: {elapsed_precise}  eta: {eta_precise}",
    ) {
        pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
    }
    if let Some(msg) = label {
        pb.set_message(msg.to_string());
    }
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// On-disk size of all files; missing files count as zero.
pub fn total_source_bytes(files: &[DataFile]) -> u64 {
    files
        .iter()
        .map(|f| fs::metadata(&f.path).map(|m| m.len()).unwrap_or(0))
        .sum()
}

/// Feeds a bar from a monotonically growing byte counter.
pub(crate) struct ByteTicker {
    pb: Option<ProgressBar>,
    last: u64,
}

impl ByteTicker {
    pub(crate) fn new(pb: Option<ProgressBar>) -> Self {
        Self { pb, last: 0 }
    }

    /// Report the counter's current value. Counters restart at zero per stream, so a
    /// new stream must be announced with `restart`.
    pub(crate) fn update(&mut self, total: u64) {
        if let Some(pb) = &self.pb {
            if total > self.last {
                pb.inc(total - self.last);
                self.last = total;
            }
        }
    }

    pub(crate) fn restart(&mut self) {
        self.last = 0;
    }

    pub(crate) fn finish(&self, msg: &str) {
        if let Some(pb) = &self.pb {
            pb.finish_with_message(msg.to_string());
        }
    }
}

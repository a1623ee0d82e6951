//! Disk I/O and file lifecycle.
//!
//! Downloads land in `<final>.part`, opened in append mode so a rerun resumes
//! from its current length, and are renamed to the final name only once
//! complete and synced.

mod part_file;

pub use part_file::PartFile;

use std::path::{Path, PathBuf};

/// Temporary file suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Path for the temp file: appends `.part` to the final path (e.g. `file.jpg` → `file.jpg.part`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}

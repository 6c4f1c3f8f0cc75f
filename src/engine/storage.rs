//! Virtual paths and directory listings
//!
//! Every session sees its home directory as `/`. Client paths are resolved
//! against the session's virtual working directory and can never climb above
//! that root.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};

/// Resolve `arg` against the virtual `cwd`, collapsing `.` and `..` at the root
pub fn resolve_virtual(cwd: &str, arg: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    let start = if arg.starts_with('/') { "" } else { cwd };

    for segment in start.split('/').chain(arg.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            name => parts.push(name),
        }
    }

    format!("/{}", parts.join("/"))
}

/// Map a normalized virtual path onto the account's home directory
pub fn virtual_to_real(home: &Path, virtual_path: &str) -> PathBuf {
    let relative = virtual_path.trim_start_matches('/');
    if relative.is_empty() {
        home.to_path_buf()
    } else {
        home.join(relative)
    }
}

/// One row of a directory listing
#[derive(Debug, Clone)]
pub struct ListEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: SystemTime,
}

impl ListEntry {
    fn from_metadata(name: String, meta: &std::fs::Metadata) -> Self {
        Self {
            name,
            is_dir: meta.is_dir(),
            size: meta.len(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        }
    }

    /// `ls -l` style line, the format most clients parse
    pub fn to_list_line(&self) -> String {
        let mode = if self.is_dir { "drwxr-xr-x" } else { "-rw-r--r--" };
        let modified: DateTime<Local> = self.modified.into();
        format!(
            "{} 1 ftp ftp {:>12} {} {}",
            mode,
            self.size,
            modified.format("%b %d %H:%M"),
            self.name
        )
    }
}

/// List a directory, or a single entry when `path` names a file
pub async fn list(path: &Path) -> io::Result<Vec<ListEntry>> {
    let meta = tokio::fs::metadata(path).await?;
    if !meta.is_dir() {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        return Ok(vec![ListEntry::from_metadata(name, &meta)]);
    }

    let mut entries = Vec::new();
    let mut dir = tokio::fs::read_dir(path).await?;
    while let Some(entry) = dir.next_entry().await? {
        // Entries removed mid-listing are skipped
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        entries.push(ListEntry::from_metadata(
            entry.file_name().to_string_lossy().into_owned(),
            &meta,
        ));
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

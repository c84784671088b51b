//! Bounded reads of `<command>.schema.json` files from one directory.

use std::fs::{self, File, Metadata};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::config::DirectoryLimits;
use crate::error::{Result, SchemaError};

pub(crate) const SCHEMA_SUFFIX: &str = ".schema.json";

/// One schema file read from disk.
pub(crate) struct SchemaFile {
    pub command: String,
    pub path: PathBuf,
    pub source: String,
}

/// Read every schema file in `dir`, sorted by command name.
///
/// Symlinked schema files are refused. Non-matching names and
/// non-regular files are skipped.
pub(crate) fn read_schema_dir(dir: &Path, limits: &DirectoryLimits) -> Result<Vec<SchemaFile>> {
    let entries = fs::read_dir(dir).map_err(|err| load_failed(dir, err))?;

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| load_failed(dir, err))?;
        let name = entry.file_name();
        let Some(command) = command_from_file_name(&name.to_string_lossy()).map(str::to_string)
        else {
            continue;
        };

        let path = entry.path();
        let metadata = fs::symlink_metadata(&path).map_err(|err| load_failed(&path, err))?;
        if metadata.file_type().is_symlink() {
            return Err(SchemaError::LoadFailed(format!(
                "refusing to follow symlinked schema {}",
                path.display()
            )));
        }
        if !metadata.is_file() {
            continue;
        }

        candidates.push((command, path, metadata));
        if candidates.len() > limits.max_files {
            return Err(SchemaError::LoadFailed(format!(
                "{} holds more than {} schema files",
                dir.display(),
                limits.max_files
            )));
        }
    }
    candidates.sort_by(|a, b| a.0.cmp(&b.0));

    candidates
        .into_iter()
        .map(|(command, path, metadata)| {
            let source = read_bounded(&path, &metadata, limits.max_file_bytes)?;
            Ok(SchemaFile {
                command,
                path,
                source,
            })
        })
        .collect()
}

pub(crate) fn command_from_file_name(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(SCHEMA_SUFFIX)
        .filter(|command| !command.is_empty())
}

fn read_bounded(path: &Path, listed: &Metadata, max_bytes: usize) -> Result<String> {
    let file = File::open(path).map_err(|err| load_failed(path, err))?;
    let opened = file.metadata().map_err(|err| load_failed(path, err))?;
    if !same_file(listed, &opened) {
        return Err(SchemaError::LoadFailed(format!(
            "{} was replaced while loading",
            path.display()
        )));
    }

    let too_large = || {
        SchemaError::LoadFailed(format!(
            "{} exceeds {max_bytes} bytes",
            path.display()
        ))
    };
    if opened.len() > max_bytes as u64 {
        return Err(too_large());
    }

    let mut source = String::new();
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX).saturating_add(1);
    file.take(limit)
        .read_to_string(&mut source)
        .map_err(|err| load_failed(path, err))?;
    if source.len() > max_bytes {
        return Err(too_large());
    }
    Ok(source)
}

#[cfg(unix)]
fn same_file(listed: &Metadata, opened: &Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    listed.dev() == opened.dev() && listed.ino() == opened.ino()
}

#[cfg(not(unix))]
fn same_file(_listed: &Metadata, _opened: &Metadata) -> bool {
    true
}

fn load_failed(path: &Path, err: std::io::Error) -> SchemaError {
    SchemaError::LoadFailed(format!("{}: {err}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_parsing() {
        assert_eq!(command_from_file_name("increment.schema.json"), Some("increment"));
        assert_eq!(command_from_file_name(".schema.json"), None);
        assert_eq!(command_from_file_name("increment.json"), None);
    }
}

//! Object file output.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::CompileError;

/// Lowercase hex SHA-256 of an object.
pub fn object_sha256(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}.tmp", std::process::id()));
    path.with_file_name(name)
}

/// Write `bytes` to `path` through a temporary sibling file and a rename,
/// so `path` holds either the previous contents or the complete object.
pub fn write_object(path: impl AsRef<Path>, bytes: &[u8]) -> Result<(), CompileError> {
    let path = path.as_ref();
    let tmp = temp_path(path);
    let result = fs::File::create(&tmp)
        .and_then(|mut f| {
            f.write_all(bytes)?;
            f.sync_all()
        })
        .and_then(|()| fs::rename(&tmp, path));
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(CompileError::io(path, e));
    }
    debug!(target: "ember::compiler", path = %path.display(), bytes = bytes.len(), "object written");
    Ok(())
}

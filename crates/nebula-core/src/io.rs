use crate::error::Result;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Replace `path` in one rename, staging `data` next to it first. Used for
/// `terraform.tfvars`, the `.eip` sentinel and run log dumps, none of which
/// terraform or a later `nebula` run may ever see half-written.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;
    let mut staged = NamedTempFile::new_in(parent)?;
    staged.write_all(data)?;
    staged.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Create a constellation working directory. Returns `true` when it was
/// newly created, which the orchestrator uses to decide on the settle delay.
pub fn ensure_dir(path: &Path) -> Result<bool> {
    if path.is_dir() {
        return Ok(false);
    }
    std::fs::create_dir_all(path)?;
    Ok(true)
}

/// Seed a marker file such as the `.eip` sentinel. An existing file is left
/// untouched so a re-run keeps the address recorded at first create.
/// Returns whether anything was written.
pub fn write_if_missing(path: &Path, data: &[u8]) -> Result<bool> {
    match path.try_exists()? {
        true => Ok(false),
        false => atomic_write(path, data).map(|()| true),
    }
}

/// Recursively copy the contents of `src` into `dst`, overwriting files
/// that already exist. Returns the number of files copied.
pub fn copy_dir_all(src: &Path, dst: &Path) -> Result<usize> {
    std::fs::create_dir_all(dst)?;
    let mut copied = 0;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copied += copy_dir_all(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

use crate::core::interfaces::FileSystemService;
use crate::core::models::{DirectoryScan, StageKind, TransformFailure};
use crate::utils::{KilnError, Logger, Result};
use std::fs::Permissions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

pub struct TokioFileSystemService;

#[async_trait::async_trait]
impl FileSystemService for TokioFileSystemService {
    async fn scan_directory(&self, path: &Path) -> DirectoryScan {
        let mut scan = DirectoryScan::default();
        let mut pending = vec![path.to_path_buf()];

        while let Some(dir) = pending.pop() {
            if let Err(e) = scan_one(&dir, &mut pending, &mut scan.files).await {
                if dir == path && e.kind() == ErrorKind::NotFound {
                    Logger::debug(&format!("Nothing to scan at {}", dir.display()));
                    continue;
                }
                Logger::warn(&format!("Cannot read directory {}: {}", dir.display(), e));
                scan.unreadable.push(TransformFailure {
                    path: dir,
                    stage: StageKind::Read,
                    message: e.to_string(),
                });
            }
        }

        scan.files.sort();
        scan
    }

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(fs::read(path).await?)
    }

    async fn write_file(&self, path: &Path, content: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            self.create_directory(parent).await?;
        }

        Ok(fs::write(path, content).await?)
    }

    async fn write_file_atomic(&self, path: &Path, content: &[u8]) -> Result<()> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| KilnError::InvalidPath(format!("no file name in {}", path.display())))?;
        let temp_path = path.with_file_name(format!(".{}.tmp", file_name));

        self.write_file(&temp_path, content).await?;

        if let Err(e) = fs::rename(&temp_path, path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(KilnError::Io(e));
        }

        Ok(())
    }

    async fn create_directory(&self, path: &Path) -> Result<()> {
        Ok(fs::create_dir_all(path).await?)
    }

    async fn remove_file(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(KilnError::Io(e)),
        }
    }

    async fn clear_directory(&self, path: &Path) -> Result<usize> {
        let path = path.to_path_buf();

        tokio::task::spawn_blocking(move || clear_directory_blocking(&path))
            .await
            .map_err(|e| KilnError::build(format!("Clean task failed: {}", e)))?
            .map_err(KilnError::Io)
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// List one directory: files are collected, subdirectories queued
async fn scan_one(dir: &Path, pending: &mut Vec<PathBuf>, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    let mut entries = fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let entry_path = entry.path();
        let file_type = entry.file_type().await?;

        if file_type.is_dir() {
            pending.push(entry_path);
        } else if file_type.is_file() {
            files.push(entry_path);
        } else if file_type.is_symlink() {
            // Follow links to files only; linked directories could loop
            if let Ok(meta) = fs::metadata(&entry_path).await {
                if meta.is_file() {
                    files.push(entry_path);
                }
            }
        }
    }

    Ok(())
}

fn clear_directory_blocking(path: &Path) -> std::io::Result<usize> {
    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        force_remove(&entry.path())?;
        removed += 1;
    }

    Ok(removed)
}

/// Remove a file or directory tree. Permission failures are retried once after
/// making the entry and its parent writable.
fn force_remove(path: &Path) -> std::io::Result<()> {
    match remove_entry(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            Logger::debug(&format!("Forcing removal of {}", path.display()));
            if let Some(parent) = path.parent() {
                make_writable(parent)?;
            }
            make_tree_writable(path)?;
            match remove_entry(path) {
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                other => other,
            }
        }
        Err(e) => Err(e),
    }
}

fn remove_entry(path: &Path) -> std::io::Result<()> {
    let meta = std::fs::symlink_metadata(path)?;
    if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

fn make_tree_writable(path: &Path) -> std::io::Result<()> {
    let meta = std::fs::symlink_metadata(path)?;
    if meta.file_type().is_symlink() {
        return Ok(());
    }

    make_writable(path)?;

    if meta.is_dir() {
        for entry in std::fs::read_dir(path)? {
            make_tree_writable(&entry?.path())?;
        }
    }

    Ok(())
}

fn make_writable(path: &Path) -> std::io::Result<()> {
    let perms = std::fs::metadata(path)?.permissions();
    std::fs::set_permissions(path, owner_writable(perms))
}

#[cfg(unix)]
fn owner_writable(mut perms: Permissions) -> Permissions {
    use std::os::unix::fs::PermissionsExt;
    perms.set_mode(perms.mode() | 0o700);
    perms
}

#[cfg(not(unix))]
#[allow(clippy::permissions_set_readonly_false)]
fn owner_writable(mut perms: Permissions) -> Permissions {
    perms.set_readonly(false);
    perms
}

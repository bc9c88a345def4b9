#![forbid(unsafe_code)]

use async_trait::async_trait;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::debug;

const DIRECTORY_MODE: u32 = 0o700;

/// Filesystem operations the quarantine performs on infected files and on
/// its own directory.
#[async_trait]
pub trait FileMover: Send + Sync {
    /// Move a file to its isolation destination.
    async fn move_file(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Restrict `dir` to its owner.
    async fn restrict_dir(&self, dir: &Path) -> io::Result<()>;
}

/// Plain rename, falling back to copy and remove when source and
/// destination sit on different filesystems.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsMover;

#[async_trait]
impl FileMover for FsMover {
    async fn move_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        match tokio::fs::rename(from, to).await {
            Ok(()) => Ok(()),
            Err(err) if err.raw_os_error() == Some(libc::EXDEV) => {
                debug!(?from, ?to, "cross-device move, copying");
                tokio::fs::copy(from, to).await?;
                if let Err(err) = tokio::fs::remove_file(from).await {
                    // Keep exactly one copy around: the original stays put.
                    let _ = tokio::fs::remove_file(to).await;
                    return Err(err);
                }
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn restrict_dir(&self, dir: &Path) -> io::Result<()> {
        tokio::fs::set_permissions(dir, std::fs::Permissions::from_mode(DIRECTORY_MODE)).await
    }
}

/// Whether a failed move is worth retrying: the file is held open, locked,
/// or access was denied.
pub fn is_transient(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::PermissionDenied
        || matches!(err.raw_os_error(), Some(libc::EBUSY | libc::ETXTBSY))
}

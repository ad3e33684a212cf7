//! Unix socket filesystem helpers

use std::io;
use std::path::Path;
use tokio::net::UnixStream;
use tracing::debug;

/// Remove a stale socket file so the path can be bound again.
///
/// Fails if the path exists and is not a socket; a missing path is fine.
pub fn cleanup_socket(path: &Path) -> io::Result<()> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        if !metadata.file_type().is_socket() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("path {} exists but is not a socket", path.display()),
            ));
        }
    }
    #[cfg(not(unix))]
    let _ = metadata;

    std::fs::remove_file(path)?;
    debug!("Removed stale socket file {}", path.display());
    Ok(())
}

/// Restrict who can open a freshly bound socket
#[cfg(unix)]
pub fn set_socket_permissions(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
pub fn set_socket_permissions(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

/// Readiness probe: connect to the socket and hang up
pub async fn operation_check(path: &Path) -> io::Result<()> {
    let stream = UnixStream::connect(path).await?;
    drop(stream);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::net::UnixListener;

    #[tokio::test]
    async fn test_cleanup_missing_path_is_noop() {
        let tmp = TempDir::new().unwrap();
        cleanup_socket(&tmp.path().join("absent.sock")).unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_removes_stale_socket() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("stale.sock");
        let listener = UnixListener::bind(&path).unwrap();
        drop(listener);
        assert!(path.exists());

        cleanup_socket(&path).unwrap();
        assert!(!path.exists());

        // Path is bindable again
        let _listener = UnixListener::bind(&path).unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_refuses_non_socket() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("not-a-socket");
        std::fs::write(&path, b"data").unwrap();

        let err = cleanup_socket(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_operation_check() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("probe.sock");
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        operation_check(&path).await.unwrap();
        assert!(operation_check(&tmp.path().join("absent.sock")).await.is_err());
    }
}

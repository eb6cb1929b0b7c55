//! Persisted session directory.

use std::io;
use std::path::Path;

use log::debug;

/// Create the session directory and its parents.
pub async fn ensure_session_dir(path: &Path) -> io::Result<()> {
    tokio::fs::create_dir_all(path).await
}

/// Recursively delete the session directory. A missing directory is not an error.
pub async fn clear_session(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {
            debug!("removed session directory {}", path.display());
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clear_removes_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        let session = dir.path().join("session");
        ensure_session_dir(&session.join("Default/IndexedDB")).await.unwrap();
        std::fs::write(session.join("Default/IndexedDB/db"), b"x").unwrap();

        clear_session(&session).await.unwrap();
        assert!(!session.exists());
    }

    #[tokio::test]
    async fn test_clear_missing_directory_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        clear_session(&dir.path().join("never-created")).await.unwrap();
    }
}

// ovpn-connect - Secret Materialization
// Writes sensitive material (credentials, keys) to disk with
// owner-only permissions

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};

/// Write secret content to `path` with 0600 permissions.
///
/// The file is write-once from this system's point of view; a failure
/// here is fatal and aborts the bring-up sequence.
pub fn materialize(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).map_err(|source| Error::SecretWrite {
        path: path.to_path_buf(),
        source,
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o600);
        fs::set_permissions(path, perms).map_err(|source| Error::SecretWrite {
            path: path.to_path_buf(),
            source,
        })?;
    }

    debug!("Materialized secret file: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_materialize_writes_exact_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("up.txt");

        materialize(&path, "alice\nsecret").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "alice\nsecret");
    }

    #[cfg(unix)]
    #[test]
    fn test_materialize_sets_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ta.key");

        materialize(&path, "-----BEGIN OpenVPN Static key V1-----").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_materialize_failure_is_secret_write_error() {
        let result = materialize(Path::new("/nonexistent-dir/up.txt"), "x");
        assert!(matches!(result, Err(Error::SecretWrite { .. })));
    }
}

//! SSH key pair provisioning.

use crate::error::{DriverError, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// File name of the private key inside a machine store.
pub const KEY_FILENAME: &str = "id_rsa";

const SSH_KEYGEN: &str = "ssh-keygen";

/// Path of the public half of `private_key`.
pub fn public_key_path(private_key: &Path) -> PathBuf {
    let mut path = private_key.as_os_str().to_owned();
    path.push(".pub");
    PathBuf::from(path)
}

/// Generate an unencrypted 2048-bit RSA key pair at `path` unless both halves
/// already exist. Returns `true` if a key was generated.
pub async fn ensure_ssh_key(path: &Path) -> Result<bool> {
    ensure_ssh_key_with(SSH_KEYGEN, path).await
}

async fn ensure_ssh_key_with(program: &str, path: &Path) -> Result<bool> {
    let public = public_key_path(path);
    if tokio::fs::try_exists(path).await? && tokio::fs::try_exists(&public).await? {
        tracing::debug!(path = %path.display(), "SSH key already present");
        return Ok(false);
    }

    // ssh-keygen prompts before overwriting, so clear out half a pair.
    for stale in [path, public.as_path()] {
        match tokio::fs::remove_file(stale).await {
            Ok(()) => tracing::debug!(path = %stale.display(), "Removed stale key file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    tracing::info!(path = %path.display(), "Generating SSH key");
    let output = Command::new(program)
        .args(["-t", "rsa", "-b", "2048", "-N", "", "-q", "-f"])
        .arg(path)
        .output()
        .await
        .map_err(|e| DriverError::SshKey {
            path: path.to_path_buf(),
            message: format!("failed to run {program}: {e}"),
        })?;

    if !output.status.success() {
        return Err(DriverError::SshKey {
            path: path.to_path_buf(),
            message: format!(
                "{} ({})",
                String::from_utf8_lossy(&output.stderr).trim(),
                output.status
            ),
        });
    }
    Ok(true)
}

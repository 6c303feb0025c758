//! SSH key staging and privilege de-escalation.
//!
//! The client starts as root (it applies updates and writes scheduler
//! drop-ins), then drops to the backup user before talking to the server.
//! The SSH key ships root-only, so a user-readable copy is staged into a
//! temp file first; the copy is an RAII guard removed on every exit path.

use std::io;
use std::path::{Path, PathBuf};

use nix::unistd::{setgid, setgroups, setuid, Gid, Uid, User};
use tempfile::NamedTempFile;

use crate::config::Configuration;
use crate::utils::errors::ClientError;

/// Location of the root-owned SSH key installed with the client.
pub const SSH_KEY_PATH: &str = "/usr/local/share/backup_client/ssh_key";

/// The resolved identity the backup runs as.
#[derive(Debug)]
pub struct BackupUser {
    pub name: String,
    pub uid: Uid,
    pub gid: Gid,
    pub home: PathBuf,
}

/// Resolve the backup user: `BACKUP_USER` environment override first, then
/// the configuration (which the default-merge guarantees is non-empty).
pub fn resolve_backup_user(config: &Configuration) -> Result<BackupUser, ClientError> {
    let name = std::env::var("BACKUP_USER")
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| config.backup_user.clone());
    let unknown = || ClientError::UnknownUser { user: name.clone() };
    let user = User::from_name(&name)
        .map_err(|_| unknown())?
        .ok_or_else(unknown)?;
    Ok(BackupUser {
        uid: user.uid,
        gid: user.gid,
        home: user.dir,
        name,
    })
}

/// A user-readable copy of the SSH key. Deleting happens on drop, whether
/// the run ends in success, error, or a panic unwind.
pub struct StagedKey {
    file: NamedTempFile,
}

impl StagedKey {
    pub fn stage(source: &Path, owner: &BackupUser) -> Result<Self, ClientError> {
        let file = NamedTempFile::new().map_err(ClientError::Credentials)?;
        let contents = std::fs::read(source).map_err(ClientError::Credentials)?;
        std::fs::write(file.path(), contents).map_err(ClientError::Credentials)?;

        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o400))
            .map_err(ClientError::Credentials)?;
        nix::unistd::chown(file.path(), Some(owner.uid), Some(owner.gid))
            .map_err(|errno| ClientError::Credentials(io::Error::other(errno)))?;

        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Irreversibly become the backup user. Order is important: groups first,
/// then gid, then uid; the environment is scrubbed before any of it.
pub fn drop_privileges(user: &BackupUser) -> Result<(), ClientError> {
    let drop_err = |err: &dyn std::fmt::Display| ClientError::PrivilegeDrop(err.to_string());

    let keys: Vec<_> = std::env::vars_os().map(|(key, _)| key).collect();
    for key in keys {
        std::env::remove_var(key);
    }

    setgroups(&[]).map_err(|e| drop_err(&e))?;
    setgid(user.gid).map_err(|e| drop_err(&e))?;
    setuid(user.uid).map_err(|e| drop_err(&e))?;
    nix::sys::stat::umask(nix::sys::stat::Mode::from_bits_truncate(0o022));
    std::env::set_current_dir(&user.home).map_err(|e| drop_err(&e))?;
    Ok(())
}

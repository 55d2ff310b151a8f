// ABOUTME: Idempotent authorized_keys provisioning with legacy-entry pruning.
// ABOUTME: Edits are whole-file read, compute, write temp, rename; never partial.

use crate::account::{Ownership, TargetAccount};
use crate::error::{Result, SshError};
use crate::fingerprint::fingerprint;
use crate::key::KeyLine;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Comment prefix that tags keys written by earlier nomad setup tools.
pub const DEFAULT_PRUNE_PREFIX: &str = "Nomad-";

/// Options for [`provision_key`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionOptions {
    /// Remove legacy entries before adding the key.
    pub prune: bool,
    /// Substring that marks a legacy entry as ours.
    pub prune_prefix: String,
    /// Keep a timestamped copy of the file before changing it.
    pub backup: bool,
}

impl Default for ProvisionOptions {
    fn default() -> Self {
        Self {
            prune: true,
            prune_prefix: DEFAULT_PRUNE_PREFIX.to_string(),
            backup: false,
        }
    }
}

impl ProvisionOptions {
    /// Options used by the migration entry point: prune and back up.
    pub fn migration(prune_prefix: impl Into<String>) -> Self {
        Self {
            prune: true,
            prune_prefix: prune_prefix.into(),
            backup: true,
        }
    }
}

/// What provisioning did to the key file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Added,
    AlreadyPresent,
    PrunedAdded,
    PrunedAlreadyPresent,
}

impl ProvisionOutcome {
    fn new(pruned: bool, added: bool) -> Self {
        match (pruned, added) {
            (false, true) => Self::Added,
            (false, false) => Self::AlreadyPresent,
            (true, true) => Self::PrunedAdded,
            (true, false) => Self::PrunedAlreadyPresent,
        }
    }

    pub fn added(&self) -> bool {
        matches!(self, Self::Added | Self::PrunedAdded)
    }

    pub fn pruned(&self) -> bool {
        matches!(self, Self::PrunedAdded | Self::PrunedAlreadyPresent)
    }
}

impl fmt::Display for ProvisionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Added => "added",
            Self::AlreadyPresent => "already present",
            Self::PrunedAdded => "pruned legacy keys, added",
            Self::PrunedAlreadyPresent => "pruned legacy keys, already present",
        };
        f.write_str(text)
    }
}

/// Result of [`provision_key`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    pub outcome: ProvisionOutcome,
    /// The authorized_keys file that was examined.
    pub path: PathBuf,
    /// Number of legacy lines removed.
    pub pruned: usize,
    /// Backup of the pre-edit file, if one was written.
    pub backup: Option<PathBuf>,
}

/// Result of [`prune_keys`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneReport {
    pub path: PathBuf,
    pub removed: usize,
    pub backup: Option<PathBuf>,
}

/// Ensure `key_line` is authorized for `target`.
///
/// Creates `~/.ssh` (0700) and `authorized_keys` (0600) when missing. When
/// `options.prune` is set, legacy `ecdsa-sha2-nistp256` lines containing the
/// prune prefix are removed first, even if the key is already present. The
/// key itself is never pruned. Trailing whitespace is ignored when matching
/// the key against stored lines. The file is only rewritten when its content
/// changes.
///
/// # Errors
/// `SshError::Permission` when the filesystem refuses a create, write or
/// ownership change; `SshError::InvalidKeyLine` for empty or multi-line keys.
pub fn provision_key(
    target: &TargetAccount,
    key_line: &str,
    options: &ProvisionOptions,
) -> Result<ProvisionReport> {
    let key_line = key_line.trim_end();
    if key_line.trim().is_empty() {
        return Err(SshError::InvalidKeyLine("key line is empty".to_string()));
    }
    if key_line.contains(['\n', '\r']) {
        return Err(SshError::InvalidKeyLine(
            "key line spans several lines".to_string(),
        ));
    }

    let prefix = if options.prune {
        Some(checked_prefix(&options.prune_prefix)?)
    } else {
        None
    };

    let file = KeyFile::open(target)?;
    let edit = plan_edit(&file.content, Some(key_line), prefix);
    let backup = file.apply(&edit, options.backup)?;

    let outcome = ProvisionOutcome::new(edit.removed > 0, edit.added);
    match fingerprint(key_line) {
        Some(fp) => tracing::info!(
            account = %target.name,
            fingerprint = %fp,
            pruned = edit.removed,
            %outcome,
            "provisioned authorized key"
        ),
        None => tracing::info!(
            account = %target.name,
            pruned = edit.removed,
            %outcome,
            "provisioned authorized key"
        ),
    }

    Ok(ProvisionReport {
        outcome,
        path: file.path,
        pruned: edit.removed,
        backup,
    })
}

/// Remove legacy entries without adding a key.
///
/// Used by the migration entry point when no new key was supplied.
pub fn prune_keys(target: &TargetAccount, prefix: &str, backup: bool) -> Result<PruneReport> {
    let prefix = checked_prefix(prefix)?;
    let file = KeyFile::open(target)?;
    let edit = plan_edit(&file.content, None, Some(prefix));
    let backup = file.apply(&edit, backup)?;

    tracing::info!(
        account = %target.name,
        removed = edit.removed,
        prefix,
        "pruned legacy authorized keys"
    );

    Ok(PruneReport {
        path: file.path,
        removed: edit.removed,
        backup,
    })
}

fn checked_prefix(prefix: &str) -> Result<&str> {
    if prefix.is_empty() {
        Err(SshError::EmptyPrunePrefix)
    } else {
        Ok(prefix)
    }
}

/// New file content and what changed to produce it.
#[derive(Debug, PartialEq, Eq)]
struct Edit {
    content: String,
    removed: usize,
    added: bool,
}

impl Edit {
    fn changed(&self) -> bool {
        self.removed > 0 || self.added
    }
}

/// Compute the post-edit content of an authorized_keys file.
fn plan_edit(content: &str, key_line: Option<&str>, prune_prefix: Option<&str>) -> Edit {
    let mut removed = 0;
    let mut content = match prune_prefix {
        Some(prefix) => {
            let mut kept = String::with_capacity(content.len());
            // Survivors keep their original line terminators.
            for raw in content.split_inclusive('\n') {
                let line = raw.trim_end();
                let is_key = key_line.is_some_and(|k| line == k);
                if !is_key && KeyLine::new(line).is_legacy(prefix) {
                    removed += 1;
                } else {
                    kept.push_str(raw);
                }
            }
            if removed > 0 {
                kept
            } else {
                content.to_string()
            }
        }
        None => content.to_string(),
    };

    let added = match key_line {
        Some(key) if !content.lines().any(|line| line.trim_end() == key) => {
            if !content.is_empty() && !content.ends_with('\n') {
                content.push('\n');
            }
            content.push_str(key);
            content.push('\n');
            true
        }
        _ => false,
    };

    Edit {
        content,
        removed,
        added,
    }
}

/// An authorized_keys file loaded for editing.
struct KeyFile {
    path: PathBuf,
    dir: PathBuf,
    content: String,
    existed: bool,
    owner: Option<Ownership>,
}

impl KeyFile {
    /// Create directory and file if absent, then read the whole file.
    fn open(target: &TargetAccount) -> Result<Self> {
        let dir = target.ssh_dir();
        let path = target.authorized_keys_path();

        if !dir.exists() {
            std::fs::create_dir_all(&dir)
                .map_err(|e| SshError::io("create directory", &dir, e))?;
            set_mode(&dir, 0o700)?;
            apply_owner(&dir, target.owner)?;
            tracing::debug!(dir = %dir.display(), "created ssh directory");
        }

        let existed = path.exists();
        if !existed {
            create_private_file(&path)?;
            apply_owner(&path, target.owner)?;
            tracing::debug!(path = %path.display(), "created authorized_keys");
        }

        let content =
            std::fs::read_to_string(&path).map_err(|e| SshError::io("read", &path, e))?;

        Ok(Self {
            path,
            dir,
            content,
            existed,
            owner: target.owner,
        })
    }

    /// Write the edit if it changes anything. Returns the backup path.
    fn apply(&self, edit: &Edit, backup: bool) -> Result<Option<PathBuf>> {
        if !edit.changed() {
            return Ok(None);
        }

        let backup_path = if backup && self.existed {
            Some(self.write_backup()?)
        } else {
            None
        };

        self.replace(&edit.content)?;
        Ok(backup_path)
    }

    fn write_backup(&self) -> Result<PathBuf> {
        let stamp = chrono::Local::now().format("%Y%m%d%H%M%S");
        let mut backup = self.dir.join(format!("authorized_keys.bak.{stamp}"));
        let mut n = 1;
        while backup.exists() {
            backup = self.dir.join(format!("authorized_keys.bak.{stamp}.{n}"));
            n += 1;
        }

        create_private_file(&backup)?;
        std::fs::write(&backup, &self.content).map_err(|e| SshError::io("write", &backup, e))?;
        apply_owner(&backup, self.owner)?;
        tracing::info!(backup = %backup.display(), "backed up authorized_keys");
        Ok(backup)
    }

    /// Write `content` to a sibling temp file and rename it over the original.
    fn replace(&self, content: &str) -> Result<()> {
        let mut tmp = tempfile::Builder::new()
            .prefix(".authorized_keys.")
            .tempfile_in(&self.dir)
            .map_err(|e| SshError::io("create temporary file in", &self.dir, e))?;

        tmp.write_all(content.as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| SshError::io("write", tmp.path().to_path_buf(), e))?;
        set_mode(tmp.path(), 0o600)?;
        apply_owner(tmp.path(), self.owner)?;

        tmp.persist(&self.path)
            .map_err(|e| SshError::io("replace", &self.path, e.error))?;
        Ok(())
    }
}

fn create_private_file(path: &Path) -> Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
        .open(path)
        .map(drop)
        .map_err(|e| SshError::io("create", path, e))
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .map_err(|e| SshError::io("set permissions on", path, e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn apply_owner(path: &Path, owner: Option<Ownership>) -> Result<()> {
    match owner {
        Some(owner) => std::os::unix::fs::chown(path, Some(owner.uid), Some(owner.gid))
            .map_err(|e| SshError::io("change owner of", path, e)),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn apply_owner(_path: &Path, _owner: Option<Ownership>) -> Result<()> {
    Ok(())
}

// ABOUTME: Target account resolution for key provisioning.
// ABOUTME: Finds the home directory and ownership of the account that receives the key.

use crate::error::{Result, SshError};
use std::path::{Path, PathBuf};

/// Numeric owner to restore on files created on behalf of another account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ownership {
    pub uid: u32,
    pub gid: u32,
}

/// The account whose authorized_keys file is being provisioned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetAccount {
    /// Login name.
    pub name: String,
    /// Home directory.
    pub home: PathBuf,
    /// Set when acting on behalf of another account (e.g. under sudo).
    pub owner: Option<Ownership>,
}

impl TargetAccount {
    /// An account the current process already runs as; no ownership changes.
    pub fn local(name: impl Into<String>, home: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            home: home.into(),
            owner: None,
        }
    }

    /// `~/.ssh` of the account.
    pub fn ssh_dir(&self) -> PathBuf {
        self.home.join(".ssh")
    }

    /// `~/.ssh/authorized_keys` of the account.
    pub fn authorized_keys_path(&self) -> PathBuf {
        self.ssh_dir().join("authorized_keys")
    }
}

/// Process context used to resolve accounts.
///
/// Captured once at startup so resolution is a pure function of this value.
#[derive(Debug, Clone)]
pub struct AccountEnv {
    /// Account the process runs as (`USER` / `USERNAME`).
    pub invoking_user: Option<String>,
    /// Account that invoked sudo, if any (`SUDO_USER`).
    pub sudo_user: Option<String>,
    /// Home directory of the invoking account.
    pub home: Option<PathBuf>,
    /// Location of the passwd database.
    pub passwd_path: PathBuf,
    /// Directories that conventionally hold per-account homes.
    pub home_roots: Vec<PathBuf>,
}

impl AccountEnv {
    /// Capture the current process environment.
    pub fn from_process() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        Self {
            invoking_user: var("USER").or_else(|| var("USERNAME")),
            sudo_user: var("SUDO_USER").filter(|u| u != "root"),
            home: dirs::home_dir(),
            passwd_path: PathBuf::from("/etc/passwd"),
            home_roots: default_home_roots(),
        }
    }

    /// Account to provision when none is named explicitly.
    pub fn default_account(&self) -> Option<&str> {
        self.sudo_user
            .as_deref()
            .or(self.invoking_user.as_deref())
    }

    /// Whether the process acts on behalf of another account.
    pub fn is_delegated(&self, account: &str) -> bool {
        self.invoking_user.as_deref() != Some(account)
    }
}

fn default_home_roots() -> Vec<PathBuf> {
    if cfg!(target_os = "macos") {
        vec![PathBuf::from("/Users")]
    } else if cfg!(windows) {
        vec![PathBuf::from(r"C:\Users")]
    } else {
        vec![PathBuf::from("/home")]
    }
}

/// Resolve the account to provision.
///
/// Uses `explicit` if given, else `SUDO_USER`, else the invoking account.
/// The invoking account resolves to the process home directory. Any other
/// account is looked up in the passwd database, then under the platform
/// home roots, and carries ownership so created files can be handed over.
///
/// # Errors
/// Returns `SshError::NoAccount` if no name is available and
/// `SshError::Resolution` if the home directory cannot be found.
pub fn resolve_account(explicit: Option<&str>, env: &AccountEnv) -> Result<TargetAccount> {
    let name = explicit
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .or_else(|| env.default_account())
        .ok_or(SshError::NoAccount)?
        .to_string();

    if !env.is_delegated(&name) {
        let home = env.home.clone().ok_or_else(|| SshError::Resolution {
            account: name.clone(),
            reason: "home directory of the current account is unknown".to_string(),
        })?;
        tracing::debug!(account = %name, home = %home.display(), "resolved invoking account");
        return Ok(TargetAccount::local(name, home));
    }

    if let Some(entry) = lookup_passwd(&env.passwd_path, &name) {
        tracing::debug!(
            account = %name,
            home = %entry.home.display(),
            "resolved account from passwd"
        );
        return Ok(TargetAccount {
            name,
            home: entry.home,
            owner: Some(Ownership {
                uid: entry.uid,
                gid: entry.gid,
            }),
        });
    }

    for root in &env.home_roots {
        let home = root.join(&name);
        if home.is_dir() {
            tracing::debug!(
                account = %name,
                home = %home.display(),
                "resolved account from home root"
            );
            let owner = owner_of(&home);
            return Ok(TargetAccount { name, home, owner });
        }
    }

    Err(SshError::Resolution {
        account: name,
        reason: "no passwd entry and no home directory under the known home roots".to_string(),
    })
}

#[derive(Debug, PartialEq, Eq)]
struct PasswdEntry {
    uid: u32,
    gid: u32,
    home: PathBuf,
}

fn lookup_passwd(path: &Path, name: &str) -> Option<PasswdEntry> {
    let content = std::fs::read_to_string(path).ok()?;
    parse_passwd(&content, name)
}

/// Find `name` in passwd-format text (`name:pw:uid:gid:gecos:home:shell`).
fn parse_passwd(content: &str, name: &str) -> Option<PasswdEntry> {
    content
        .lines()
        .filter(|line| !line.starts_with('#'))
        .find_map(|line| {
            let fields: Vec<&str> = line.split(':').collect();
            if fields.len() < 7 || fields[0] != name || fields[5].is_empty() {
                return None;
            }
            Some(PasswdEntry {
                uid: fields[2].parse().ok()?,
                gid: fields[3].parse().ok()?,
                home: PathBuf::from(fields[5]),
            })
        })
}

#[cfg(unix)]
fn owner_of(path: &Path) -> Option<Ownership> {
    use std::os::unix::fs::MetadataExt;

    let meta = std::fs::metadata(path).ok()?;
    Some(Ownership {
        uid: meta.uid(),
        gid: meta.gid(),
    })
}

#[cfg(not(unix))]
fn owner_of(_path: &Path) -> Option<Ownership> {
    None
}

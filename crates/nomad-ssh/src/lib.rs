// ABOUTME: Public-key decoding and authorized_keys provisioning for nomad host setup.
// ABOUTME: Re-exports account resolution, the key decoder and the provisioner.

pub mod account;
pub mod authorized_keys;
pub mod error;
pub mod fingerprint;
pub mod key;

pub use account::{resolve_account, AccountEnv, Ownership, TargetAccount};
pub use authorized_keys::{
    provision_key, prune_keys, ProvisionOptions, ProvisionOutcome, ProvisionReport, PruneReport,
    DEFAULT_PRUNE_PREFIX,
};
pub use error::{Result, SshError};
pub use fingerprint::fingerprint;
pub use key::{decode_key, KeyLine, DEPRECATED_ALGORITHM};

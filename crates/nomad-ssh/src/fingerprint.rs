// ABOUTME: SHA256 fingerprints for authorized_keys lines.
// ABOUTME: Used for log output so full key material never reaches the logs.

use ssh_key::{HashAlg, PublicKey};

/// Compute the OpenSSH-style SHA256 fingerprint (`SHA256:...`) of a key line.
///
/// Returns `None` when the line does not parse as an OpenSSH public key.
/// Provisioning never depends on this; it only feeds log fields.
pub fn fingerprint(key_line: &str) -> Option<String> {
    let key = PublicKey::from_openssh(key_line.trim()).ok()?;
    Some(key.fingerprint(HashAlg::Sha256).to_string())
}

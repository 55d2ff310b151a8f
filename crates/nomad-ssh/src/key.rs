// ABOUTME: Public-key line decoding and inspection.
// ABOUTME: Turns the base64 NOMAD_PUBKEY_B64 blob into an authorized_keys line.

use base64::Engine;

/// Algorithm identifier of the legacy keys removed during migration.
pub const DEPRECATED_ALGORITHM: &str = "ecdsa-sha2-nistp256";

/// Decode a base64-encoded public-key line.
///
/// Surrounding whitespace and line breaks from wrapped base64 are ignored.
/// The decoded text must be UTF-8; trailing `\r`/`\n` are stripped.
///
/// Returns `None` for invalid base64, invalid UTF-8, or an empty result.
/// Callers treat `None` exactly like "no key supplied".
pub fn decode_key(blob: &str) -> Option<String> {
    let compact: String = blob.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return None;
    }

    let bytes = match base64::engine::general_purpose::STANDARD.decode(compact.as_bytes()) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(error = %e, "public key blob is not valid base64");
            return None;
        }
    };

    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!(error = %e, "decoded public key is not UTF-8");
            return None;
        }
    };

    let line = text.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }
    Some(line.to_string())
}

/// Borrowed view over one authorized_keys line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyLine<'a> {
    raw: &'a str,
}

impl<'a> KeyLine<'a> {
    pub fn new(raw: &'a str) -> Self {
        Self { raw }
    }

    /// The full line as stored.
    pub fn as_str(&self) -> &'a str {
        self.raw
    }

    /// First whitespace-delimited token, e.g. `ssh-ed25519`.
    pub fn algorithm(&self) -> Option<&'a str> {
        self.raw.split_whitespace().next()
    }

    /// Everything after the key material, if present.
    pub fn comment(&self) -> Option<&'a str> {
        let mut parts = self.raw.trim_start().splitn(3, char::is_whitespace);
        parts.next()?;
        parts.next()?;
        parts.next().map(str::trim).filter(|c| !c.is_empty())
    }

    /// Legacy entry written by older setup tools: deprecated algorithm and a
    /// tagging prefix somewhere in the line.
    pub fn is_legacy(&self, prefix: &str) -> bool {
        self.algorithm() == Some(DEPRECATED_ALGORITHM) && self.raw.contains(prefix)
    }
}

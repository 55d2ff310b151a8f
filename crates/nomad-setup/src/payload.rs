// ABOUTME: Builds the nomad://connect quick-setup URI consumed by the mobile app.
// ABOUTME: Every query value is percent-encoded on its own; mosh is always true.

use crate::error::{PayloadError, Result};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Scheme and path of the quick-setup URI.
pub const PAYLOAD_PREFIX: &str = "nomad://connect";

/// Default SSH port.
pub const DEFAULT_PORT: u16 = 22;

/// Everything except RFC 3986 unreserved characters is escaped. Space becomes
/// `%20`; `+`, `&`, `=` and `#` are always escaped.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// A pending connection request, validated on construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRequest {
    host: String,
    user: String,
    port: u16,
    token: String,
}

impl ConnectionRequest {
    /// Validate and build a request.
    ///
    /// `host` and `user` are trimmed and must be non-empty; `port` must be
    /// non-zero; `token` must be present and is kept verbatim.
    ///
    /// # Errors
    /// Returns `PayloadError::InvalidArgument` naming the offending field.
    pub fn new(host: &str, user: &str, port: u16, token: &str) -> Result<Self> {
        let host = required("host", host)?;
        let user = required("user", user)?;
        if token.trim().is_empty() {
            return Err(PayloadError::InvalidArgument(
                "setup token must not be empty".to_string(),
            ));
        }
        if port == 0 {
            return Err(PayloadError::InvalidArgument(
                "port must be between 1 and 65535".to_string(),
            ));
        }

        Ok(Self {
            host,
            user,
            port,
            token: token.to_string(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Render the `nomad://connect?...` URI.
    pub fn to_uri(&self) -> String {
        let port = self.port.to_string();
        let fields = [
            ("host", self.host.as_str()),
            ("port", port.as_str()),
            ("user", self.user.as_str()),
            ("mosh", "true"),
            ("setup_token", self.token.as_str()),
        ];

        let query = fields
            .iter()
            .map(|(name, value)| format!("{name}={}", encode(value)))
            .collect::<Vec<_>>()
            .join("&");

        format!("{PAYLOAD_PREFIX}?{query}")
    }
}

/// Build the quick-setup URI for `host`, `user`, `port` and `token`.
///
/// # Errors
/// Returns `PayloadError::InvalidArgument` if `host`, `user` or `token` is
/// empty after trimming, or `port` is zero.
pub fn build_payload(host: &str, user: &str, port: u16, token: &str) -> Result<String> {
    ConnectionRequest::new(host, user, port, token).map(|req| req.to_uri())
}

/// Percent-encode one query value.
pub fn encode(value: &str) -> String {
    utf8_percent_encode(value, QUERY_VALUE).to_string()
}

fn required(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(PayloadError::InvalidArgument(format!(
            "{field} must not be empty"
        )));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn query_of(uri: &str) -> HashMap<String, String> {
        let parsed = url::Url::parse(uri).expect("payload should be a valid URL");
        assert_eq!(parsed.scheme(), "nomad");
        assert_eq!(parsed.host_str(), Some("connect"));
        parsed.query_pairs().into_owned().collect()
    }

    #[test]
    fn test_known_payload() {
        let uri = build_payload(
            "192.168.1.42",
            "pi",
            22,
            "123e4567-e89b-12d3-a456-426614174000",
        )
        .expect("should build");

        assert_eq!(
            uri,
            "nomad://connect?host=192.168.1.42&port=22&user=pi&mosh=true\
             &setup_token=123e4567-e89b-12d3-a456-426614174000"
        );
    }

    #[test]
    fn test_round_trip_with_reserved_and_unicode() {
        let host = "host name&x=1#frag";
        let user = "jürgen+ops=1 &";
        let token = "tok en/?#&=+";

        let uri = build_payload(host, user, 2222, token).expect("should build");
        let query = query_of(&uri);

        assert_eq!(query.len(), 5, "exactly five fields");
        assert_eq!(query["host"], host);
        assert_eq!(query["user"], user);
        assert_eq!(query["port"], "2222");
        assert_eq!(query["mosh"], "true");
        assert_eq!(query["setup_token"], token);
    }

    #[test]
    fn test_space_is_percent_twenty() {
        assert_eq!(encode("a b"), "a%20b");
        assert_eq!(encode("a+b"), "a%2Bb");
        assert_eq!(encode("~_.-"), "~_.-");
        assert_eq!(encode("é"), "%C3%A9");
    }

    #[test]
    fn test_no_unescaped_delimiters_in_values() {
        let uri = build_payload("a&b", "c=d", 22, "e f#g").expect("should build");
        let query = uri.split_once('?').map(|(_, q)| q).expect("has query");

        assert_eq!(query.matches('&').count(), 4, "only field separators");
        assert_eq!(query.matches('=').count(), 5, "only name/value separators");
        assert!(!query.contains(' '));
        assert!(!query.contains('#'));
    }

    #[test]
    fn test_ipv6_host_round_trips() {
        let uri = build_payload("fe80::1%eth0", "pi", 22, "t").expect("should build");
        assert!(uri.contains("host=fe80%3A%3A1%25eth0"));
        assert_eq!(query_of(&uri)["host"], "fe80::1%eth0");
    }

    #[test]
    fn test_fields_are_trimmed() {
        let uri = build_payload("  10.0.0.5\n", " pi ", 22, "t").expect("should build");
        assert_eq!(
            uri,
            "nomad://connect?host=10.0.0.5&port=22&user=pi&mosh=true&setup_token=t"
        );
    }

    #[test]
    fn test_token_is_kept_verbatim() {
        let req = ConnectionRequest::new("h", "u", 22, " tok ").expect("should build");
        assert_eq!(req.token(), " tok ");
        assert!(req.to_uri().ends_with("&setup_token=%20tok%20"));
        assert!(build_payload("h", "u", 22, "  ").is_err());
    }

    #[test]
    fn test_mosh_is_always_true() {
        let req = ConnectionRequest::new("h", "u", 60001, "t").expect("should build");
        assert!(req.to_uri().contains("&mosh=true&"));
    }

    #[test]
    fn test_empty_host_is_invalid() {
        assert!(matches!(
            build_payload("", "alice", 22, "t"),
            Err(PayloadError::InvalidArgument(msg)) if msg.contains("host")
        ));
        assert!(matches!(
            build_payload("   ", "alice", 22, "t"),
            Err(PayloadError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_empty_user_is_invalid() {
        assert!(matches!(
            build_payload("h", "", 22, "t"),
            Err(PayloadError::InvalidArgument(msg)) if msg.contains("user")
        ));
    }

    #[test]
    fn test_missing_token_and_zero_port_are_invalid() {
        assert!(build_payload("h", "u", 22, "").is_err());
        assert!(build_payload("h", "u", 0, "t").is_err());
    }
}

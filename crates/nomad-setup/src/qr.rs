// ABOUTME: QR rendering of the quick-setup payload.
// ABOUTME: Uses a local qrencode binary when present, else a remote image endpoint.

use crate::payload::encode;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// File name of the rendered QR image.
pub const QR_IMAGE_NAME: &str = "nomad-quick-setup.png";

#[derive(Error, Debug)]
pub enum QrError {
    #[error("failed to create {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("qrencode failed: {0}")]
    Encoder(String),
}

/// Where a rendered QR image can be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrImage {
    /// PNG written locally.
    File(PathBuf),
    /// Image served by a remote endpoint; fetched by whoever displays it.
    Remote(String),
}

impl QrImage {
    /// Value for an HTML `img src` attribute.
    pub fn src(&self) -> String {
        match self {
            QrImage::File(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.to_string_lossy().into_owned()),
            QrImage::Remote(url) => url.clone(),
        }
    }
}

/// Turns a payload into a QR image and, if possible, terminal art.
pub trait QrRenderer {
    fn name(&self) -> &'static str;

    /// Produce an image for the payload, writing files under `out_dir`.
    fn render_image(&self, payload: &str, out_dir: &Path) -> Result<QrImage, QrError>;

    /// Render the code as text for the terminal, if this renderer can.
    fn render_terminal(&self, payload: &str) -> Option<String>;
}

/// The `qrencode` command-line encoder.
#[derive(Debug, Clone)]
pub struct LocalEncoder {
    pub binary: PathBuf,
}

impl LocalEncoder {
    pub fn detect() -> Option<Self> {
        which::which("qrencode").ok().map(|binary| Self { binary })
    }

    fn run(&self, args: &[&str], payload: &str) -> Result<Vec<u8>, QrError> {
        let output = Command::new(&self.binary)
            .args(args)
            .arg("--")
            .arg(payload)
            .output()
            .map_err(|e| QrError::Encoder(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(QrError::Encoder(if stderr.is_empty() {
                output.status.to_string()
            } else {
                stderr
            }));
        }
        Ok(output.stdout)
    }
}

impl QrRenderer for LocalEncoder {
    fn name(&self) -> &'static str {
        "qrencode"
    }

    fn render_image(&self, payload: &str, out_dir: &Path) -> Result<QrImage, QrError> {
        std::fs::create_dir_all(out_dir).map_err(|e| QrError::Io {
            path: out_dir.to_path_buf(),
            source: e,
        })?;
        let path = out_dir.join(QR_IMAGE_NAME);
        let target = path.to_string_lossy();
        self.run(&["-t", "PNG", "-s", "8", "-m", "2", "-o", &*target], payload)?;
        Ok(QrImage::File(path))
    }

    fn render_terminal(&self, payload: &str) -> Option<String> {
        match self.run(&["-t", "ANSIUTF8", "-m", "2"], payload) {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) => {
                tracing::warn!(error = %e, "terminal QR rendering failed");
                None
            }
        }
    }
}

/// A public HTTP endpoint that returns a QR PNG for `data`.
#[derive(Debug, Clone)]
pub struct RemoteEndpoint {
    pub base_url: String,
    pub size: u32,
}

impl RemoteEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            size: 300,
        }
    }

    /// Image URL with the percent-encoded payload as the `data` parameter.
    pub fn image_url(&self, payload: &str) -> String {
        let separator = if self.base_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{separator}size={size}x{size}&data={}",
            self.base_url,
            encode(payload),
            size = self.size,
        )
    }
}

impl QrRenderer for RemoteEndpoint {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn render_image(&self, payload: &str, _out_dir: &Path) -> Result<QrImage, QrError> {
        Ok(QrImage::Remote(self.image_url(payload)))
    }

    fn render_terminal(&self, _payload: &str) -> Option<String> {
        None
    }
}

/// Prefer the local encoder; fall back to the remote endpoint.
pub fn select_renderer(remote_endpoint: &str) -> Box<dyn QrRenderer> {
    match LocalEncoder::detect() {
        Some(local) => {
            tracing::debug!(binary = %local.binary.display(), "using local QR encoder");
            Box::new(local)
        }
        None => {
            tracing::info!(
                endpoint = remote_endpoint,
                "qrencode not found, using remote QR endpoint"
            );
            Box::new(RemoteEndpoint::new(remote_endpoint))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = "nomad://connect?host=192.168.1.42&port=22&user=pi&mosh=true&setup_token=t";

    #[test]
    fn test_remote_image_url_encodes_whole_payload() {
        let remote = RemoteEndpoint::new("https://api.qrserver.com/v1/create-qr-code/");
        let url = remote.image_url(PAYLOAD);

        assert!(url.starts_with("https://api.qrserver.com/v1/create-qr-code/?size=300x300&data="));
        let data = url.split_once("&data=").map(|(_, d)| d).unwrap();
        assert!(!data.contains('&'), "payload separators must be escaped");
        assert!(!data.contains('='), "payload separators must be escaped");
        assert!(data.starts_with("nomad%3A%2F%2Fconnect%3Fhost%3D192.168.1.42%26"));
    }

    #[test]
    fn test_remote_image_url_round_trips() {
        let remote = RemoteEndpoint::new("https://qr.example.com/render?format=png");
        let url = url::Url::parse(&remote.image_url(PAYLOAD)).expect("should parse");
        let data = url
            .query_pairs()
            .find(|(k, _)| k == "data")
            .map(|(_, v)| v.into_owned());
        assert_eq!(data.as_deref(), Some(PAYLOAD));
        assert!(url.query_pairs().any(|(k, v)| k == "format" && v == "png"));
    }

    #[test]
    fn test_remote_renderer_has_no_terminal_output() {
        let remote = RemoteEndpoint::new("https://qr.example.com/");
        assert!(remote.render_terminal(PAYLOAD).is_none());
        let image = remote
            .render_image(PAYLOAD, Path::new("/nonexistent"))
            .expect("remote never touches disk");
        assert!(matches!(image, QrImage::Remote(_)));
    }

    #[test]
    fn test_image_src() {
        let file = QrImage::File(PathBuf::from("/tmp/out/nomad-quick-setup.png"));
        assert_eq!(file.src(), "nomad-quick-setup.png");

        let remote = QrImage::Remote("https://x/?data=1".to_string());
        assert_eq!(remote.src(), "https://x/?data=1");
    }

    #[test]
    fn test_missing_encoder_binary_fails_softly() {
        let local = LocalEncoder {
            binary: PathBuf::from("/nonexistent/qrencode"),
        };
        assert!(local.render_terminal(PAYLOAD).is_none());
        let dir = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            local.render_image(PAYLOAD, dir.path()),
            Err(QrError::Encoder(_))
        ));
    }
}

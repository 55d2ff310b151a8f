// ABOUTME: Presents the quick-setup payload to the user.
// ABOUTME: Colored terminal summary, a standalone HTML page, and browser launching.

use crate::payload::ConnectionRequest;
use crate::qr::QrImage;
use colored::Colorize;
use std::path::{Path, PathBuf};

/// File name of the generated HTML page.
pub const PAGE_NAME: &str = "nomad-quick-setup.html";

/// Print the connection details, the payload and the terminal QR code.
pub fn print_summary(request: &ConnectionRequest, payload: &str, terminal_qr: Option<&str>) {
    println!();
    println!("{}", "Nomad Quick Setup".bold());
    println!();
    println!("  Host:  {}", request.host().cyan());
    println!("  User:  {}", request.user().cyan());
    println!("  Port:  {}", request.port().to_string().cyan());
    println!();

    if let Some(qr) = terminal_qr {
        println!("{qr}");
    }

    println!("{}", "━".repeat(50).dimmed());
    println!("  Scan the QR code with the Nomad app, or paste this link:");
    println!();
    println!("  {}", payload.green());
    println!("{}", "━".repeat(50).dimmed());
    println!();
}

/// Standalone HTML page showing the QR image and the payload.
pub fn render_page(request: &ConnectionRequest, payload: &str, image: &QrImage) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Nomad Quick Setup</title>
<style>
body {{ font-family: -apple-system, "Segoe UI", sans-serif; text-align: center; margin: 3em; }}
img {{ width: 300px; height: 300px; image-rendering: pixelated; }}
code {{ word-break: break-all; }}
</style>
</head>
<body>
<h1>Nomad Quick Setup</h1>
<p>Scan this code with the Nomad app to connect to <strong>{user}@{host}:{port}</strong>.</p>
<img src="{src}" alt="Quick setup QR code">
<p><code>{payload}</code></p>
</body>
</html>
"#,
        user = escape_html(request.user()),
        host = escape_html(request.host()),
        port = request.port(),
        src = escape_html(&image.src()),
        payload = escape_html(payload),
    )
}

/// Write the page into `out_dir`, creating it if needed.
pub fn write_page(out_dir: &Path, html: &str) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(out_dir)?;
    let path = out_dir.join(PAGE_NAME);
    std::fs::write(&path, html)?;
    Ok(path)
}

/// Open `path` with the desktop's default handler. Failures are only logged.
pub fn open_in_browser(path: &Path) -> bool {
    match open::that(path) {
        Ok(()) => {
            tracing::info!(page = %path.display(), "opened quick setup page");
            true
        }
        Err(e) => {
            tracing::warn!(page = %path.display(), error = %e, "could not open browser");
            false
        }
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn request() -> ConnectionRequest {
        ConnectionRequest::new("192.168.1.42", "pi", 22, "tok").expect("valid request")
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html(r#"a&b<c>"d'"#), "a&amp;b&lt;c&gt;&quot;d&#39;");
    }

    #[test]
    fn test_page_escapes_payload_ampersands() {
        let req = request();
        let payload = req.to_uri();
        let page = render_page(&req, &payload, &QrImage::File(PathBuf::from("/x/qr.png")));

        assert!(page.contains("pi@192.168.1.42:22"));
        assert!(page.contains(r#"<img src="qr.png""#));
        assert!(page.contains("host=192.168.1.42&amp;port=22"));
        assert!(!page.contains("host=192.168.1.42&port=22"));
    }

    #[test]
    fn test_page_with_remote_image() {
        let req = request();
        let image = QrImage::Remote("https://qr.example.com/?size=300x300&data=abc".to_string());
        let page = render_page(&req, &req.to_uri(), &image);
        assert!(page.contains(r#"src="https://qr.example.com/?size=300x300&amp;data=abc""#));
    }

    #[test]
    fn test_write_page_creates_directory() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("nested").join("out");

        let path = write_page(&out, "<html></html>").expect("should write");
        assert_eq!(path, out.join(PAGE_NAME));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "<html></html>");
    }
}

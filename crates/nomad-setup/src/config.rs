// ABOUTME: Configuration for nomad-setup, built once at startup.
// ABOUTME: Layers built-in defaults, the optional TOML file and command-line flags.

use crate::error::ConfigError;
use crate::payload::DEFAULT_PORT;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Remote QR image endpoint used when no local encoder is installed.
pub const DEFAULT_QR_ENDPOINT: &str = "https://api.qrserver.com/v1/create-qr-code/";

/// Contents of `~/.config/nomad/setup.toml`. Every key is optional.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Fixed host to advertise instead of detecting one
    pub host: Option<String>,

    /// Login account advertised in the payload
    pub user: Option<String>,

    /// SSH port
    pub port: Option<u16>,

    /// Detect the LAN address when no host is given
    pub auto_detect: Option<bool>,

    /// Open the QR page in a browser
    pub open_browser: Option<bool>,

    /// Comment prefix marking legacy keys to prune
    pub prune_prefix: Option<String>,

    /// Base URL of the remote QR image service
    pub qr_endpoint: Option<String>,

    /// Where the QR page and image are written
    pub output_dir: Option<PathBuf>,
}

impl FileConfig {
    /// Returns the config directory path (~/.config/nomad)
    pub fn config_dir() -> Option<PathBuf> {
        // Use XDG-style path on all platforms for consistency
        dirs::home_dir().map(|home| home.join(".config").join("nomad"))
    }

    /// Returns the path to the default config file
    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("setup.toml"))
    }

    /// Load a config file that must exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load the default config file, or defaults if it does not exist.
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }
}

/// Values given on the command line, before layering.
#[derive(Debug, Default, Clone)]
pub struct SetupArgs {
    pub host: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub pubkey_b64: Option<String>,
    pub skip_system: bool,
    pub no_browser: bool,
    pub auto_detect: bool,
    pub output_dir: Option<PathBuf>,
}

/// Fully resolved settings for one quick-setup run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupConfig {
    pub host: Option<String>,
    pub user: Option<String>,
    pub port: u16,
    pub pubkey_b64: Option<String>,
    pub skip_system: bool,
    pub open_browser: bool,
    pub auto_detect: bool,
    pub qr_endpoint: String,
    pub output_dir: PathBuf,
}

impl SetupConfig {
    /// Layer command-line values over the file over built-in defaults.
    pub fn resolve(file: FileConfig, args: SetupArgs) -> Self {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        Self {
            host: non_empty(args.host).or(non_empty(file.host)),
            user: non_empty(args.user).or(non_empty(file.user)),
            port: args.port.or(file.port).unwrap_or(DEFAULT_PORT),
            pubkey_b64: non_empty(args.pubkey_b64),
            skip_system: args.skip_system,
            open_browser: !args.no_browser && file.open_browser.unwrap_or(true),
            auto_detect: args.auto_detect || file.auto_detect.unwrap_or(true),
            qr_endpoint: non_empty(file.qr_endpoint)
                .unwrap_or_else(|| DEFAULT_QR_ENDPOINT.to_string()),
            output_dir: args
                .output_dir
                .or(file.output_dir)
                .unwrap_or_else(default_output_dir),
        }
    }
}

fn default_output_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("nomad-setup")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = SetupConfig::resolve(FileConfig::default(), SetupArgs::default());

        assert_eq!(config.host, None);
        assert_eq!(config.port, 22);
        assert!(config.open_browser);
        assert!(config.auto_detect);
        assert!(!config.skip_system);
        assert_eq!(config.qr_endpoint, DEFAULT_QR_ENDPOINT);
        assert!(config.output_dir.ends_with("nomad-setup"));
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = FileConfig {
            host: Some("10.0.0.1".to_string()),
            user: Some("pi".to_string()),
            port: Some(2200),
            ..FileConfig::default()
        };
        let args = SetupArgs {
            host: Some("192.168.1.42".to_string()),
            port: Some(22),
            ..SetupArgs::default()
        };

        let config = SetupConfig::resolve(file, args);
        assert_eq!(config.host.as_deref(), Some("192.168.1.42"));
        assert_eq!(config.user.as_deref(), Some("pi"));
        assert_eq!(config.port, 22);
    }

    #[test]
    fn test_blank_values_fall_through() {
        let file = FileConfig {
            host: Some("10.0.0.1".to_string()),
            ..FileConfig::default()
        };
        let args = SetupArgs {
            host: Some("  ".to_string()),
            pubkey_b64: Some(String::new()),
            ..SetupArgs::default()
        };

        let config = SetupConfig::resolve(file, args);
        assert_eq!(config.host.as_deref(), Some("10.0.0.1"));
        assert_eq!(config.pubkey_b64, None);
    }

    #[test]
    fn test_auto_detect_is_opt_in_when_file_disables_it() {
        let file = FileConfig {
            auto_detect: Some(false),
            ..FileConfig::default()
        };
        assert!(!SetupConfig::resolve(file.clone(), SetupArgs::default()).auto_detect);

        let args = SetupArgs {
            auto_detect: true,
            ..SetupArgs::default()
        };
        assert!(SetupConfig::resolve(file, args).auto_detect);
    }

    #[test]
    fn test_no_browser_beats_file() {
        let file = FileConfig {
            open_browser: Some(true),
            ..FileConfig::default()
        };
        let args = SetupArgs {
            no_browser: true,
            ..SetupArgs::default()
        };
        assert!(!SetupConfig::resolve(file, args).open_browser);
    }

    #[test]
    fn test_load_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
port = 2222
user = "pi"
auto_detect = false
qr_endpoint = "https://qr.example.com/render"
"#
        )
        .unwrap();

        let config = FileConfig::load(file.path()).expect("should load");
        assert_eq!(config.port, Some(2222));
        assert_eq!(config.user.as_deref(), Some("pi"));
        assert_eq!(config.auto_detect, Some(false));
        assert_eq!(
            config.qr_endpoint.as_deref(),
            Some("https://qr.example.com/render")
        );
    }

    #[test]
    fn test_load_rejects_unknown_keys() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "colour = \"blue\"").unwrap();

        assert!(matches!(
            FileConfig::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            FileConfig::load(&dir.path().join("missing.toml")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_default_path_under_config_dir() {
        if let Some(path) = FileConfig::default_path() {
            assert!(path.ends_with(".config/nomad/setup.toml"));
        }
    }
}

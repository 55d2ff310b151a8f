// ABOUTME: Host setup and QR quick-setup payload for the nomad mobile app.
// ABOUTME: Payload builder, token, LAN detection, system setup, QR display and drivers.

pub mod config;
pub mod display;
pub mod error;
pub mod network;
pub mod payload;
pub mod qr;
pub mod setup;
pub mod system;
pub mod token;

pub use config::{FileConfig, SetupArgs, SetupConfig};
pub use error::{ConfigError, PayloadError};
pub use network::{detect_primary_ipv4, AddressStrategy};
pub use payload::{build_payload, ConnectionRequest};
pub use setup::{migrate_keys, run, Collaborators, MigrateArgs};
pub use system::SystemSetup;
pub use token::new_token;

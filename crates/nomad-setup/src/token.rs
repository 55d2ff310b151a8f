// ABOUTME: Setup token generation.
// ABOUTME: Every run gets a fresh random UUID that the app uses to correlate the QR scan.

use uuid::Uuid;

/// Generate a fresh setup token (random UUID, hyphenated lowercase).
pub fn new_token() -> String {
    Uuid::new_v4().to_string()
}

//! Station credentials
//!
//! Credentials live in a record in flash. A build with `WIFI_SSID` set in
//! `.env` seeds that record on first boot; afterwards the flash copy wins.

use esp_storage::FlashStorage;
use log::info;
use tester_core::config::InternetConfig;
use tester_core::credentials::{self, StoredCredentials};

/// Station credentials embedded by `build.rs` from `.env`.
pub const INTERNET: InternetConfig<'static> = InternetConfig {
    ssid: env!("WIFI_SSID"),
    password: env!("WIFI_PASSWORD"),
};

/// Flash offset of the credentials record, just past the factory app partition.
pub const CREDENTIALS_OFFSET: u32 = 0x11_0000;

/// Credentials to join with, or `None` when no network is configured.
pub fn load(flash: &mut FlashStorage<'_>) -> Option<StoredCredentials> {
    let found = credentials::load_or_seed(flash, CREDENTIALS_OFFSET, INTERNET);
    match &found {
        Some(c) => info!("Wi-Fi network: {}", c.ssid),
        None => info!("No Wi-Fi credentials stored or built in"),
    }
    found
}

//! Wi-Fi credentials kept in flash.
//!
//! The record is a fixed-size block at a caller-chosen offset:
//!
//! | Bytes    | Field                                   |
//! |----------|-----------------------------------------|
//! | 0..4     | magic `CTWF`                            |
//! | 4        | format version                          |
//! | 5        | body length                             |
//! | 6..n     | postcard encoded [`StoredCredentials`]  |
//! | n..n+32  | SHA-256 of the body                     |
//!
//! Erased flash (all `0xFF`) reads back as [`CredentialsError::Empty`].

use core::fmt::Debug;

use embedded_storage::{ReadStorage, Storage};
use heapless::String;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror_no_std::Error;

use crate::config::InternetConfig;

pub const RECORD_SIZE: usize = 160;

const MAGIC: [u8; 4] = *b"CTWF";
/// Bump when [`StoredCredentials`] changes shape.
const VERSION: u8 = 1;
const HEADER: usize = 6;
const HASH: usize = 32;

pub const MAX_SSID: usize = 32;
pub const MAX_PASSWORD: usize = 64;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialsError {
    #[error("no credentials stored")]
    Empty,
    #[error("stored credentials use format version {0}")]
    Version(u8),
    #[error("stored credentials failed their checksum")]
    Corrupt,
    #[error("stored credentials could not be decoded")]
    Malformed,
    #[error("SSID or password too long")]
    TooLong,
    #[error("flash access failed")]
    Storage,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct StoredCredentials {
    pub ssid: String<MAX_SSID>,
    /// Empty for an open network
    pub password: String<MAX_PASSWORD>,
}

impl StoredCredentials {
    pub fn new(ssid: &str, password: &str) -> Result<Self, CredentialsError> {
        Ok(Self {
            ssid: ssid.try_into().map_err(|_| CredentialsError::TooLong)?,
            password: password.try_into().map_err(|_| CredentialsError::TooLong)?,
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.ssid.is_empty()
    }

    pub fn as_internet(&self) -> InternetConfig<'_> {
        InternetConfig {
            ssid: &self.ssid,
            password: &self.password,
        }
    }
}

fn digest(body: &[u8]) -> [u8; HASH] {
    Sha256::digest(body).into()
}

/// Serialize `credentials` into a full record block.
pub fn encode_record(
    credentials: &StoredCredentials,
    record: &mut [u8; RECORD_SIZE],
) -> Result<(), CredentialsError> {
    record.fill(0xFF);
    let body_len = postcard::to_slice(credentials, &mut record[HEADER..RECORD_SIZE - HASH])
        .map_err(|_| CredentialsError::TooLong)?
        .len();

    record[..4].copy_from_slice(&MAGIC);
    record[4] = VERSION;
    // The body slot is shorter than 256 bytes.
    record[5] = body_len as u8;

    let end = HEADER + body_len;
    let hash = digest(&record[HEADER..end]);
    record[end..end + HASH].copy_from_slice(&hash);
    Ok(())
}

pub fn decode_record(record: &[u8]) -> Result<StoredCredentials, CredentialsError> {
    if record.len() < HEADER || record[..4] != MAGIC {
        return Err(CredentialsError::Empty);
    }
    if record[4] != VERSION {
        return Err(CredentialsError::Version(record[4]));
    }

    let end = HEADER + usize::from(record[5]);
    let body = record.get(HEADER..end).ok_or(CredentialsError::Malformed)?;
    let hash = record.get(end..end + HASH).ok_or(CredentialsError::Malformed)?;
    if digest(body) != hash {
        return Err(CredentialsError::Corrupt);
    }

    postcard::from_bytes(body).map_err(|_| CredentialsError::Malformed)
}

/// Read the record at `offset`.
pub fn load<S>(storage: &mut S, offset: u32) -> Result<StoredCredentials, CredentialsError>
where
    S: ReadStorage,
    S::Error: Debug,
{
    let mut record = [0u8; RECORD_SIZE];
    storage.read(offset, &mut record).map_err(|e| {
        warn!("Flash read at {:#x} failed: {:?}", offset, e);
        CredentialsError::Storage
    })?;
    decode_record(&record)
}

/// Overwrite the record at `offset`.
pub fn save<S>(
    storage: &mut S,
    offset: u32,
    credentials: &StoredCredentials,
) -> Result<(), CredentialsError>
where
    S: Storage,
    S::Error: Debug,
{
    let mut record = [0u8; RECORD_SIZE];
    encode_record(credentials, &mut record)?;
    storage.write(offset, &record).map_err(|e| {
        warn!("Flash write at {:#x} failed: {:?}", offset, e);
        CredentialsError::Storage
    })?;
    debug!("Saved credentials for {}", credentials.ssid);
    Ok(())
}

/// Stored credentials, else `fallback` (written back so the next boot finds them).
///
/// Returns `None` when neither source names a network.
pub fn load_or_seed<S>(
    storage: &mut S,
    offset: u32,
    fallback: InternetConfig<'_>,
) -> Option<StoredCredentials>
where
    S: Storage,
    S::Error: Debug,
{
    match load(storage, offset) {
        Ok(stored) if stored.is_configured() => return Some(stored),
        Ok(_) => debug!("Stored credentials name no network"),
        Err(e) => debug!("No usable stored credentials: {}", e),
    }

    if fallback.ssid.is_empty() {
        return None;
    }
    let seeded = match StoredCredentials::new(fallback.ssid, fallback.password) {
        Ok(seeded) => seeded,
        Err(e) => {
            warn!("Built-in credentials rejected: {}", e);
            return None;
        }
    };
    if let Err(e) = save(storage, offset, &seeded) {
        warn!("Could not persist built-in credentials: {}", e);
    }
    Some(seeded)
}

//! Content fingerprints
//!
//! A fingerprint is the lower-case hex MD5 digest of a byte sequence. It is used both
//! for per-chunk checksums and for whole-file content addressing.

use std::fmt;
use std::str::FromStr;

use md5::{Digest, Md5};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::AppError;

pub const FINGERPRINT_LEN: usize = 32;

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Parse a client-supplied digest. Upper-case hex is accepted and normalised.
    pub fn parse(value: &str) -> Result<Self, AppError> {
        let value = value.trim();
        if value.len() != FINGERPRINT_LEN || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AppError::InvalidInput(format!(
                "Fingerprint must be {} hexadecimal characters",
                FINGERPRINT_LEN
            )));
        }
        Ok(Self(value.to_ascii_lowercase()))
    }

    pub fn of(bytes: &[u8]) -> Self {
        Self(hex::encode(Md5::digest(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Two-character shard prefix used to spread content across directories.
    pub fn shard(&self) -> &str {
        &self.0[..2]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Fingerprint::parse(s)
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Fingerprint::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Incremental MD5 over a byte stream.
#[derive(Default)]
pub struct FingerprintHasher {
    inner: Md5,
    bytes: u64,
}

impl FingerprintHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
        self.bytes += data.len() as u64;
    }

    pub fn bytes_hashed(&self) -> u64 {
        self.bytes
    }

    pub fn finish(self) -> Fingerprint {
        Fingerprint(hex::encode(self.inner.finalize()))
    }
}

/// Unique identity of stored content: fingerprint plus byte length.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContentKey {
    pub fingerprint: Fingerprint,
    pub size: u64,
}

impl ContentKey {
    pub fn new(fingerprint: Fingerprint, size: u64) -> Self {
        Self { fingerprint, size }
    }

    /// Storage key under which the bytes for this content live.
    pub fn storage_key(&self) -> String {
        format!(
            "content/{}/{}-{}",
            self.fingerprint.shard(),
            self.fingerprint,
            self.size
        )
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.fingerprint, self.size)
    }
}

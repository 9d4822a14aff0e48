use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::fingerprint::{ContentKey, Fingerprint};

/// Deduplicated stored bytes. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRecord {
    pub id: Uuid,
    pub fingerprint: Fingerprint,
    pub size: u64,
    pub storage_key: String,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
}

impl ContentRecord {
    pub fn new(key: &ContentKey, mime_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            fingerprint: key.fingerprint.clone(),
            size: key.size,
            storage_key: key.storage_key(),
            mime_type: mime_type.into(),
            created_at: Utc::now(),
        }
    }

    pub fn key(&self) -> ContentKey {
        ContentKey::new(self.fingerprint.clone(), self.size)
    }
}

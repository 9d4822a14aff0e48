use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use super::content::ContentRecord;
use crate::fingerprint::Fingerprint;
use crate::mime::mime_type_for;

/// Where a file lives in the team workspace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Placement {
    pub folder_id: Option<Uuid>,
    pub workflow_id: Option<Uuid>,
    pub task_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Only the owner can see the file
    #[default]
    Private,
    /// Every team member can see the file
    Team,
}

impl Display for Visibility {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Visibility::Private => write!(f, "private"),
            Visibility::Team => write!(f, "team"),
        }
    }
}

impl FromStr for Visibility {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Visibility::Private),
            "team" => Ok(Visibility::Team),
            _ => Err(anyhow::anyhow!("Invalid visibility: {}", s)),
        }
    }
}

/// Lifecycle of a file record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    #[default]
    Active,
    Deleted,
}

impl Display for RecordState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            RecordState::Active => write!(f, "active"),
            RecordState::Deleted => write!(f, "deleted"),
        }
    }
}

impl FromStr for RecordState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(RecordState::Active),
            "deleted" => Ok(RecordState::Deleted),
            _ => Err(anyhow::anyhow!("Invalid record state: {}", s)),
        }
    }
}

/// User-facing file record pointing at stored content
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub file_name: String,
    pub content_id: Uuid,
    pub fingerprint: Fingerprint,
    pub file_size: u64,
    pub mime_type: String,
    pub placement: Placement,
    pub visibility: Visibility,
    pub description: Option<String>,
    pub version: i32,
    pub state: RecordState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileEntry {
    /// New active entry at version 1 pointing at `content`. The MIME type follows
    /// the entry's own name, not the name the content was first uploaded under.
    pub fn for_content(new: NewFileEntry, content: &ContentRecord) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id: new.owner_id,
            mime_type: mime_type_for(&new.file_name).to_string(),
            file_name: new.file_name,
            content_id: content.id,
            fingerprint: content.fingerprint.clone(),
            file_size: content.size,
            placement: new.placement,
            visibility: new.visibility,
            description: new.description,
            version: 1,
            state: RecordState::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == RecordState::Active
    }
}

/// Fields needed to create a file record
#[derive(Debug, Clone)]
pub struct NewFileEntry {
    pub owner_id: Uuid,
    pub file_name: String,
    pub placement: Placement,
    pub visibility: Visibility,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FileEntryResponse {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
    pub fingerprint: String,
    pub placement: Placement,
    pub visibility: Visibility,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<FileEntry> for FileEntryResponse {
    fn from(entry: FileEntry) -> Self {
        Self {
            id: entry.id,
            owner_id: entry.owner_id,
            file_name: entry.file_name,
            file_size: entry.file_size,
            mime_type: entry.mime_type,
            fingerprint: entry.fingerprint.to_string(),
            placement: entry.placement,
            visibility: entry.visibility,
            description: entry.description,
            version: entry.version,
            created_at: entry.created_at,
            updated_at: entry.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::ContentKey;

    #[test]
    fn test_for_content_uses_entry_name_for_mime() {
        let key = ContentKey::new(Fingerprint::of(b"%PDF"), 4);
        let content = ContentRecord::new(&key, "application/octet-stream");
        let entry = FileEntry::for_content(
            NewFileEntry {
                owner_id: Uuid::new_v4(),
                file_name: "report.pdf".to_string(),
                placement: Placement::default(),
                visibility: Visibility::Team,
                description: None,
            },
            &content,
        );

        assert_eq!(entry.mime_type, "application/pdf");
        assert_eq!(entry.content_id, content.id);
        assert_eq!(entry.file_size, 4);
        assert_eq!(entry.version, 1);
        assert!(entry.is_active());
    }

    #[test]
    fn test_visibility_text_round_trip() {
        for v in [Visibility::Private, Visibility::Team] {
            assert_eq!(v.to_string().parse::<Visibility>().unwrap(), v);
        }
        assert!("public".parse::<Visibility>().is_err());
    }
}

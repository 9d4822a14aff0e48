use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ArchiveStatus {
    /// Allowed moves: pending -> processing -> completed | failed.
    pub fn can_transition_to(self, next: ArchiveStatus) -> bool {
        matches!(
            (self, next),
            (ArchiveStatus::Pending, ArchiveStatus::Processing)
                | (ArchiveStatus::Processing, ArchiveStatus::Completed)
                | (ArchiveStatus::Processing, ArchiveStatus::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ArchiveStatus::Completed | ArchiveStatus::Failed)
    }
}

impl Display for ArchiveStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ArchiveStatus::Pending => write!(f, "pending"),
            ArchiveStatus::Processing => write!(f, "processing"),
            ArchiveStatus::Completed => write!(f, "completed"),
            ArchiveStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for ArchiveStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ArchiveStatus::Pending),
            "processing" => Ok(ArchiveStatus::Processing),
            "completed" => Ok(ArchiveStatus::Completed),
            "failed" => Ok(ArchiveStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid archive status: {}", s)),
        }
    }
}

/// Tracked batch packaging job
#[derive(Debug, Clone)]
pub struct ArchiveTask {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub name: String,
    pub file_ids: Vec<Uuid>,
    pub status: ArchiveStatus,
    pub container_key: Option<String>,
    pub container_size: Option<u64>,
    pub error_detail: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ArchiveTask {
    pub fn new_pending(requester_id: Uuid, name: String, file_ids: Vec<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            requester_id,
            name,
            file_ids,
            status: ArchiveStatus::Pending,
            container_key: None,
            container_size: None,
            error_detail: None,
            expires_at: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Status change applied by the archive builder
#[derive(Debug, Clone)]
pub enum ArchiveTransition {
    Start,
    Complete {
        container_key: String,
        container_size: u64,
        expires_at: DateTime<Utc>,
    },
    Fail {
        error_detail: String,
    },
}

impl ArchiveTransition {
    pub fn target(&self) -> ArchiveStatus {
        match self {
            ArchiveTransition::Start => ArchiveStatus::Processing,
            ArchiveTransition::Complete { .. } => ArchiveStatus::Completed,
            ArchiveTransition::Fail { .. } => ArchiveStatus::Failed,
        }
    }

    /// Apply to an in-memory task. The caller checks the transition is allowed.
    pub fn apply(self, task: &mut ArchiveTask, now: DateTime<Utc>) {
        task.status = self.target();
        task.updated_at = now;
        match self {
            ArchiveTransition::Start => {}
            ArchiveTransition::Complete {
                container_key,
                container_size,
                expires_at,
            } => {
                task.container_key = Some(container_key);
                task.container_size = Some(container_size);
                task.expires_at = Some(expires_at);
                task.completed_at = Some(now);
            }
            ArchiveTransition::Fail { error_detail } => {
                task.error_detail = Some(error_detail);
                task.completed_at = Some(now);
            }
        }
    }
}

/// Request to package several files into one archive
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateArchiveRequest {
    #[validate(length(min = 1, message = "At least one file id is required"))]
    pub file_ids: Vec<Uuid>,
    #[serde(default)]
    #[validate(length(max = 255, message = "Archive name must be at most 255 characters"))]
    pub archive_name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateArchiveResponse {
    pub task_id: Uuid,
    pub accepted_count: usize,
    pub status: ArchiveStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ArchiveTaskResponse {
    pub task_id: Uuid,
    pub name: String,
    pub status: ArchiveStatus,
    pub file_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Download location, present once the archive is completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieval_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ArchiveTaskResponse {
    pub fn from_task(task: ArchiveTask, public_base_url: &str) -> Self {
        let retrieval_reference = (task.status == ArchiveStatus::Completed).then(|| {
            format!("{}/api/v1/archives/{}/download", public_base_url, task.id)
        });
        Self {
            task_id: task.id,
            name: task.name,
            status: task.status,
            file_count: task.file_ids.len(),
            size: task.container_size,
            retrieval_reference,
            error_detail: task.error_detail,
            expires_at: task.expires_at,
            created_at: task.created_at,
            completed_at: task.completed_at,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListArchivesQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    20
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ArchiveTaskList {
    pub tasks: Vec<ArchiveTaskResponse>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ArchiveStatus; 4] = [
        ArchiveStatus::Pending,
        ArchiveStatus::Processing,
        ArchiveStatus::Completed,
        ArchiveStatus::Failed,
    ];

    #[test]
    fn test_only_forward_transitions_allowed() {
        let allowed: Vec<_> = ALL
            .iter()
            .flat_map(|from| ALL.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .collect();
        assert_eq!(
            allowed,
            vec![
                (ArchiveStatus::Pending, ArchiveStatus::Processing),
                (ArchiveStatus::Processing, ArchiveStatus::Completed),
                (ArchiveStatus::Processing, ArchiveStatus::Failed),
            ]
        );
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in ALL {
            assert_eq!(status.to_string().parse::<ArchiveStatus>().unwrap(), status);
        }
        assert!("running".parse::<ArchiveStatus>().is_err());
    }

    #[test]
    fn test_complete_transition_stamps_fields() {
        let mut task = ArchiveTask::new_pending(Uuid::new_v4(), "a.zip".into(), vec![]);
        let now = Utc::now();
        ArchiveTransition::Start.apply(&mut task, now);
        assert_eq!(task.status, ArchiveStatus::Processing);

        ArchiveTransition::Complete {
            container_key: "archives/x.zip".into(),
            container_size: 42,
            expires_at: now + chrono::Duration::hours(24),
        }
        .apply(&mut task, now);
        assert_eq!(task.status, ArchiveStatus::Completed);
        assert_eq!(task.container_size, Some(42));
        assert!(!task.is_expired(now));
        assert!(task.is_expired(now + chrono::Duration::hours(25)));
    }

    #[test]
    fn test_retrieval_reference_only_when_completed() {
        let task = ArchiveTask::new_pending(Uuid::new_v4(), "a.zip".into(), vec![Uuid::new_v4()]);
        let response = ArchiveTaskResponse::from_task(task, "http://localhost:3000");
        assert!(response.retrieval_reference.is_none());
        assert_eq!(response.file_count, 1);
    }
}

use chrono::{DateTime, Utc};
use cofile_core::models::{ArchiveStatus, ArchiveTask, ArchiveTransition};
use cofile_core::AppError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::repository::{rejected_transition, ArchiveTaskRepository};

#[derive(Default)]
pub struct InMemoryArchiveTaskRepository {
    tasks: DashMap<Uuid, ArchiveTask>,
}

impl InMemoryArchiveTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ArchiveTaskRepository for InMemoryArchiveTaskRepository {
    async fn create(&self, task: ArchiveTask) -> Result<ArchiveTask, AppError> {
        match self.tasks.entry(task.id) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "Archive task {} already exists",
                task.id
            ))),
            Entry::Vacant(slot) => Ok(slot.insert(task).value().clone()),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<ArchiveTask>, AppError> {
        Ok(self.tasks.get(&id).map(|t| t.value().clone()))
    }

    async fn transition(
        &self,
        id: Uuid,
        transition: ArchiveTransition,
    ) -> Result<ArchiveTask, AppError> {
        let mut task = self
            .tasks
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Archive task {} not found", id)))?;

        let target = transition.target();
        if !task.status.can_transition_to(target) {
            return Err(rejected_transition(id, task.status, target));
        }
        transition.apply(task.value_mut(), Utc::now());
        Ok(task.value().clone())
    }

    async fn list_for_requester(
        &self,
        requester_id: Uuid,
        limit: u32,
        offset: u64,
    ) -> Result<(Vec<ArchiveTask>, u64), AppError> {
        let mut tasks: Vec<ArchiveTask> = self
            .tasks
            .iter()
            .filter(|t| t.value().requester_id == requester_id)
            .map(|t| t.value().clone())
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = tasks.len() as u64;
        let page = tasks
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn list_expired(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ArchiveTask>, AppError> {
        Ok(self
            .tasks
            .iter()
            .filter(|t| t.value().status == ArchiveStatus::Completed && t.value().is_expired(now))
            .take(limit as usize)
            .map(|t| t.value().clone())
            .collect())
    }

    async fn list_by_status(&self, status: ArchiveStatus) -> Result<Vec<ArchiveTask>, AppError> {
        Ok(self
            .tasks
            .iter()
            .filter(|t| t.value().status == status)
            .map(|t| t.value().clone())
            .collect())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(self.tasks.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pending(requester: Uuid) -> ArchiveTask {
        ArchiveTask::new_pending(requester, "bundle.zip".to_string(), vec![Uuid::new_v4()])
    }

    fn complete(expires_at: DateTime<Utc>) -> ArchiveTransition {
        ArchiveTransition::Complete {
            container_key: "archives/x.zip".to_string(),
            container_size: 10,
            expires_at,
        }
    }

    #[tokio::test]
    async fn test_transition_rejects_skipping_processing() {
        let repo = InMemoryArchiveTaskRepository::new();
        let task = repo.create(pending(Uuid::new_v4())).await.unwrap();

        let err = repo
            .transition(task.id, complete(Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        assert_eq!(
            repo.get(task.id).await.unwrap().unwrap().status,
            ArchiveStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_terminal_states_are_final() {
        let repo = InMemoryArchiveTaskRepository::new();
        let task = repo.create(pending(Uuid::new_v4())).await.unwrap();

        repo.transition(task.id, ArchiveTransition::Start).await.unwrap();
        repo.transition(
            task.id,
            ArchiveTransition::Fail {
                error_detail: "disk full".to_string(),
            },
        )
        .await
        .unwrap();

        assert!(repo.transition(task.id, ArchiveTransition::Start).await.is_err());
        assert!(repo.transition(task.id, complete(Utc::now())).await.is_err());
        let stored = repo.get(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ArchiveStatus::Failed);
        assert_eq!(stored.error_detail.as_deref(), Some("disk full"));
    }

    #[tokio::test]
    async fn test_transition_unknown_task_is_not_found() {
        let repo = InMemoryArchiveTaskRepository::new();
        let err = repo
            .transition(Uuid::new_v4(), ArchiveTransition::Start)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_expired_only_returns_completed_past_expiry() {
        let repo = InMemoryArchiveTaskRepository::new();
        let now = Utc::now();

        let expired = repo.create(pending(Uuid::new_v4())).await.unwrap();
        repo.transition(expired.id, ArchiveTransition::Start).await.unwrap();
        repo.transition(expired.id, complete(now - Duration::hours(1)))
            .await
            .unwrap();

        let fresh = repo.create(pending(Uuid::new_v4())).await.unwrap();
        repo.transition(fresh.id, ArchiveTransition::Start).await.unwrap();
        repo.transition(fresh.id, complete(now + Duration::hours(1)))
            .await
            .unwrap();

        repo.create(pending(Uuid::new_v4())).await.unwrap();

        let found = repo.list_expired(now, 100).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, expired.id);
    }

    #[tokio::test]
    async fn test_list_for_requester_is_paginated_newest_first() {
        let repo = InMemoryArchiveTaskRepository::new();
        let requester = Uuid::new_v4();
        let base = Utc::now();

        for i in 0..5 {
            let mut task = pending(requester);
            task.created_at = base + Duration::seconds(i);
            repo.create(task).await.unwrap();
        }
        repo.create(pending(Uuid::new_v4())).await.unwrap();

        let (page, total) = repo.list_for_requester(requester, 2, 0).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
        assert!(page[0].created_at > page[1].created_at);

        let (last, _) = repo.list_for_requester(requester, 2, 4).await.unwrap();
        assert_eq!(last.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_reports_presence() {
        let repo = InMemoryArchiveTaskRepository::new();
        let task = repo.create(pending(Uuid::new_v4())).await.unwrap();
        assert!(repo.delete(task.id).await.unwrap());
        assert!(!repo.delete(task.id).await.unwrap());
        assert!(repo.get(task.id).await.unwrap().is_none());
    }
}

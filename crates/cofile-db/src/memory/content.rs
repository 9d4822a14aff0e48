use cofile_core::models::ContentRecord;
use cofile_core::{AppError, ContentKey};
use dashmap::DashMap;
use uuid::Uuid;

use crate::repository::ContentRepository;

#[derive(Default)]
pub struct InMemoryContentRepository {
    records: DashMap<ContentKey, ContentRecord>,
}

impl InMemoryContentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ContentRepository for InMemoryContentRepository {
    async fn find_by_key(&self, key: &ContentKey) -> Result<Option<ContentRecord>, AppError> {
        Ok(self.records.get(key).map(|r| r.value().clone()))
    }

    async fn get(&self, id: Uuid) -> Result<Option<ContentRecord>, AppError> {
        Ok(self
            .records
            .iter()
            .find(|r| r.value().id == id)
            .map(|r| r.value().clone()))
    }

    async fn insert_or_get(&self, record: ContentRecord) -> Result<ContentRecord, AppError> {
        let stored = self
            .records
            .entry(record.key())
            .or_insert(record)
            .value()
            .clone();
        Ok(stored)
    }

    async fn count(&self) -> Result<u64, AppError> {
        Ok(self.records.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cofile_core::Fingerprint;

    #[tokio::test]
    async fn test_insert_or_get_keeps_first_record() {
        let repo = InMemoryContentRepository::new();
        let key = ContentKey::new(Fingerprint::of(b"abc"), 3);

        let first = repo
            .insert_or_get(ContentRecord::new(&key, "text/plain"))
            .await
            .unwrap();
        let second = repo
            .insert_or_get(ContentRecord::new(&key, "text/plain"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(repo.count().await.unwrap(), 1);
        assert_eq!(repo.get(first.id).await.unwrap(), Some(first.clone()));
        assert_eq!(repo.find_by_key(&key).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_same_fingerprint_different_size_is_distinct() {
        let repo = InMemoryContentRepository::new();
        let fp = Fingerprint::of(b"abc");

        repo.insert_or_get(ContentRecord::new(&ContentKey::new(fp.clone(), 3), "a"))
            .await
            .unwrap();
        repo.insert_or_get(ContentRecord::new(&ContentKey::new(fp, 4), "a"))
            .await
            .unwrap();

        assert_eq!(repo.count().await.unwrap(), 2);
    }
}

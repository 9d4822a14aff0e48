use cofile_core::models::FileEntry;
use cofile_core::AppError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::repository::FileRepository;

#[derive(Default)]
pub struct InMemoryFileRepository {
    entries: DashMap<Uuid, FileEntry>,
}

impl InMemoryFileRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl FileRepository for InMemoryFileRepository {
    async fn create(&self, entry: FileEntry) -> Result<FileEntry, AppError> {
        match self.entries.entry(entry.id) {
            Entry::Occupied(_) => Err(AppError::Conflict(format!(
                "File {} already exists",
                entry.id
            ))),
            Entry::Vacant(slot) => Ok(slot.insert(entry).value().clone()),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<FileEntry>, AppError> {
        Ok(self.entries.get(&id).map(|e| e.value().clone()))
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<FileEntry>, AppError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.entries.get(id).map(|e| e.value().clone()))
            .collect())
    }

    async fn count(&self) -> Result<u64, AppError> {
        Ok(self.entries.len() as u64)
    }
}

#[cfg(test)]
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};

#[cfg(test)]
use async_trait::async_trait;
#[cfg(test)]
use axum::{extract::Request, middleware::Next, response::Response, Router};
#[cfg(test)]
use chrono::{Duration, Utc};
#[cfg(test)]
use uuid::Uuid;

#[cfg(test)]
use crate::core::error::{AppError, Result};
#[cfg(test)]
use crate::features::auth::model::AuthenticatedUser;
#[cfg(test)]
use crate::features::files::models::{DeletedFilter, FileQuery, FileRecord, NewFileRecord};
#[cfg(test)]
use crate::features::files::repositories::FileRepository;

#[cfg(test)]
pub fn create_test_user(user_id: i64) -> AuthenticatedUser {
    AuthenticatedUser {
        user_id,
        username: Some(format!("user-{}", user_id)),
    }
}

/// Wrap a router so every request carries `user_id` as the authenticated owner
#[cfg(test)]
pub fn with_authenticated_user(router: Router, user_id: i64) -> Router {
    router.layer(axum::middleware::from_fn(
        move |mut request: Request, next: Next| async move {
            request.extensions_mut().insert(create_test_user(user_id));
            next.run(request).await
        },
    ))
}

/// In-memory `FileRepository` following the same filter semantics as the
/// PostgreSQL one
#[cfg(test)]
#[derive(Default)]
pub struct InMemoryFileRepository {
    records: Mutex<Vec<FileRecord>>,
    fail_inserts: AtomicBool,
}

#[cfg(test)]
#[allow(dead_code)]
impl InMemoryFileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following insert fail with a database error
    pub fn fail_inserts(&self) {
        self.fail_inserts.store(true, Ordering::SeqCst);
    }

    /// Raw row, deleted or not
    pub fn get(&self, id: Uuid) -> Option<FileRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[cfg(test)]
#[async_trait]
impl FileRepository for InMemoryFileRepository {
    async fn insert(&self, record: NewFileRecord) -> Result<FileRecord> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }

        let mut records = self.records.lock().unwrap();

        // strictly increasing timestamps keep ordering deterministic
        let mut created_at = Utc::now();
        if let Some(last) = records.iter().map(|r| r.created_at).max() {
            if created_at <= last {
                created_at = last + Duration::microseconds(1);
            }
        }

        let file = FileRecord {
            id: Uuid::new_v4(),
            owner_id: record.owner_id,
            original_name: record.original_name,
            storage_path: record.storage_path,
            public_url: record.public_url,
            declared_type: record.declared_type,
            verified_type: record.verified_type,
            size_bytes: record.size_bytes,
            extension: record.extension,
            category: record.category,
            tags: record.tags,
            description: record.description,
            download_count: 0,
            view_count: 0,
            deleted: false,
            created_at,
            updated_at: created_at,
        };
        records.push(file.clone());

        Ok(file)
    }

    async fn find_by_id(
        &self,
        id: Uuid,
        owner_id: i64,
        deleted: DeletedFilter,
    ) -> Result<Option<FileRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id && r.owner_id == owner_id && deleted.admits(r))
            .cloned())
    }

    async fn find_by_public_url(
        &self,
        public_url: &str,
        deleted: DeletedFilter,
    ) -> Result<Option<FileRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.public_url == public_url && deleted.admits(r))
            .cloned())
    }

    async fn list(
        &self,
        owner_id: i64,
        query: &FileQuery,
        deleted: DeletedFilter,
    ) -> Result<(Vec<FileRecord>, i64)> {
        let mut matching: Vec<FileRecord> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.owner_id == owner_id && deleted.admits(r) && query.matches(r))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit() as usize)
            .collect();

        Ok((page, total))
    }

    async fn soft_delete(&self, id: Uuid, owner_id: i64) -> Result<bool> {
        let mut records = self.records.lock().unwrap();
        match records
            .iter_mut()
            .find(|r| r.id == id && r.owner_id == owner_id && !r.deleted)
        {
            Some(record) => {
                record.deleted = true;
                record.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn increment_download_count(&self, id: Uuid) -> Result<()> {
        if let Some(record) = self
            .records
            .lock()
            .unwrap()
            .iter_mut()
            .find(|r| r.id == id && !r.deleted)
        {
            record.download_count += 1;
        }
        Ok(())
    }

    async fn increment_view_count(&self, id: Uuid) -> Result<()> {
        if let Some(record) = self
            .records
            .lock()
            .unwrap()
            .iter_mut()
            .find(|r| r.id == id && !r.deleted)
        {
            record.view_count += 1;
        }
        Ok(())
    }

    async fn distinct_categories(
        &self,
        owner_id: i64,
        deleted: DeletedFilter,
    ) -> Result<Vec<String>> {
        let mut categories: Vec<String> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.owner_id == owner_id && deleted.admits(r))
            .filter_map(|r| r.category.clone())
            .filter(|c| !c.is_empty())
            .collect();
        categories.sort();
        categories.dedup();
        Ok(categories)
    }
}

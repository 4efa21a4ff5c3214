use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::core::error::Result;
use crate::features::files::models::{DeletedFilter, FileQuery, FileRecord, NewFileRecord};

/// Metadata store for uploaded files.
///
/// Owner-scoped methods filter by both id and owner, so another user's file
/// is indistinguishable from a missing one. Reads take a mandatory
/// [`DeletedFilter`].
#[async_trait]
pub trait FileRepository: Send + Sync {
    async fn insert(&self, record: NewFileRecord) -> Result<FileRecord>;

    async fn find_by_id(
        &self,
        id: Uuid,
        owner_id: i64,
        deleted: DeletedFilter,
    ) -> Result<Option<FileRecord>>;

    async fn find_by_public_url(
        &self,
        public_url: &str,
        deleted: DeletedFilter,
    ) -> Result<Option<FileRecord>>;

    /// One page of matching records (newest first) and the total match count
    async fn list(
        &self,
        owner_id: i64,
        query: &FileQuery,
        deleted: DeletedFilter,
    ) -> Result<(Vec<FileRecord>, i64)>;

    /// Mark a live record deleted. `false` when there was nothing to delete.
    async fn soft_delete(&self, id: Uuid, owner_id: i64) -> Result<bool>;

    /// +1 on the download counter; a missing record is a no-op
    async fn increment_download_count(&self, id: Uuid) -> Result<()>;

    /// +1 on the view counter; a missing record is a no-op
    async fn increment_view_count(&self, id: Uuid) -> Result<()>;

    /// Sorted non-empty categories used by the owner
    async fn distinct_categories(&self, owner_id: i64, deleted: DeletedFilter)
        -> Result<Vec<String>>;
}

/// PostgreSQL-backed [`FileRepository`]
pub struct PgFileRepository {
    pool: PgPool,
}

impl PgFileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn deleted_clause(deleted: DeletedFilter) -> &'static str {
    match deleted {
        DeletedFilter::ExcludeDeleted => " AND deleted = FALSE",
        DeletedFilter::IncludeDeleted => "",
    }
}

/// `%value%` with LIKE metacharacters escaped
fn contains_pattern(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// WHERE clause shared by the page query and the count query
fn push_list_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    owner_id: i64,
    query: &FileQuery,
    deleted: DeletedFilter,
) {
    builder.push(" WHERE owner_id = ");
    builder.push_bind(owner_id);
    builder.push(deleted_clause(deleted));

    if let Some(keyword) = &query.keyword {
        let pattern = contains_pattern(keyword);
        builder.push(" AND (original_name ILIKE ");
        builder.push_bind(pattern.clone());
        builder.push(" OR description ILIKE ");
        builder.push_bind(pattern);
        builder.push(")");
    }

    if let Some(category) = &query.category {
        builder.push(" AND category = ");
        builder.push_bind(category.clone());
    }

    for tag in &query.tags {
        builder.push(" AND tags ILIKE ");
        builder.push_bind(contains_pattern(tag));
    }
}

#[async_trait]
impl FileRepository for PgFileRepository {
    async fn insert(&self, record: NewFileRecord) -> Result<FileRecord> {
        let mut tx = self.pool.begin().await?;

        let file = sqlx::query_as::<_, FileRecord>(
            r#"
            INSERT INTO file_records (
                owner_id, original_name, storage_path, public_url, declared_type,
                verified_type, size_bytes, extension, category, tags, description
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(record.owner_id)
        .bind(record.original_name)
        .bind(record.storage_path)
        .bind(record.public_url)
        .bind(record.declared_type)
        .bind(record.verified_type)
        .bind(record.size_bytes)
        .bind(record.extension)
        .bind(record.category)
        .bind(record.tags)
        .bind(record.description)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(file)
    }

    async fn find_by_id(
        &self,
        id: Uuid,
        owner_id: i64,
        deleted: DeletedFilter,
    ) -> Result<Option<FileRecord>> {
        let sql = format!(
            "SELECT * FROM file_records WHERE id = $1 AND owner_id = $2{}",
            deleted_clause(deleted)
        );

        let file = sqlx::query_as::<_, FileRecord>(&sql)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(file)
    }

    async fn find_by_public_url(
        &self,
        public_url: &str,
        deleted: DeletedFilter,
    ) -> Result<Option<FileRecord>> {
        let sql = format!(
            "SELECT * FROM file_records WHERE public_url = $1{} LIMIT 1",
            deleted_clause(deleted)
        );

        let file = sqlx::query_as::<_, FileRecord>(&sql)
            .bind(public_url)
            .fetch_optional(&self.pool)
            .await?;

        Ok(file)
    }

    async fn list(
        &self,
        owner_id: i64,
        query: &FileQuery,
        deleted: DeletedFilter,
    ) -> Result<(Vec<FileRecord>, i64)> {
        let mut count_builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM file_records");
        push_list_filters(&mut count_builder, owner_id, query, deleted);
        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut builder = QueryBuilder::<Postgres>::new("SELECT * FROM file_records");
        push_list_filters(&mut builder, owner_id, query, deleted);
        // id breaks ties so pages never overlap
        builder.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        builder.push_bind(query.limit());
        builder.push(" OFFSET ");
        builder.push_bind(query.offset());

        let files = builder
            .build_query_as::<FileRecord>()
            .fetch_all(&self.pool)
            .await?;

        Ok((files, total))
    }

    async fn soft_delete(&self, id: Uuid, owner_id: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE file_records
            SET deleted = TRUE, updated_at = NOW()
            WHERE id = $1 AND owner_id = $2 AND deleted = FALSE
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn increment_download_count(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE file_records
            SET download_count = download_count + 1, updated_at = NOW()
            WHERE id = $1 AND deleted = FALSE
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn increment_view_count(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE file_records
            SET view_count = view_count + 1, updated_at = NOW()
            WHERE id = $1 AND deleted = FALSE
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn distinct_categories(
        &self,
        owner_id: i64,
        deleted: DeletedFilter,
    ) -> Result<Vec<String>> {
        let sql = format!(
            r#"
            SELECT DISTINCT category FROM file_records
            WHERE owner_id = $1 AND category IS NOT NULL AND category <> ''{}
            ORDER BY category
            "#,
            deleted_clause(deleted)
        );

        let categories = sqlx::query_scalar::<_, String>(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(categories)
    }
}

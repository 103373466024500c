use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    sea_query::{Expr, Func, LikeExpr},
};
use std::collections::HashSet;
use uuid::Uuid;

use crate::entities::{files, prelude::Files};

pub type FileRecord = files::Model;

#[derive(Debug, Clone, Default)]
pub struct FileChanges {
    pub filename: Option<String>,
    pub url: Option<String>,
    pub object_key: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Case-insensitive substring match on the filename
    pub search: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct Page {
    /// 1-based page number
    pub page: u64,
    pub limit: u64,
}

impl Default for Page {
    fn default() -> Self {
        Self { page: 1, limit: 10 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileStats {
    pub total_files: u64,
    pub last_upload: Option<DateTime<Utc>>,
}

/// Persistence for file records, always scoped by owner where user input is involved.
#[async_trait]
pub trait FileRepository: Send + Sync {
    async fn create(
        &self,
        filename: &str,
        url: &str,
        object_key: &str,
        owner_id: &str,
    ) -> Result<FileRecord, DbErr>;

    async fn find_owned(&self, id: &str, owner_id: &str) -> Result<Option<FileRecord>, DbErr>;

    async fn update(&self, id: &str, changes: FileChanges) -> Result<FileRecord, DbErr>;

    async fn delete(&self, id: &str) -> Result<(), DbErr>;

    async fn list(
        &self,
        owner_id: &str,
        filter: &ListFilter,
        page: Page,
    ) -> Result<(Vec<FileRecord>, u64), DbErr>;

    async fn stats(&self, owner_id: &str) -> Result<FileStats, DbErr>;

    /// Subset of `keys` referenced by at least one record.
    async fn object_keys_present(&self, keys: &[String]) -> Result<HashSet<String>, DbErr>;
}

pub struct SeaOrmFileRepository {
    db: DatabaseConnection,
}

impl SeaOrmFileRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn owner_condition(owner_id: &str, filter: &ListFilter) -> Condition {
        let mut cond = Condition::all().add(files::Column::UserId.eq(owner_id));
        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", escape_like(&search.to_lowercase()));
            cond = cond.add(
                Expr::expr(Func::lower(Expr::col(files::Column::Filename)))
                    .like(LikeExpr::new(pattern).escape('\\')),
            );
        }
        cond
    }
}

/// Escapes LIKE wildcards so user input only ever matches literally.
fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[async_trait]
impl FileRepository for SeaOrmFileRepository {
    async fn create(
        &self,
        filename: &str,
        url: &str,
        object_key: &str,
        owner_id: &str,
    ) -> Result<FileRecord, DbErr> {
        files::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            filename: Set(filename.to_string()),
            url: Set(url.to_string()),
            object_key: Set(object_key.to_string()),
            user_id: Set(owner_id.to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(&self.db)
        .await
    }

    async fn find_owned(&self, id: &str, owner_id: &str) -> Result<Option<FileRecord>, DbErr> {
        Files::find_by_id(id)
            .filter(files::Column::UserId.eq(owner_id))
            .one(&self.db)
            .await
    }

    async fn update(&self, id: &str, changes: FileChanges) -> Result<FileRecord, DbErr> {
        let existing = Files::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("file {}", id)))?;

        let mut active: files::ActiveModel = existing.into();
        if let Some(filename) = changes.filename {
            active.filename = Set(filename);
        }
        if let Some(url) = changes.url {
            active.url = Set(url);
        }
        if let Some(object_key) = changes.object_key {
            active.object_key = Set(object_key);
        }
        active.update(&self.db).await
    }

    async fn delete(&self, id: &str) -> Result<(), DbErr> {
        let res = Files::delete_by_id(id).exec(&self.db).await?;
        if res.rows_affected == 0 {
            return Err(DbErr::RecordNotFound(format!("file {}", id)));
        }
        Ok(())
    }

    async fn list(
        &self,
        owner_id: &str,
        filter: &ListFilter,
        page: Page,
    ) -> Result<(Vec<FileRecord>, u64), DbErr> {
        let cond = Self::owner_condition(owner_id, filter);
        let limit = page.limit.max(1);

        let total = Files::find().filter(cond.clone()).count(&self.db).await?;
        // Past any representable row: nothing to fetch
        let Some(offset) = page
            .page
            .saturating_sub(1)
            .checked_mul(limit)
            .filter(|o| *o <= i64::MAX as u64)
        else {
            return Ok((Vec::new(), total));
        };
        let records = Files::find()
            .filter(cond)
            .order_by_desc(files::Column::CreatedAt)
            .offset(offset)
            .limit(limit)
            .all(&self.db)
            .await?;

        Ok((records, total))
    }

    async fn stats(&self, owner_id: &str) -> Result<FileStats, DbErr> {
        let total_files = Files::find()
            .filter(files::Column::UserId.eq(owner_id))
            .count(&self.db)
            .await?;
        let last = Files::find()
            .filter(files::Column::UserId.eq(owner_id))
            .order_by_desc(files::Column::CreatedAt)
            .one(&self.db)
            .await?;

        Ok(FileStats {
            total_files,
            last_upload: last.map(|f| f.created_at),
        })
    }

    async fn object_keys_present(&self, keys: &[String]) -> Result<HashSet<String>, DbErr> {
        let mut present = HashSet::new();
        for chunk in keys.chunks(500) {
            let found: Vec<String> = Files::find()
                .select_only()
                .column(files::Column::ObjectKey)
                .filter(files::Column::ObjectKey.is_in(chunk.iter().cloned()))
                .into_tuple()
                .all(&self.db)
                .await?;
            present.extend(found);
        }
        Ok(present)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like_neutralises_wildcards() {
        assert_eq!(escape_like("report"), "report");
        assert_eq!(escape_like("a_b"), "a\\_b");
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("c:\\tmp"), "c:\\\\tmp");
    }
}

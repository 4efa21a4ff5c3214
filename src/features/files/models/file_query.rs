use crate::features::files::models::FileRecord;
use crate::shared::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

/// Owner-scoped listing filter, independent of any query language.
///
/// - `keyword`: case-insensitive substring of the original name OR the description
/// - `category`: exact match
/// - `tags`: every token must be a case-insensitive substring of the stored tags
/// - pages are 1-indexed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileQuery {
    pub keyword: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub page: i64,
    pub page_size: i64,
}

impl Default for FileQuery {
    fn default() -> Self {
        Self {
            keyword: None,
            category: None,
            tags: Vec::new(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl FileQuery {
    /// Normalize raw request values: blank strings count as absent, and a
    /// missing or non-positive page / page size takes its default
    pub fn new(
        keyword: Option<&str>,
        category: Option<&str>,
        tags: Option<&str>,
        page: Option<i64>,
        page_size: Option<i64>,
    ) -> Self {
        Self {
            keyword: non_blank(keyword),
            category: non_blank(category),
            tags: tags.map(split_tags).unwrap_or_default(),
            page: page.filter(|p| *p > 0).unwrap_or(1),
            page_size: page_size
                .filter(|s| *s > 0)
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .min(MAX_PAGE_SIZE),
        }
    }

    /// Rows to skip; saturates for absurdly large page numbers
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit())
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    /// Reference semantics of the filter for a single record (ownership and
    /// soft-delete are checked separately by the store)
    pub fn matches(&self, record: &FileRecord) -> bool {
        if let Some(keyword) = &self.keyword {
            let keyword = keyword.to_lowercase();
            let in_name = record.original_name.to_lowercase().contains(&keyword);
            let in_description = record
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&keyword));
            if !in_name && !in_description {
                return false;
            }
        }

        if let Some(category) = &self.category {
            if record.category.as_deref() != Some(category.as_str()) {
                return false;
            }
        }

        if !self.tags.is_empty() {
            let stored = match record.tags.as_deref() {
                Some(stored) => stored.to_lowercase(),
                None => return false,
            };
            if !self
                .tags
                .iter()
                .all(|tag| stored.contains(&tag.to_lowercase()))
            {
                return false;
            }
        }

        true
    }
}

/// Split a comma-separated tag string into trimmed, non-empty tokens
pub fn split_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

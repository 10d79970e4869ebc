use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sea_orm::prelude::Expr;
use sea_orm::sea_query::{ExprTrait, Func, LikeExpr, Query as SeaQuery};
use sea_orm::{ColumnTrait, Order, QueryFilter, Select};

use crate::config::SearchConfig;
use crate::entity::{content_blob, file_reference};
use crate::services::ServiceError;

/// Filters accepted by catalog searches. Every field narrows the result; an
/// all-default filter matches every reference.
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    /// Case-insensitive substring of the filename.
    pub search: Option<String>,
    /// Declared media types, OR-ed together.
    pub file_types: Vec<String>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub uploaded_from: Option<DateTime<Utc>>,
    pub uploaded_to: Option<DateTime<Utc>>,
    /// Keep only references whose content is shared by more than one upload.
    pub duplicates_only: bool,
}

impl FileFilter {
    pub fn duplicates() -> Self {
        Self {
            duplicates_only: true,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if let (Some(min), Some(max)) = (self.min_size, self.max_size)
            && min > max
        {
            return Err(ServiceError::Validation(format!(
                "min_size ({min}) must not exceed max_size ({max})"
            )));
        }
        if let (Some(from), Some(to)) = (self.uploaded_from, self.uploaded_to)
            && from > to
        {
            return Err(ServiceError::Validation(
                "uploaded_from must not be later than uploaded_to".into(),
            ));
        }
        Ok(())
    }

    /// Normalized search term, `None` when blank.
    fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(file_reference::normalize_filename)
            .filter(|term| !term.is_empty())
    }

    /// Narrow `query` by every set field.
    pub fn apply(&self, mut query: Select<file_reference::Entity>) -> Select<file_reference::Entity> {
        if let Some(term) = self.search_term() {
            let pattern = format!("%{}%", escape_like(&term));
            query = query.filter(
                Expr::expr(Func::lower(Expr::col(
                    file_reference::Column::FilenameNormalized,
                )))
                .like(LikeExpr::new(pattern).escape('\\')),
            );
        }

        let file_types: Vec<&str> = self
            .file_types
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();
        if !file_types.is_empty() {
            query = query.filter(file_reference::Column::FileType.is_in(file_types));
        }

        if let Some(min) = self.min_size {
            query = query.filter(file_reference::Column::Size.gte(clamp_size(min)));
        }
        if let Some(max) = self.max_size {
            query = query.filter(file_reference::Column::Size.lte(clamp_size(max)));
        }
        if let Some(from) = self.uploaded_from {
            query = query.filter(file_reference::Column::UploadedAt.gte(from));
        }
        if let Some(to) = self.uploaded_to {
            query = query.filter(file_reference::Column::UploadedAt.lte(to));
        }

        if self.duplicates_only {
            query = query.filter(
                file_reference::Column::ContentHash.in_subquery(
                    SeaQuery::select()
                        .column(content_blob::Column::ContentHash)
                        .from(content_blob::Entity)
                        .and_where(content_blob::Column::ReferenceCount.gt(1))
                        .to_owned(),
                ),
            );
        }

        query
    }
}

fn clamp_size(size: u64) -> i64 {
    i64::try_from(size).unwrap_or(i64::MAX)
}

/// Escape LIKE wildcard characters in a search string.
pub fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Sortable reference attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    UploadedAt,
    OriginalFilename,
    Size,
    FileType,
}

impl SortField {
    fn as_str(self) -> &'static str {
        match self {
            SortField::UploadedAt => "uploaded_at",
            SortField::OriginalFilename => "original_filename",
            SortField::Size => "size",
            SortField::FileType => "file_type",
        }
    }

    fn column(self) -> file_reference::Column {
        match self {
            SortField::UploadedAt => file_reference::Column::UploadedAt,
            SortField::OriginalFilename => file_reference::Column::OriginalFilename,
            SortField::Size => file_reference::Column::Size,
            SortField::FileType => file_reference::Column::FileType,
        }
    }
}

/// Sort order for searches, written `field` or `-field` for descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: SortField,
    pub descending: bool,
}

impl SortKey {
    pub fn column(&self) -> file_reference::Column {
        self.field.column()
    }

    pub fn order(&self) -> Order {
        if self.descending {
            Order::Desc
        } else {
            Order::Asc
        }
    }

    /// Parse an optional sort parameter; blank means the default.
    pub fn parse_or_default(raw: Option<&str>) -> Result<Self, ServiceError> {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => s.parse(),
            None => Ok(Self::default()),
        }
    }
}

impl Default for SortKey {
    /// Newest first.
    fn default() -> Self {
        Self {
            field: SortField::UploadedAt,
            descending: true,
        }
    }
}

impl FromStr for SortKey {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (descending, name) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let field = match name {
            "uploaded_at" => SortField::UploadedAt,
            "original_filename" | "filename" => SortField::OriginalFilename,
            "size" => SortField::Size,
            "file_type" => SortField::FileType,
            other => {
                return Err(ServiceError::Validation(format!(
                    "Unknown sort key '{other}'; expected one of uploaded_at, original_filename, size, file_type"
                )));
            }
        };
        Ok(Self { field, descending })
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.descending {
            f.write_str("-")?;
        }
        f.write_str(self.field.as_str())
    }
}

/// A validated 1-based page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub per_page: u64,
}

impl PageRequest {
    /// Resolve optional paging parameters against the configured bounds.
    /// Page 0 is rejected; the page size is clamped.
    pub fn resolve(
        page: Option<u64>,
        page_size: Option<u64>,
        config: &SearchConfig,
    ) -> Result<Self, ServiceError> {
        let page = page.unwrap_or(1);
        if page == 0 {
            return Err(ServiceError::Validation("page must be at least 1".into()));
        }
        let max = Ord::max(config.max_page_size, 1);
        let per_page = page_size
            .unwrap_or(config.default_page_size)
            .clamp(1, max);
        Ok(Self { page, per_page })
    }

    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.per_page)
    }
}

/// One page of results plus the metadata needed to walk the rest.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total: u64) -> Self {
        let total_pages = total.div_ceil(request.per_page);
        Self {
            items,
            page: request.page,
            per_page: request.per_page,
            total,
            total_pages,
            has_next: request.page < total_pages,
            has_previous: request.page > 1,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total: self.total,
            total_pages: self.total_pages,
            has_next: self.has_next,
            has_previous: self.has_previous,
        }
    }
}

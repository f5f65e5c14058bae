//! List query planning: pagination clamps, filters and allow-listed sorting
//!
//! Raw query-string values never reach SQL text. Sort columns come from
//! [`SortField::column`], a closed set; filters are bound as parameters.

use std::collections::HashMap;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("parameter `{0}` is not an integer")]
    InvalidNumber(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    Id,
    Name,
    CreatedAt,
    UpdatedAt,
}

impl SortField {
    /// Unknown or absent names fall back to `id`
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("name") => SortField::Name,
            Some("created_at") => SortField::CreatedAt,
            Some("updated_at") => SortField::UpdatedAt,
            _ => SortField::Id,
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            SortField::Id => "id",
            SortField::Name => "name",
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    /// Case-insensitive; anything but `asc` means descending
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(s) if s.trim().eq_ignore_ascii_case("asc") => SortOrder::Asc,
            _ => SortOrder::Desc,
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Raw `/api/list` parameters as they arrive on the query string
#[derive(Debug, Clone, Default)]
pub struct ListParams {
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub keyword: Option<String>,
    pub method: Option<String>,
    pub sort_field: Option<String>,
    pub sort_order: Option<String>,
}

impl ListParams {
    pub fn from_query(params: &HashMap<String, String>) -> Self {
        let get = |k: &str| params.get(k).cloned();
        Self {
            page: get("page"),
            page_size: get("pageSize"),
            keyword: get("keyword"),
            method: get("method"),
            sort_field: get("sortField"),
            sort_order: get("sortOrder"),
        }
    }
}

/// Sanitized list plan handed to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub page: i64,
    pub page_size: i64,
    /// Lower-cased substring matched against `name` or `url`
    pub keyword: Option<String>,
    /// Upper-cased exact match on `method`
    pub method: Option<String>,
    pub sort_field: SortField,
    pub sort_order: SortOrder,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            keyword: None,
            method: None,
            sort_field: SortField::default(),
            sort_order: SortOrder::default(),
        }
    }
}

pub struct QueryBuilder;

impl QueryBuilder {
    /// Normalize raw parameters into a bounded plan
    pub fn build(params: &ListParams) -> Result<ListQuery, QueryError> {
        let page = match parse_int(params.page.as_deref(), "page")? {
            Some(p) if p >= 1 => p,
            _ => 1,
        };
        let page_size = match parse_int(params.page_size.as_deref(), "pageSize")? {
            Some(s) if (1..=MAX_PAGE_SIZE).contains(&s) => s,
            _ => DEFAULT_PAGE_SIZE,
        };

        Ok(ListQuery {
            page,
            page_size,
            keyword: params
                .keyword
                .as_deref()
                .filter(|k| !k.is_empty())
                .map(|k| k.to_ascii_lowercase()),
            method: non_blank(params.method.as_deref()).map(|m| m.to_ascii_uppercase()),
            sort_field: SortField::parse(params.sort_field.as_deref()),
            sort_order: SortOrder::parse(params.sort_order.as_deref()),
        })
    }
}

impl ListQuery {
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    /// ceil(total / page_size)
    pub fn total_pages(&self, total: i64) -> i64 {
        if total <= 0 {
            return 0;
        }
        (total + self.page_size - 1) / self.page_size
    }
}

fn parse_int(raw: Option<&str>, field: &'static str) -> Result<Option<i64>, QueryError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s
            .parse::<i64>()
            .map(Some)
            .map_err(|_| QueryError::InvalidNumber(field)),
    }
}

fn non_blank(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

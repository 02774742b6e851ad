// handlers/protected/records/query.rs - search, ordering and pagination for list endpoints

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ApiConfig;
use crate::database::models::Record;
use crate::error::ApiError;
use crate::resources::Resource;

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub search: Option<String>,
    /// `field` ascending, `-field` descending
    #[serde(default)]
    pub ordering: Option<String>,
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub page_size: Option<String>,
}

/// Paginated body returned when `page` is supplied
#[derive(Debug, Serialize)]
pub struct Page {
    pub count: usize,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<Value>,
}

impl ListQuery {
    /// Requested page number; `None` means an unpaginated list
    pub fn page_number(&self) -> Result<Option<usize>, ApiError> {
        match self.page.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            None => Ok(None),
            Some("last") => Ok(Some(usize::MAX)),
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n >= 1 => Ok(Some(n)),
                _ => Err(ApiError::not_found("Invalid page.")),
            },
        }
    }

    pub fn page_size(&self, api: &ApiConfig) -> usize {
        self.page_size
            .as_deref()
            .and_then(|s| s.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
            .map(|n| n.min(api.max_page_size))
            .unwrap_or(api.default_page_size)
    }

    /// Access is logged once per listing, not for every page
    pub fn is_first_page(&self) -> bool {
        matches!(self.page_number(), Ok(None) | Ok(Some(1)))
    }
}

/// Case-insensitive substring match over the resource's search fields
pub fn matches_search(resource: Resource, record: &Record, term: Option<&str>) -> bool {
    let Some(term) = term.map(str::trim).filter(|t| !t.is_empty()) else {
        return true;
    };
    let term = term.to_lowercase();
    resource.search_fields().iter().any(|field| {
        record
            .str_field(field)
            .map(|v| v.to_lowercase().contains(&term))
            .unwrap_or(false)
    })
}

fn sort_value(record: &Record, field: &str) -> Value {
    match field {
        "id" => Value::from(record.id),
        "data_criacao" => Value::String(record.created_at.to_rfc3339()),
        "data_atualizacao" => Value::String(record.updated_at.to_rfc3339()),
        other => record.field(other).cloned().unwrap_or(Value::Null),
    }
}

/// Nulls sort first; numbers numerically; everything else by its text
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .unwrap_or_default()
            .partial_cmp(&y.as_f64().unwrap_or_default())
            .unwrap_or(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// Sort by a comma-separated ordering expression; ties break on id
pub fn sort_records(records: &mut [Record], ordering: &str) {
    let keys: Vec<(&str, bool)> = ordering
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(|k| match k.strip_prefix('-') {
            Some(field) => (field, true),
            None => (k, false),
        })
        .collect();

    records.sort_by(|a, b| {
        for (field, desc) in &keys {
            let ord = compare_values(&sort_value(a, field), &sort_value(b, field));
            let ord = if *desc { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.id.cmp(&b.id)
    });
}

fn page_link(resource: Resource, query: &ListQuery, page: usize, page_size: usize) -> String {
    let mut params = url::form_urlencoded::Serializer::new(String::new());
    params.append_pair("page", &page.to_string());
    params.append_pair("page_size", &page_size.to_string());
    if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
        params.append_pair("search", search);
    }
    if let Some(ordering) = query.ordering.as_deref().filter(|s| !s.is_empty()) {
        params.append_pair("ordering", ordering);
    }
    format!("/{}/?{}", resource.path(), params.finish())
}

/// Slice one page out of the full result set
pub fn paginate(
    resource: Resource,
    query: &ListQuery,
    items: Vec<Value>,
    page: usize,
    page_size: usize,
) -> Result<Page, ApiError> {
    let count = items.len();
    let pages = count.div_ceil(page_size).max(1);
    let page = if page == usize::MAX { pages } else { page };
    if page > pages {
        return Err(ApiError::not_found("Invalid page."));
    }

    let results = items
        .into_iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .collect();

    Ok(Page {
        count,
        next: (page < pages).then(|| page_link(resource, query, page + 1, page_size)),
        previous: (page > 1).then(|| page_link(resource, query, page - 1, page_size)),
        results,
    })
}

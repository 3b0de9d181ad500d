//! Collection query & filter engine for the live consumption path.
//!
//! Filters compose by conjunction and apply in a fixed order: date range,
//! then category, then author, then free-text search, with the result
//! limit applied last so truncation never hides matching items. Items
//! missing a field required by an active filter are excluded by that
//! filter, not treated as an error.

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::normalize::CanonicalItem;

/// Optional predicate bundle for collection queries. Absence of a field
/// means "no constraint".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionFilter {
    pub limit: Option<usize>,
    /// Inclusive lower bound on the item timestamp.
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the item timestamp.
    pub until: Option<DateTime<Utc>>,
    pub category: Option<String>,
    pub author: Option<String>,
    /// Free-text substring match across title and description.
    pub search: Option<String>,
}

/// Single-item lookup filter. At least one field must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryFilter {
    pub id: Option<String>,
    pub url: Option<String>,
}

/// Strip HTML tags and collapse whitespace so substring matching works on
/// visible text rather than markup.
fn plain_text(s: &str) -> String {
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());

    let decoded = html_escape::decode_html_entities(s);
    let stripped = re_tags.replace_all(&decoded, " ");
    re_ws.replace_all(&stripped, " ").trim().to_string()
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// The item timestamp the date-range filter applies to: `published`,
/// falling back to `updated`.
fn item_timestamp(item: &CanonicalItem) -> Option<DateTime<Utc>> {
    item.published.or(item.updated)
}

/// Apply a collection filter. Delivery order is preserved; `limit`
/// truncates the already-filtered sequence.
pub fn filter_collection(items: Vec<CanonicalItem>, filter: &CollectionFilter) -> Vec<CanonicalItem> {
    let mut filtered: Vec<CanonicalItem> = items
        .into_iter()
        .filter(|item| {
            if filter.since.is_some() || filter.until.is_some() {
                let Some(ts) = item_timestamp(item) else {
                    return false;
                };
                if filter.since.is_some_and(|since| ts < since) {
                    return false;
                }
                if filter.until.is_some_and(|until| ts > until) {
                    return false;
                }
            }

            if let Some(category) = filter.category.as_deref() {
                if !item.categories.iter().any(|c| contains_ci(c, category)) {
                    return false;
                }
            }

            if let Some(author) = filter.author.as_deref() {
                match item.author.as_deref() {
                    Some(a) if contains_ci(a, author) => {}
                    _ => return false,
                }
            }

            if let Some(search) = filter.search.as_deref() {
                let title = item.title.as_deref().map(plain_text).unwrap_or_default();
                let description = item
                    .description
                    .as_deref()
                    .map(plain_text)
                    .unwrap_or_default();
                if !contains_ci(&title, search) && !contains_ci(&description, search) {
                    return false;
                }
            }

            true
        })
        .collect();

    if let Some(limit) = filter.limit {
        filtered.truncate(limit);
    }
    filtered
}

/// Find one item by exact id, falling back to exact URL. An id lookup
/// also matches an item whose URL equals the requested id, since some
/// feeds use the permalink as the identifier.
///
/// "No such entry" is an expected, recoverable outcome: `Ok(None)`, not
/// an error. An empty filter is a caller mistake and yields
/// [`SyncError::Configuration`].
pub fn find_entry<'a>(
    items: &'a [CanonicalItem],
    filter: &EntryFilter,
) -> Result<Option<&'a CanonicalItem>, SyncError> {
    if filter.id.is_none() && filter.url.is_none() {
        return Err(SyncError::configuration(
            "entry filter must set at least one of `id` or `url`",
        ));
    }

    if let Some(id) = filter.id.as_deref() {
        let hit = items
            .iter()
            .find(|i| i.id == id || i.url.as_deref() == Some(id));
        if hit.is_some() {
            return Ok(hit);
        }
    }

    if let Some(url) = filter.url.as_deref() {
        return Ok(items.iter().find(|i| i.url.as_deref() == Some(url)));
    }

    Ok(None)
}

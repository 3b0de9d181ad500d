//! Canonical normalization pipeline.
//!
//! Raw source records arrive as loosely-typed JSON maps. Each one gets an
//! identifier picked from source-specific candidate fields in priority
//! order, is validated and coerced into a [`CanonicalItem`] through a
//! schema-bound parse seam, and gains a rendered-HTML projection.
//! Records with no usable identifier are skipped with a warning — a
//! partial feed must not abort a whole sync over one bad record.

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc2822;
use time::OffsetDateTime;

use crate::error::SyncError;

/// Source-specific, untyped payload as handed over by the wire layer.
pub type RawRecord = serde_json::Value;

/// The normalized, schema-validated representation used uniformly by
/// consumers regardless of source. `id` is always non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalItem {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Short summary text.
    #[serde(default)]
    pub description: Option<String>,
    /// Full body, richer than `description` when both exist.
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub published: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
}

impl CanonicalItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            url: None,
            description: None,
            content: None,
            author: None,
            categories: Vec::new(),
            published: None,
            updated: None,
        }
    }
}

/// Deprecated, field-renamed projection of a [`CanonicalItem`] kept for
/// backward compatibility. Pure function of the canonical shape; fields
/// with no legacy analogue are omitted, never fabricated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyItem {
    pub guid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Legacy name for the full body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Legacy name for the short summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub categories: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pubdate: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
}

impl LegacyItem {
    /// Project a canonical item into the legacy shape. Idempotent and
    /// lossless with respect to every legacy field it declares.
    pub fn project(item: &CanonicalItem) -> Self {
        Self {
            guid: item.id.clone(),
            title: item.title.clone(),
            link: item.url.clone(),
            description: item.content.clone(),
            summary: item.description.clone(),
            author: item.author.clone(),
            categories: item.categories.clone(),
            pubdate: item.published,
            date: item.updated,
        }
    }
}

/// Schema-bound parse seam. The host validates field types, coerces
/// dates, and rejects the record when required fields are absent or
/// mistyped. [`SchemaParser`] is the default implementation.
pub trait ParseData: Send + Sync {
    fn parse(&self, id: &str, raw: &RawRecord) -> Result<CanonicalItem, SyncError>;
}

/// Default serde-backed parser: deserializes the raw map into the
/// canonical shape and coerces string timestamps (RFC 3339 or RFC 2822).
pub struct SchemaParser {
    pub source_url: String,
}

impl SchemaParser {
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawFields {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    published: Option<String>,
    #[serde(default)]
    updated: Option<String>,
}

impl ParseData for SchemaParser {
    fn parse(&self, id: &str, raw: &RawRecord) -> Result<CanonicalItem, SyncError> {
        let fields: RawFields = serde_json::from_value(raw.clone()).map_err(|e| {
            SyncError::validation_detailed(&self.source_url, "record failed validation", e.to_string())
        })?;

        Ok(CanonicalItem {
            id: id.to_string(),
            title: fields.title,
            url: fields.url,
            description: fields.description,
            content: fields.content,
            author: fields.author,
            categories: fields.categories,
            published: fields.published.as_deref().and_then(coerce_datetime),
            updated: fields.updated.as_deref().and_then(coerce_datetime),
        })
    }
}

/// Parse a timestamp string as RFC 3339, falling back to RFC 2822 (the
/// common RSS `pubDate` format). Unparseable values coerce to `None`.
pub fn coerce_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    OffsetDateTime::parse(s, &Rfc2822)
        .ok()
        .and_then(|dt| DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), 0))
}

/// Pick the record identifier from candidate values in fixed priority
/// order: the first non-empty candidate wins.
pub fn select_identifier<'a>(candidates: &[Option<&'a str>]) -> Option<&'a str> {
    candidates
        .iter()
        .flatten()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
}

/// Rendered-HTML projection: the richest available text field, in a fixed
/// fallback order — content body, else summary/description, else empty.
/// Downstream consumers depend on this order.
pub fn rendered_html(item: &CanonicalItem) -> String {
    item.content
        .clone()
        .or_else(|| item.description.clone())
        .unwrap_or_default()
}

/// How a source names its identifier fields, in priority order, e.g.
/// `["guid", "link"]` for RSS.
#[derive(Debug, Clone)]
pub struct IdentifierPolicy {
    pub fields: Vec<&'static str>,
}

impl IdentifierPolicy {
    pub fn new(fields: &[&'static str]) -> Self {
        Self {
            fields: fields.to_vec(),
        }
    }

    /// Resolve the identifier for a raw record, or `None` if no candidate
    /// field carries a usable value.
    pub fn resolve<'a>(&self, raw: &'a RawRecord) -> Option<&'a str> {
        let candidates: Vec<Option<&str>> = self
            .fields
            .iter()
            .map(|f| raw.get(f).and_then(|v| v.as_str()))
            .collect();
        select_identifier(&candidates)
    }
}

/// Run a batch of raw records through the pipeline. Records without an
/// identifier are dropped with a warning; records that fail schema
/// validation are likewise skipped so one bad record cannot abort the
/// sync. Delivery order is preserved.
pub fn normalize_records(
    source_url: &str,
    ids: &IdentifierPolicy,
    parser: &dyn ParseData,
    raws: &[RawRecord],
) -> Vec<CanonicalItem> {
    let mut out = Vec::with_capacity(raws.len());
    for raw in raws {
        let Some(id) = ids.resolve(raw) else {
            tracing::warn!(source = source_url, "record has no identifier, skipping");
            counter!("sync_records_skipped_total").increment(1);
            continue;
        };
        match parser.parse(id, raw) {
            Ok(item) => out.push(item),
            Err(e) => {
                tracing::warn!(error = ?e, source = source_url, id, "record failed validation, skipping");
                counter!("sync_records_skipped_total").increment(1);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parser() -> SchemaParser {
        SchemaParser::new("https://example.test/feed")
    }

    #[test]
    fn identifier_priority_order_is_fixed() {
        let ids = IdentifierPolicy::new(&["guid", "link"]);
        let both = json!({ "guid": "g1", "link": "https://example.test/a" });
        let link_only = json!({ "link": "https://example.test/a" });
        let neither = json!({ "title": "no id here" });
        assert_eq!(ids.resolve(&both), Some("g1"));
        assert_eq!(ids.resolve(&link_only), Some("https://example.test/a"));
        assert_eq!(ids.resolve(&neither), None);
    }

    #[test]
    fn blank_identifier_candidates_are_skipped() {
        let ids = IdentifierPolicy::new(&["guid", "link"]);
        let raw = json!({ "guid": "  ", "link": "https://example.test/b" });
        assert_eq!(ids.resolve(&raw), Some("https://example.test/b"));
    }

    #[test]
    fn record_without_identifier_is_dropped_not_an_error() {
        let ids = IdentifierPolicy::new(&["guid"]);
        let raws = vec![
            json!({ "guid": "a", "title": "A" }),
            json!({ "title": "no id" }),
            json!({ "guid": "b", "title": "B" }),
        ];
        let items = normalize_records("https://example.test/feed", &ids, &parser(), &raws);
        assert_eq!(
            items.iter().map(|i| i.id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
    }

    #[test]
    fn dates_are_coerced_from_rfc2822_and_rfc3339() {
        let rfc2822 = coerce_datetime("Wed, 01 Jan 2025 12:00:00 GMT").unwrap();
        let rfc3339 = coerce_datetime("2025-01-01T12:00:00Z").unwrap();
        assert_eq!(rfc2822, rfc3339);
        assert!(coerce_datetime("not a date").is_none());
    }

    #[test]
    fn rendered_html_fallback_order_is_content_then_description() {
        let mut item = CanonicalItem::new("x");
        assert_eq!(rendered_html(&item), "");
        item.description = Some("<p>summary</p>".to_string());
        assert_eq!(rendered_html(&item), "<p>summary</p>");
        item.content = Some("<article>body</article>".to_string());
        assert_eq!(rendered_html(&item), "<article>body</article>");
    }

    #[test]
    fn legacy_projection_is_lossless_and_omits_absent_fields() {
        let item = CanonicalItem {
            id: "g1".to_string(),
            title: Some("Title".to_string()),
            url: Some("https://example.test/a".to_string()),
            description: Some("short".to_string()),
            content: Some("<p>long</p>".to_string()),
            author: None,
            categories: vec!["tech".to_string()],
            published: coerce_datetime("2025-01-01T12:00:00Z"),
            updated: None,
        };
        let legacy = LegacyItem::project(&item);
        assert_eq!(legacy.guid, item.id);
        assert_eq!(legacy.link, item.url);
        assert_eq!(legacy.description, item.content);
        assert_eq!(legacy.summary, item.description);
        assert_eq!(legacy.pubdate, item.published);

        // Absent fields stay absent in the serialized legacy shape.
        let json = serde_json::to_value(&legacy).unwrap();
        assert!(json.get("author").is_none());
        assert!(json.get("date").is_none());
    }

    #[test]
    fn legacy_projection_is_idempotent() {
        let item = CanonicalItem::new("g1");
        assert_eq!(LegacyItem::project(&item), LegacyItem::project(&item));
    }

    #[test]
    fn schema_parser_rejects_mistyped_fields() {
        let raw = json!({ "title": 42 });
        let err = parser().parse("a", &raw).unwrap_err();
        assert!(matches!(err, SyncError::Validation { .. }));
    }
}

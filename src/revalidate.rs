//! Conditional HTTP revalidation.
//!
//! Validators from a prior run (`ETag`, `Last-Modified`) are turned into
//! `If-None-Match` / `If-Modified-Since` request headers so an unchanged
//! upstream answers 304 and the sync short-circuits. At most one validator
//! is authoritative per run: ETag wins when both are stored.
//!
//! When a caller has no meta store (stateless call sites), none of this
//! applies: no headers are added and responses are never treated as
//! cacheable.

use reqwest::header::{HeaderMap, HeaderValue, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};

use crate::store::MetaStore;

/// Meta-store keys the validators are persisted under.
pub const META_ETAG: &str = "etag";
pub const META_LAST_MODIFIED: &str = "last-modified";

/// Validators persisted from the prior successful fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheValidators {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl CacheValidators {
    pub fn load(meta: &dyn MetaStore) -> Self {
        Self {
            etag: meta.get(META_ETAG),
            last_modified: meta.get(META_LAST_MODIFIED),
        }
    }
}

/// Build request headers for a conditional fetch. Sets `If-None-Match`
/// when an ETag is stored, else `If-Modified-Since` when a Last-Modified
/// value is stored, else adds nothing.
pub fn conditional_headers(meta: Option<&dyn MetaStore>, base: HeaderMap) -> HeaderMap {
    let mut headers = base;
    let Some(meta) = meta else {
        return headers;
    };
    let stored = CacheValidators::load(meta);
    if let Some(etag) = stored.etag.as_deref() {
        if let Ok(v) = HeaderValue::from_str(etag) {
            headers.insert(IF_NONE_MATCH, v);
        }
    } else if let Some(lm) = stored.last_modified.as_deref() {
        if let Ok(v) = HeaderValue::from_str(lm) {
            headers.insert(IF_MODIFIED_SINCE, v);
        }
    }
    headers
}

/// Persist validators from a successful (200-class) response. Both stored
/// fields are deleted first; then ETag is written if the response carries
/// one, else Last-Modified if present. If neither is present the
/// validators stay cleared and the next sync fetches unconditionally.
pub fn store_validators(meta: &mut dyn MetaStore, response_headers: &HeaderMap) {
    let etag = header_str(response_headers, ETAG.as_str());
    let last_modified = header_str(response_headers, LAST_MODIFIED.as_str());

    meta.delete(META_ETAG);
    meta.delete(META_LAST_MODIFIED);

    if let Some(etag) = etag {
        meta.set(META_ETAG, etag);
    } else if let Some(lm) = last_modified {
        meta.set(META_LAST_MODIFIED, lm);
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryMetaStore;

    #[test]
    fn no_meta_store_adds_nothing() {
        let headers = conditional_headers(None, HeaderMap::new());
        assert!(headers.is_empty());
    }

    #[test]
    fn etag_takes_precedence_over_last_modified() {
        let mut meta = MemoryMetaStore::new();
        meta.set(META_ETAG, "\"v1\"".to_string());
        meta.set(META_LAST_MODIFIED, "Wed, 01 Jan 2025 00:00:00 GMT".to_string());

        let headers = conditional_headers(Some(&meta), HeaderMap::new());
        assert_eq!(headers.get(IF_NONE_MATCH).unwrap(), "\"v1\"");
        assert!(headers.get(IF_MODIFIED_SINCE).is_none());
    }

    #[test]
    fn last_modified_used_when_no_etag() {
        let mut meta = MemoryMetaStore::new();
        meta.set(META_LAST_MODIFIED, "Wed, 01 Jan 2025 00:00:00 GMT".to_string());

        let headers = conditional_headers(Some(&meta), HeaderMap::new());
        assert!(headers.get(IF_NONE_MATCH).is_none());
        assert_eq!(
            headers.get(IF_MODIFIED_SINCE).unwrap(),
            "Wed, 01 Jan 2025 00:00:00 GMT"
        );
    }

    #[test]
    fn base_headers_pass_through() {
        let mut base = HeaderMap::new();
        base.insert("x-custom", HeaderValue::from_static("1"));
        let meta = MemoryMetaStore::new();
        let headers = conditional_headers(Some(&meta), base);
        assert_eq!(headers.get("x-custom").unwrap(), "1");
    }

    #[test]
    fn store_prefers_etag_and_clears_stale_values() {
        let mut meta = MemoryMetaStore::new();
        meta.set(META_LAST_MODIFIED, "stale".to_string());

        let mut resp = HeaderMap::new();
        resp.insert(ETAG, HeaderValue::from_static("\"v2\""));
        resp.insert(
            LAST_MODIFIED,
            HeaderValue::from_static("Thu, 02 Jan 2025 00:00:00 GMT"),
        );
        store_validators(&mut meta, &resp);

        assert_eq!(meta.get(META_ETAG).as_deref(), Some("\"v2\""));
        // Only one validator is authoritative; Last-Modified must not survive.
        assert!(meta.get(META_LAST_MODIFIED).is_none());
    }

    #[test]
    fn store_with_no_validators_leaves_both_cleared() {
        let mut meta = MemoryMetaStore::new();
        meta.set(META_ETAG, "\"old\"".to_string());
        store_validators(&mut meta, &HeaderMap::new());
        assert!(meta.get(META_ETAG).is_none());
        assert!(meta.get(META_LAST_MODIFIED).is_none());
    }
}

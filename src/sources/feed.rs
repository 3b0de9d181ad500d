//! RSS feed source.
//!
//! The reference implementation of the loader surface: a wholesale feed
//! with conditional revalidation and no pagination (RSS feeds revalidate
//! as a unit rather than incrementally). Parsing covers the RSS 2.0
//! elements the canonical schema consumes; anything else is ignored.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use quick_xml::de::from_str;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::json;

use crate::error::SyncError;
use crate::fetch::{fetch_conditional, FetchOutcome, ReqwestTransport, Transport};
use crate::filter::{filter_collection, find_entry, CollectionFilter, EntryFilter};
use crate::normalize::{normalize_records, CanonicalItem, IdentifierPolicy, RawRecord, SchemaParser};
use crate::revalidate::store_validators;
use crate::sync::{
    replace_entries, sync_not_modified, sync_started, Loader, SyncContext, SyncOutcome,
};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<Guid>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    // quick-xml strips namespace prefixes, so `<content:encoded>` and
    // `<dc:creator>` arrive under their local names.
    #[serde(rename = "encoded")]
    content: Option<String>,
    author: Option<String>,
    #[serde(rename = "creator")]
    creator: Option<String>,
    #[serde(rename = "category", default)]
    categories: Vec<String>,
}

/// `<guid>` may carry an `isPermaLink` attribute; only the text matters.
#[derive(Debug, Deserialize)]
struct Guid {
    #[serde(rename = "$text")]
    value: Option<String>,
}

pub struct FeedLoaderOptions {
    /// URL of the feed.
    pub url: String,
    /// Extra headers for the fetch request.
    pub request_headers: HeaderMap,
    /// Store entries in the deprecated field-renamed shape.
    pub legacy: bool,
}

impl FeedLoaderOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            request_headers: HeaderMap::new(),
            legacy: false,
        }
    }
}

pub struct FeedLoader {
    options: FeedLoaderOptions,
    transport: Arc<dyn Transport>,
    ids: IdentifierPolicy,
}

impl FeedLoader {
    pub fn new(options: FeedLoaderOptions) -> Result<Self, SyncError> {
        Self::with_transport(options, Arc::new(ReqwestTransport::default()))
    }

    /// Construct with an explicit transport. Used by tests and hosts that
    /// share a client.
    pub fn with_transport(
        options: FeedLoaderOptions,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, SyncError> {
        if options.url.trim().is_empty() {
            return Err(SyncError::configuration("feed url is required"));
        }
        if options.legacy {
            tracing::warn!(
                url = %options.url,
                "legacy mode is deprecated and will be removed in a future version"
            );
        }
        Ok(Self {
            options,
            transport,
            ids: IdentifierPolicy::new(&["guid", "url"]),
        })
    }

    fn parse_feed(&self, body: &str) -> Result<Vec<RawRecord>, SyncError> {
        let xml = scrub_html_entities_for_xml(body);
        let rss: Rss = from_str(&xml).map_err(|e| {
            SyncError::validation_detailed(&self.options.url, "failed to parse feed", e.to_string())
        })?;

        Ok(rss
            .channel
            .items
            .into_iter()
            .map(|it| {
                json!({
                    "guid": it.guid.and_then(|g| g.value),
                    "title": it.title,
                    "url": it.link,
                    "description": it.description,
                    "content": it.content,
                    "author": it.author.or(it.creator),
                    "categories": it.categories,
                    "published": it.pub_date,
                })
            })
            .collect())
    }

    fn normalize(&self, raws: &[RawRecord]) -> Vec<CanonicalItem> {
        let parser = SchemaParser::new(&self.options.url);
        normalize_records(&self.options.url, &self.ids, &parser, raws)
    }

    /// Stateless fetch for the live path: no conditional headers, no
    /// validator persistence.
    async fn fetch_items(&self) -> Result<Vec<CanonicalItem>, SyncError> {
        let out = fetch_conditional(
            self.transport.as_ref(),
            &self.options.url,
            self.options.request_headers.clone(),
            None,
        )
        .await?;
        match out {
            FetchOutcome::Fetched { body, .. } => Ok(self.normalize(&self.parse_feed(&body)?)),
            FetchOutcome::NotModified => unreachable!("stateless fetch cannot yield 304"),
        }
    }
}

#[async_trait]
impl Loader for FeedLoader {
    fn name(&self) -> &'static str {
        "feed"
    }

    async fn sync(&self, ctx: &mut SyncContext<'_>) -> Result<SyncOutcome, SyncError> {
        sync_started(self.name());

        let fetched = fetch_conditional(
            self.transport.as_ref(),
            &self.options.url,
            self.options.request_headers.clone(),
            ctx.meta.as_deref(),
        )
        .await
        .inspect_err(|_| counter!("sync_errors_total").increment(1))?;

        let (body, response_headers) = match fetched {
            FetchOutcome::NotModified => {
                sync_not_modified(self.name());
                return Ok(SyncOutcome::NotModified);
            }
            FetchOutcome::Fetched { body, headers } => (body, headers),
        };

        let items = match self.parse_feed(&body) {
            Ok(raws) => self.normalize(&raws),
            Err(e) => {
                counter!("sync_errors_total").increment(1);
                tracing::error!(error = %e, url = %self.options.url, "feed sync failed");
                return Err(e);
            }
        };

        replace_entries(ctx.store, &items, self.options.legacy)?;

        // The sync is complete; only now may validators be persisted.
        if let Some(meta) = ctx.meta.as_deref_mut() {
            store_validators(meta, &response_headers);
        }

        tracing::info!(loader = self.name(), count = items.len(), "sync finished");
        Ok(SyncOutcome::Updated(items))
    }

    async fn collection(
        &self,
        filter: Option<&CollectionFilter>,
    ) -> Result<Vec<CanonicalItem>, SyncError> {
        let items = self.fetch_items().await?;
        match filter {
            Some(filter) => Ok(filter_collection(items, filter)),
            None => Ok(items),
        }
    }

    async fn entry(&self, filter: &EntryFilter) -> Result<Option<CanonicalItem>, SyncError> {
        let items = self.fetch_items().await?;
        Ok(find_entry(&items, filter)?.cloned())
    }
}

/// quick-xml rejects HTML entities that XML does not declare; feeds use
/// them anyway.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED_XML: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>Example</title>
    <item>
      <title>First post</title>
      <link>https://example.test/first</link>
      <guid isPermaLink="false">post-1</guid>
      <pubDate>Wed, 01 Jan 2025 12:00:00 GMT</pubDate>
      <description>Short summary</description>
      <content:encoded>&lt;p&gt;Full body&lt;/p&gt;</content:encoded>
      <dc:creator>Jane Example</dc:creator>
      <category>tech</category>
      <category>news</category>
    </item>
    <item>
      <title>No guid, link only</title>
      <link>https://example.test/second</link>
      <description>Second</description>
    </item>
    <item>
      <title>No identifier at all</title>
      <description>Dropped</description>
    </item>
  </channel>
</rss>"#;

    fn loader() -> FeedLoader {
        let transport = Arc::new(crate::fetch::FixtureTransport::ok(FEED_XML, HeaderMap::new()));
        FeedLoader::with_transport(FeedLoaderOptions::new("https://example.test/feed.xml"), transport)
            .unwrap()
    }

    #[test]
    fn empty_url_is_a_configuration_error_at_construction() {
        let err = FeedLoader::new(FeedLoaderOptions::new("")).err().unwrap();
        assert!(matches!(err, SyncError::Configuration { .. }));
    }

    #[tokio::test]
    async fn parses_and_normalizes_with_guid_priority_over_link() {
        let items = loader().collection(None).await.unwrap();
        assert_eq!(items.len(), 2);

        assert_eq!(items[0].id, "post-1");
        assert_eq!(items[0].author.as_deref(), Some("Jane Example"));
        assert_eq!(items[0].categories, vec!["tech", "news"]);
        assert_eq!(items[0].content.as_deref(), Some("<p>Full body</p>"));
        assert!(items[0].published.is_some());

        // Second item falls back to the link; third has no identifier
        // and is dropped.
        assert_eq!(items[1].id, "https://example.test/second");
    }

    #[tokio::test]
    async fn entry_lookup_distinguishes_not_found_from_errors() {
        let loader = loader();
        let found = loader
            .entry(&EntryFilter {
                id: Some("post-1".to_string()),
                url: None,
            })
            .await
            .unwrap();
        assert_eq!(found.unwrap().id, "post-1");

        let missing = loader
            .entry(&EntryFilter {
                id: Some("nonexistent".to_string()),
                url: None,
            })
            .await
            .unwrap();
        assert!(missing.is_none());

        let err = loader.entry(&EntryFilter::default()).await.unwrap_err();
        assert!(matches!(err, SyncError::Configuration { .. }));
    }

    #[tokio::test]
    async fn unparseable_body_aborts_with_a_validation_error() {
        let transport = Arc::new(crate::fetch::FixtureTransport::ok("not xml at all", HeaderMap::new()));
        let loader = FeedLoader::with_transport(
            FeedLoaderOptions::new("https://example.test/feed.xml"),
            transport,
        )
        .unwrap();
        let err = loader.collection(None).await.unwrap_err();
        assert!(matches!(err, SyncError::Validation { .. }));
    }
}

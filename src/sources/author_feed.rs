//! Cursor-paginated author feed source.
//!
//! Models the newest-first post feed of a single author behind a
//! cursor-paginated JSON API. Incremental sync is bounded by the
//! watermark (the newest post id from the prior completed run) instead
//! of HTTP revalidation: the API serves pages, not a cacheable document.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use reqwest::header::HeaderMap;
use serde::Deserialize;

use crate::error::SyncError;
use crate::fetch::{fetch_conditional, FetchOutcome, ReqwestTransport, Transport};
use crate::filter::{filter_collection, find_entry, CollectionFilter, EntryFilter};
use crate::normalize::{normalize_records, CanonicalItem, IdentifierPolicy, RawRecord, SchemaParser};
use crate::paginate::{paginate, Page, PageFetcher, PaginateOptions};
use crate::sync::{
    load_watermark, store_watermark, sync_started, upsert_entries, Loader, SyncContext,
    SyncOutcome,
};

/// One page as served by the API.
#[derive(Debug, Deserialize)]
struct PageBody {
    #[serde(default)]
    items: Vec<RawRecord>,
    #[serde(default)]
    cursor: Option<String>,
}

pub struct AuthorFeedOptions {
    /// Base URL of the feed endpoint.
    pub service_url: String,
    /// Author handle or DID the feed belongs to.
    pub identifier: String,
    /// Records requested per page.
    pub page_size: usize,
    /// Upper bound on records fetched in one run; `None` walks to
    /// exhaustion (or the watermark).
    pub max_records: Option<usize>,
}

impl AuthorFeedOptions {
    pub fn new(service_url: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            service_url: service_url.into(),
            identifier: identifier.into(),
            page_size: 100,
            max_records: None,
        }
    }
}

pub struct AuthorFeedLoader {
    options: AuthorFeedOptions,
    transport: Arc<dyn Transport>,
    ids: IdentifierPolicy,
}

impl AuthorFeedLoader {
    pub fn new(options: AuthorFeedOptions) -> Result<Self, SyncError> {
        Self::with_transport(options, Arc::new(ReqwestTransport::default()))
    }

    pub fn with_transport(
        options: AuthorFeedOptions,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, SyncError> {
        if options.service_url.trim().is_empty() {
            return Err(SyncError::configuration("author feed service url is required"));
        }
        if options.identifier.trim().is_empty() {
            return Err(SyncError::configuration(
                "author identifier must be provided in loader options",
            ));
        }
        Ok(Self {
            options,
            transport,
            ids: IdentifierPolicy::new(&["id", "url"]),
        })
    }

    fn fetcher(&self) -> AuthorFeedFetcher<'_> {
        AuthorFeedFetcher { loader: self }
    }

    fn record_id<'a>(&self, record: &'a RawRecord) -> Option<&'a str> {
        self.ids.resolve(record)
    }

    /// Walk pages and normalize, bounded by `max_records` and, for batch
    /// runs, the stored watermark. Returns the items plus the candidate
    /// new watermark.
    async fn fetch_items(
        &self,
        watermark: Option<String>,
    ) -> Result<(Vec<CanonicalItem>, Option<String>), SyncError> {
        let options = PaginateOptions {
            limit: self.options.max_records,
            watermark,
        };
        let outcome = paginate(&self.fetcher(), &options, |r| self.record_id(r)).await?;

        let parser = SchemaParser::new(&self.options.service_url);
        let items = normalize_records(
            &self.options.service_url,
            &self.ids,
            &parser,
            &outcome.records,
        );
        Ok((items, outcome.newest_id))
    }
}

struct AuthorFeedFetcher<'a> {
    loader: &'a AuthorFeedLoader,
}

#[async_trait]
impl PageFetcher for AuthorFeedFetcher<'_> {
    type Record = RawRecord;

    async fn fetch_page(&self, cursor: Option<&str>) -> Result<Page<RawRecord>, SyncError> {
        let opts = &self.loader.options;
        let mut url = format!(
            "{}?author={}&limit={}",
            opts.service_url, opts.identifier, opts.page_size
        );
        if let Some(cursor) = cursor {
            url.push_str("&cursor=");
            url.push_str(cursor);
        }

        let out = fetch_conditional(self.loader.transport.as_ref(), &url, HeaderMap::new(), None)
            .await?;
        let body = match out {
            FetchOutcome::Fetched { body, .. } => body,
            FetchOutcome::NotModified => unreachable!("stateless fetch cannot yield 304"),
        };

        let page: PageBody = serde_json::from_str(&body).map_err(|e| {
            SyncError::validation_detailed(&url, "failed to parse feed page", e.to_string())
        })?;
        Ok(Page {
            records: page.items,
            next_cursor: page.cursor,
        })
    }
}

#[async_trait]
impl Loader for AuthorFeedLoader {
    fn name(&self) -> &'static str {
        "author-feed"
    }

    async fn sync(&self, ctx: &mut SyncContext<'_>) -> Result<SyncOutcome, SyncError> {
        sync_started(self.name());

        let watermark = load_watermark(ctx.meta.as_deref());
        let (items, newest_id) = self.fetch_items(watermark).await.inspect_err(|e| {
            counter!("sync_errors_total").increment(1);
            tracing::error!(error = %e, author = %self.options.identifier, "author feed sync failed");
        })?;

        // Incremental source: records already in the store stay there.
        upsert_entries(ctx.store, &items)?;

        // Pagination completed without error; the watermark may advance.
        if let Some(meta) = ctx.meta.as_deref_mut() {
            store_watermark(meta, newest_id.as_deref());
        }

        tracing::info!(loader = self.name(), count = items.len(), "sync finished");
        Ok(SyncOutcome::Updated(items))
    }

    async fn collection(
        &self,
        filter: Option<&CollectionFilter>,
    ) -> Result<Vec<CanonicalItem>, SyncError> {
        let (items, _) = self.fetch_items(None).await?;
        match filter {
            Some(filter) => Ok(filter_collection(items, filter)),
            None => Ok(items),
        }
    }

    async fn entry(&self, filter: &EntryFilter) -> Result<Option<CanonicalItem>, SyncError> {
        let (items, _) = self.fetch_items(None).await?;
        Ok(find_entry(&items, filter)?.cloned())
    }
}

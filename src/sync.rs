//! Sync orchestration: the loader surface and the batch helpers shared by
//! every concrete source.
//!
//! A loader exposes two consumption modes. Batch (`sync`) repopulates
//! the host's entry store: wholesale sources replace the full contents
//! on every non-304 run, incremental (watermark-bounded) sources upsert
//! the records newer than the prior head. Live (`collection`/`entry`)
//! fetches on demand, filters in memory, and persists nothing. Cache validators and the pagination watermark are
//! written only after a sync fully completes, so a failure mid-run never
//! leaves gaps.

use async_trait::async_trait;
use metrics::counter;

use crate::error::SyncError;
use crate::filter::{CollectionFilter, EntryFilter};
use crate::metrics::ensure_metrics_described;
use crate::normalize::{rendered_html, CanonicalItem, LegacyItem};
use crate::store::{EntryStore, MetaStore, StoredEntry};

/// Meta-store key the pagination watermark is persisted under.
pub const META_WATERMARK: &str = "watermark";

/// Result of a batch sync. `NotModified` (the upstream answered 304) is
/// distinct from an empty `Updated` (the source really has zero items).
#[derive(Debug, PartialEq)]
pub enum SyncOutcome {
    Updated(Vec<CanonicalItem>),
    NotModified,
}

/// Host-provided context for one batch sync: the entry store to
/// repopulate and, where the host persists metadata across runs, the meta
/// store for validators and the watermark. Stateless call sites pass
/// `meta: None` and get full unconditional fetches.
pub struct SyncContext<'a> {
    pub store: &'a mut dyn EntryStore,
    pub meta: Option<&'a mut dyn MetaStore>,
}

/// The orchestration entry points a concrete source implements.
///
/// Configuration problems (missing key, no identifier) surface from the
/// source's constructor, never from these methods.
#[async_trait]
pub trait Loader: Send + Sync {
    fn name(&self) -> &'static str;

    /// Batch mode: fetch, normalize, and replace the store contents.
    async fn sync(&self, ctx: &mut SyncContext<'_>) -> Result<SyncOutcome, SyncError>;

    /// Live mode: fetch on demand and return the filtered collection
    /// without touching any store.
    async fn collection(
        &self,
        filter: Option<&CollectionFilter>,
    ) -> Result<Vec<CanonicalItem>, SyncError>;

    /// Live single-item lookup. `Ok(None)` means not found, which is an
    /// expected outcome, not an error.
    async fn entry(&self, filter: &EntryFilter) -> Result<Option<CanonicalItem>, SyncError>;
}

/// Record the start of a sync run.
pub fn sync_started(name: &str) {
    ensure_metrics_described();
    counter!("sync_runs_total").increment(1);
    tracing::info!(loader = name, "sync started");
}

/// Record a 304 short-circuit.
pub fn sync_not_modified(name: &str) {
    counter!("sync_not_modified_total").increment(1);
    tracing::info!(loader = name, "upstream not modified, nothing to do");
}

/// Replace the full store contents with `items`: clear, then repopulate.
/// No stale entries survive. When `legacy` is set the stored data is the
/// deprecated field-renamed projection; the rendered HTML is attached
/// either way.
pub fn replace_entries(
    store: &mut dyn EntryStore,
    items: &[CanonicalItem],
    legacy: bool,
) -> Result<(), SyncError> {
    store.clear();
    for item in items {
        let data = if legacy {
            serde_json::to_value(LegacyItem::project(item))
        } else {
            serde_json::to_value(item)
        }
        .map_err(|e| {
            SyncError::validation_detailed(&item.id, "serializing item for store", e.to_string())
        })?;

        store.set(StoredEntry {
            id: item.id.clone(),
            data,
            rendered_html: Some(rendered_html(item)),
        });
    }
    counter!("sync_items_total").increment(items.len() as u64);
    Ok(())
}

/// Upsert `items` without clearing. Incremental (watermark-bounded)
/// sources add only records newer than the prior head, so existing
/// entries must survive the run.
pub fn upsert_entries(
    store: &mut dyn EntryStore,
    items: &[CanonicalItem],
) -> Result<(), SyncError> {
    for item in items {
        let data = serde_json::to_value(item).map_err(|e| {
            SyncError::validation_detailed(&item.id, "serializing item for store", e.to_string())
        })?;
        store.set(StoredEntry {
            id: item.id.clone(),
            data,
            rendered_html: Some(rendered_html(item)),
        });
    }
    counter!("sync_items_total").increment(items.len() as u64);
    Ok(())
}

/// The watermark from the prior completed sync, where one was persisted.
pub fn load_watermark(meta: Option<&dyn MetaStore>) -> Option<String> {
    meta.and_then(|m| m.get(META_WATERMARK))
}

/// Persist the new watermark. Call only after the entire sync completed
/// without error; an absent id leaves the stored watermark untouched so
/// an empty incremental run does not forget history.
pub fn store_watermark(meta: &mut dyn MetaStore, newest_id: Option<&str>) {
    if let Some(id) = newest_id {
        meta.set(META_WATERMARK, id.to_string());
    }
}

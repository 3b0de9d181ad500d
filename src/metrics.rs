//! One-time metrics registration for the sync pipeline.

use metrics::{describe_counter, describe_histogram};
use once_cell::sync::OnceCell;

/// Register series descriptions once so they show up on whatever exporter
/// the host installs. Safe to call from every sync.
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("sync_runs_total", "Total sync runs started.");
        describe_counter!("sync_items_total", "Items written to the entry store.");
        describe_counter!(
            "sync_not_modified_total",
            "Syncs short-circuited by a 304 response."
        );
        describe_counter!(
            "sync_records_skipped_total",
            "Records dropped during normalization (missing id or failed validation)."
        );
        describe_counter!("sync_errors_total", "Syncs aborted by an error.");
        describe_histogram!("sync_fetch_ms", "Source fetch time in milliseconds.");
    });
}

// src/lib.rs
// Public library surface for integration tests (and host reuse).

pub mod config;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod metrics;
pub mod normalize;
pub mod paginate;
pub mod revalidate;
pub mod store;
pub mod sync;

// Concrete sources built on the core.
pub mod sources;

// ---- Re-exports for stable public API ----
pub use crate::error::SyncError;
pub use crate::filter::{CollectionFilter, EntryFilter};
pub use crate::normalize::{CanonicalItem, LegacyItem};
pub use crate::sync::{Loader, SyncContext, SyncOutcome};

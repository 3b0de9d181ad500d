//! Watermark pagination driver.
//!
//! Walks a cursor-paginated source one page at a time and stops on cursor
//! exhaustion, a configured result limit, or recognition of the watermark
//! (the id of the newest record already synced). Both stop conditions are
//! guard checks evaluated *before* a record is emitted, so the boundary
//! record is never duplicated into the output.

use async_trait::async_trait;

use crate::error::SyncError;

/// One page from a paginated source. `next_cursor: None` means the source
/// is exhausted.
#[derive(Debug, Clone)]
pub struct Page<R> {
    pub records: Vec<R>,
    pub next_cursor: Option<String>,
}

/// Fetches one page; later pages depend on the cursor returned by the
/// previous one, so pages are requested strictly in order.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    type Record: Send;

    async fn fetch_page(&self, cursor: Option<&str>) -> Result<Page<Self::Record>, SyncError>;
}

#[derive(Debug, Clone, Default)]
pub struct PaginateOptions {
    /// Stop once this many records have been emitted.
    pub limit: Option<usize>,
    /// Id of the newest record from the prior completed sync; pagination
    /// stops just before emitting it.
    pub watermark: Option<String>,
}

/// Records accumulated by a pagination run, plus the candidate new
/// watermark (the first emitted record that carries an identifier). The
/// caller persists it only after the whole sync completes without error.
#[derive(Debug)]
pub struct PaginateOutcome<R> {
    pub records: Vec<R>,
    pub newest_id: Option<String>,
}

/// Drive `fetcher` until exhaustion, limit, or watermark. Records are
/// returned in arrival order. `id_of` projects each record's identifier
/// for the watermark comparison; a record without one is still emitted
/// (normalization decides its fate) but never matches the watermark and
/// never becomes the candidate new one.
pub async fn paginate<F, R>(
    fetcher: &F,
    options: &PaginateOptions,
    id_of: impl Fn(&R) -> Option<&str>,
) -> Result<PaginateOutcome<R>, SyncError>
where
    F: PageFetcher<Record = R>,
    R: Send,
{
    let mut records: Vec<R> = Vec::new();
    let mut newest_id: Option<String> = None;
    let mut cursor: Option<String> = None;

    'pages: loop {
        let page = fetcher.fetch_page(cursor.as_deref()).await?;

        for record in page.records {
            if let Some(limit) = options.limit {
                if records.len() >= limit {
                    break 'pages;
                }
            }
            let id = id_of(&record);
            if let (Some(watermark), Some(id)) = (options.watermark.as_deref(), id) {
                // Everything from the watermark onward was already synced.
                if id == watermark {
                    break 'pages;
                }
            }
            if newest_id.is_none() {
                if let Some(id) = id {
                    newest_id = Some(id.to_string());
                }
            }
            records.push(record);
        }

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    Ok(PaginateOutcome { records, newest_id })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Serves a fixed newest-first page sequence.
    struct FixturePages {
        pages: Vec<Page<String>>,
    }

    impl FixturePages {
        fn new(pages: &[&[&str]]) -> Self {
            let last = pages.len().saturating_sub(1);
            Self {
                pages: pages
                    .iter()
                    .enumerate()
                    .map(|(i, records)| Page {
                        records: records.iter().map(|s| s.to_string()).collect(),
                        next_cursor: (i < last).then(|| format!("cursor-{}", i + 1)),
                    })
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl PageFetcher for FixturePages {
        type Record = String;

        async fn fetch_page(&self, cursor: Option<&str>) -> Result<Page<String>, SyncError> {
            let index = match cursor {
                None => 0,
                Some(c) => c
                    .strip_prefix("cursor-")
                    .and_then(|n| n.parse::<usize>().ok())
                    .ok_or_else(|| SyncError::validation("fixture", "bad cursor"))?,
            };
            self.pages
                .get(index)
                .cloned()
                .ok_or_else(|| SyncError::validation("fixture", "cursor out of range"))
        }
    }

    fn ids(outcome: &PaginateOutcome<String>) -> Vec<&str> {
        outcome.records.iter().map(|s| s.as_str()).collect()
    }

    #[tokio::test]
    async fn exhausts_all_pages_without_stop_conditions() {
        let fetcher = FixturePages::new(&[&["a", "b"], &["c", "d"]]);
        let out = paginate(&fetcher, &PaginateOptions::default(), |r| Some(r.as_str()))
            .await
            .unwrap();
        assert_eq!(ids(&out), vec!["a", "b", "c", "d"]);
        assert_eq!(out.newest_id.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn stops_before_emitting_the_watermark_record() {
        // Pages [A,B] then [C,D], watermark B: exactly [A] comes out and
        // A becomes the candidate new watermark.
        let fetcher = FixturePages::new(&[&["a", "b"], &["c", "d"]]);
        let opts = PaginateOptions {
            limit: None,
            watermark: Some("b".to_string()),
        };
        let out = paginate(&fetcher, &opts, |r| Some(r.as_str())).await.unwrap();
        assert_eq!(ids(&out), vec!["a"]);
        assert_eq!(out.newest_id.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn watermark_at_the_head_yields_nothing() {
        let fetcher = FixturePages::new(&[&["a", "b"]]);
        let opts = PaginateOptions {
            limit: None,
            watermark: Some("a".to_string()),
        };
        let out = paginate(&fetcher, &opts, |r| Some(r.as_str())).await.unwrap();
        assert!(out.records.is_empty());
        assert!(out.newest_id.is_none());
    }

    #[tokio::test]
    async fn limit_stops_before_the_record_is_emitted() {
        let fetcher = FixturePages::new(&[&["a", "b"], &["c", "d"]]);
        let opts = PaginateOptions {
            limit: Some(3),
            watermark: None,
        };
        let out = paginate(&fetcher, &opts, |r| Some(r.as_str())).await.unwrap();
        assert_eq!(ids(&out), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn unknown_watermark_walks_the_whole_source() {
        let fetcher = FixturePages::new(&[&["a", "b"], &["c"]]);
        let opts = PaginateOptions {
            limit: None,
            watermark: Some("zzz".to_string()),
        };
        let out = paginate(&fetcher, &opts, |r| Some(r.as_str())).await.unwrap();
        assert_eq!(ids(&out), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn records_without_an_id_never_set_or_match_the_watermark() {
        // The empty string stands in for a record with no identifier.
        let fetcher = FixturePages::new(&[&["", "a", "b"]]);
        let opts = PaginateOptions {
            limit: None,
            watermark: Some("b".to_string()),
        };
        let out = paginate(&fetcher, &opts, |r| (!r.is_empty()).then_some(r.as_str()))
            .await
            .unwrap();
        assert_eq!(ids(&out), vec!["", "a"]);
        // The headless record is emitted but the first identified record
        // becomes the candidate watermark.
        assert_eq!(out.newest_id.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn page_errors_propagate() {
        struct Failing;

        #[async_trait]
        impl PageFetcher for Failing {
            type Record = String;
            async fn fetch_page(&self, _cursor: Option<&str>) -> Result<Page<String>, SyncError> {
                Err(SyncError::transport("https://example.test", "boom"))
            }
        }

        let err = paginate(&Failing, &PaginateOptions::default(), |r: &String| Some(r.as_str()))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Transport { .. }));
    }
}

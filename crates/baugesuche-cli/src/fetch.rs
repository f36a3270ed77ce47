//! Source selection, snapshot caching, and normalization for one invocation.

use std::path::PathBuf;
use std::time::Duration;

use baugesuche_core::config::{CacheConfig, SourceConfig};
use baugesuche_core::{FieldMapping, Normalizer, Permit, RawRow, SourceSchema};
use baugesuche_store::{CacheKey, SnapshotStore};
use baugesuche_sync::{ArcGisSource, CsvSource, HttpClient, RecordSource, ShapefileSource};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};

/// Per-run cache switches from the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct CachePolicy {
    /// Drop the snapshot for this source before fetching.
    pub refresh: bool,
    /// Neither read nor write snapshots.
    pub bypass: bool,
}

/// Outcome of loading one collection.
#[derive(Debug)]
pub struct Loaded {
    pub permits: Vec<Permit>,
    /// The source could not be read; `permits` is empty.
    pub source_failed: bool,
    /// Permits new since the previous visit, when a cache is available.
    pub new_since_last_visit: Option<usize>,
}

/// Build the adapter for the configured source kind.
pub fn build_source(config: &SourceConfig) -> anyhow::Result<Box<dyn RecordSource>> {
    let http = HttpClient::new(Duration::from_secs(config.timeout_secs))?;
    let mapping = config.mapping();
    let source: Box<dyn RecordSource> = match config.kind {
        SourceSchema::ArcGisFeature => {
            let mut source = ArcGisSource::new(http, config.url.as_str()).with_time_zone(mapping.time_zone);
            if let Some(field) = mapping.filing_date.first() {
                source = source.with_date_field(field.as_str());
            }
            Box::new(source)
        }
        SourceSchema::CsvRow => {
            let delimiter = u8::try_from(config.delimiter)
                .map_err(|_| anyhow::anyhow!("CSV delimiter {:?} is not a single byte", config.delimiter))?;
            Box::new(CsvSource::new(http, config.url.as_str()).with_delimiter(delimiter))
        }
        SourceSchema::ShapefileAttributes => Box::new(ShapefileSource::new(http, config.url.as_str())),
    };
    Ok(source)
}

/// Snapshot directory: configured, else the platform cache dir.
pub fn cache_dir(config: &CacheConfig) -> Option<PathBuf> {
    config
        .dir
        .clone()
        .or_else(|| dirs::cache_dir().map(|d| d.join("baugesuche").join("snapshots")))
}

/// Open the snapshot store, or `None` when caching is off or unusable.
pub fn open_cache(config: &CacheConfig, policy: CachePolicy) -> Option<SnapshotStore> {
    if !config.enabled || policy.bypass {
        return None;
    }
    let Some(dir) = cache_dir(config) else {
        warn!("no cache directory available, continuing uncached");
        return None;
    };
    match SnapshotStore::open(&dir) {
        Ok(store) => Some(store),
        Err(e) => {
            warn!(error = %e, "cannot open cache, continuing uncached");
            None
        }
    }
}

/// Fetch (or reuse) raw rows and normalize them.
///
/// A source failure yields an empty collection with `source_failed` set.
/// Cache failures are logged and otherwise ignored.
pub async fn load_permits(
    source: &dyn RecordSource,
    mapping: FieldMapping,
    cache: Option<&SnapshotStore>,
    max_age: Option<Duration>,
    date_from: Option<NaiveDate>,
    policy: CachePolicy,
    now: DateTime<Utc>,
) -> Loaded {
    // Sources that cannot filter return the same rows for every bound.
    let key = CacheKey::new(source.url(), date_from.filter(|_| source.filters_by_date()));

    let rows = match fetch_rows(source, cache, &key, max_age, date_from, policy, now).await {
        Some(rows) => rows,
        None => {
            return Loaded {
                permits: Vec::new(),
                source_failed: true,
                new_since_last_visit: None,
            };
        }
    };

    let (permits, stats) = Normalizer::new(mapping).normalize_all(&rows);
    info!(
        permits = permits.len(),
        synthesized_ids = stats.synthesized_ids,
        duplicate_ids = stats.duplicate_ids,
        missing_filing_date = stats.missing_filing_date,
        missing_deadline_date = stats.missing_deadline_date,
        missing_location = stats.missing_location,
        "normalized"
    );

    let new_since_last_visit = cache.and_then(|store| match store.record_visit(&key, permits.len()) {
        Ok(n) => Some(n),
        Err(e) => {
            warn!(error = %e, "cannot record visit");
            None
        }
    });

    Loaded {
        permits,
        source_failed: false,
        new_since_last_visit,
    }
}

async fn fetch_rows(
    source: &dyn RecordSource,
    cache: Option<&SnapshotStore>,
    key: &CacheKey,
    max_age: Option<Duration>,
    date_from: Option<NaiveDate>,
    policy: CachePolicy,
    now: DateTime<Utc>,
) -> Option<Vec<RawRow>> {
    if let Some(store) = cache {
        if policy.refresh {
            if let Err(e) = store.invalidate(key) {
                warn!(error = %e, "cannot invalidate snapshot");
            }
        } else {
            match store.get_fresh(key, now, max_age) {
                Ok(Some(snapshot)) => return Some(snapshot.rows),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "ignoring unreadable snapshot"),
            }
        }
    }

    let rows = match source.fetch(date_from).await {
        Ok(rows) => rows,
        Err(e) => {
            warn!(url = %source.url(), error = %e, "source unavailable");
            return None;
        }
    };

    if let Some(store) = cache {
        if let Err(e) = store.put(key, rows.clone(), now) {
            warn!(error = %e, "cannot write snapshot");
        }
    }
    Some(rows)
}

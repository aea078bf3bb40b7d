//! Latest-quote cache plus day-bucketed intraday history and daily stats
//!
//! The store is the only holder of price state. Everything else reads and
//! writes through [`PriceStore`].

use async_trait::async_trait;
use chrono::NaiveDate;
use moka::future::Cache;
use parking_lot::RwLock;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::StoreConfig;
use crate::models::history::{DailyHistory, DailyStats, HistoryEntry};
use crate::models::quote::CombinedQuote;

const LATEST_KEY: &str = "latest";

/// Result of reading the latest quote, with its cache age
#[derive(Debug, Clone, PartialEq)]
pub enum LatestRead {
    Fresh { quote: CombinedQuote, age: Duration },
    /// Past the freshness window but still within the store's TTL
    Stale { quote: CombinedQuote, age: Duration },
    Miss,
}

impl LatestRead {
    pub fn quote(&self) -> Option<&CombinedQuote> {
        match self {
            LatestRead::Fresh { quote, .. } | LatestRead::Stale { quote, .. } => Some(quote),
            LatestRead::Miss => None,
        }
    }

    pub fn age(&self) -> Option<Duration> {
        match self {
            LatestRead::Fresh { age, .. } | LatestRead::Stale { age, .. } => Some(*age),
            LatestRead::Miss => None,
        }
    }
}

#[async_trait]
pub trait PriceStore: Send + Sync {
    async fn write_latest(&self, quote: &CombinedQuote);

    async fn read_latest(&self) -> LatestRead;

    /// Append one row to `date`. Rows older than the day's last row are rejected.
    fn append_history(&self, date: NaiveDate, entry: HistoryEntry) -> bool;

    fn read_history(&self, date: NaiveDate) -> DailyHistory;

    fn update_daily_stats(&self, date: NaiveDate, quote: &CombinedQuote) -> DailyStats;

    fn read_daily_stats(&self, date: NaiveDate) -> Option<DailyStats>;

    /// Days currently held, oldest first
    fn retained_dates(&self) -> Vec<NaiveDate>;

    /// Drop every day strictly before `cutoff`; returns the number of days dropped
    fn purge_before(&self, cutoff: NaiveDate) -> usize;
}

#[derive(Debug, Default)]
struct DayBucket {
    entries: VecDeque<HistoryEntry>,
    stats: Option<DailyStats>,
}

/// In-process store: moka TTL cache for the latest quote, locked day buckets for history
#[derive(Clone)]
pub struct MemoryPriceStore {
    latest: Cache<&'static str, (CombinedQuote, Instant)>,
    days: Arc<RwLock<BTreeMap<NaiveDate, DayBucket>>>,
    freshness: Duration,
    history_cap: usize,
}

impl MemoryPriceStore {
    pub fn new(config: &StoreConfig) -> Self {
        let latest = Cache::builder()
            .max_capacity(1)
            .time_to_live(config.latest_ttl)
            .build();

        Self {
            latest,
            days: Arc::new(RwLock::new(BTreeMap::new())),
            freshness: config.freshness,
            history_cap: config.history_cap.max(1),
        }
    }
}

#[async_trait]
impl PriceStore for MemoryPriceStore {
    async fn write_latest(&self, quote: &CombinedQuote) {
        self.latest
            .insert(LATEST_KEY, (quote.clone(), Instant::now()))
            .await;
    }

    async fn read_latest(&self) -> LatestRead {
        match self.latest.get(LATEST_KEY).await {
            Some((quote, written_at)) => {
                let age = written_at.elapsed();
                if age < self.freshness {
                    LatestRead::Fresh { quote, age }
                } else {
                    LatestRead::Stale { quote, age }
                }
            }
            None => LatestRead::Miss,
        }
    }

    fn append_history(&self, date: NaiveDate, entry: HistoryEntry) -> bool {
        let mut days = self.days.write();
        let bucket = days.entry(date).or_default();

        if let Some(last) = bucket.entries.back() {
            if entry.timestamp < last.timestamp {
                tracing::warn!(
                    %date,
                    timestamp = entry.timestamp,
                    last = last.timestamp,
                    "dropping out-of-order history entry"
                );
                return false;
            }
        }

        bucket.entries.push_back(entry);
        while bucket.entries.len() > self.history_cap {
            bucket.entries.pop_front();
        }
        true
    }

    fn read_history(&self, date: NaiveDate) -> DailyHistory {
        let days = self.days.read();
        DailyHistory {
            date: Some(date),
            entries: days
                .get(&date)
                .map(|b| b.entries.iter().cloned().collect())
                .unwrap_or_default(),
        }
    }

    fn update_daily_stats(&self, date: NaiveDate, quote: &CombinedQuote) -> DailyStats {
        let mut days = self.days.write();
        let bucket = days.entry(date).or_default();
        let stats = bucket.stats.get_or_insert_with(|| DailyStats::new(date));
        stats.apply(quote);
        stats.clone()
    }

    fn read_daily_stats(&self, date: NaiveDate) -> Option<DailyStats> {
        self.days.read().get(&date).and_then(|b| b.stats.clone())
    }

    fn retained_dates(&self) -> Vec<NaiveDate> {
        self.days.read().keys().copied().collect()
    }

    fn purge_before(&self, cutoff: NaiveDate) -> usize {
        let mut days = self.days.write();
        let kept = days.split_off(&cutoff);
        let dropped = days.len();
        *days = kept;
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::models::quote::{Market, PriceSnapshot};

    fn store_with(cap: usize, freshness: Duration) -> MemoryPriceStore {
        let mut config = AppConfig::defaults().store;
        config.history_cap = cap;
        config.freshness = freshness;
        MemoryPriceStore::new(&config)
    }

    fn entry(ts: i64, price: f64) -> HistoryEntry {
        HistoryEntry {
            timestamp: ts,
            domestic_price: Some(price),
            international_price: None,
            domestic_change_pct: None,
            international_change_pct: None,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn quote(ts: i64, price: f64) -> CombinedQuote {
        let snap = PriceSnapshot::from_parts(price, 0.0, 0.0, 0.0, 0.0, "test", ts);
        CombinedQuote::new(ts, 7.2, "test", Some(snap.clone()), Some(snap))
    }

    #[tokio::test]
    async fn test_latest_fresh_then_stale() {
        let store = store_with(10, Duration::from_secs(60));
        assert_eq!(store.read_latest().await, LatestRead::Miss);

        store.write_latest(&quote(1, 680.0)).await;
        assert!(matches!(store.read_latest().await, LatestRead::Fresh { .. }));

        let stale_store = store_with(10, Duration::ZERO);
        stale_store.write_latest(&quote(1, 680.0)).await;
        let read = stale_store.read_latest().await;
        assert!(matches!(read, LatestRead::Stale { .. }));
        assert_eq!(read.quote().unwrap().timestamp, 1);
    }

    #[test]
    fn test_history_cap_evicts_oldest() {
        let store = store_with(3, Duration::from_secs(30));
        for ts in 1..=5 {
            assert!(store.append_history(day(16), entry(ts, 680.0 + ts as f64)));
        }
        let history = store.read_history(day(16));
        let stamps: Vec<i64> = history.entries.iter().map(|e| e.timestamp).collect();
        assert_eq!(stamps, vec![3, 4, 5]);
    }

    #[test]
    fn test_history_is_monotonic() {
        let store = store_with(10, Duration::from_secs(30));
        assert!(store.append_history(day(16), entry(10, 680.0)));
        // equal timestamps are tolerated
        assert!(store.append_history(day(16), entry(10, 681.0)));
        assert!(!store.append_history(day(16), entry(5, 679.0)));
        assert_eq!(store.read_history(day(16)).len(), 2);
    }

    #[test]
    fn test_daily_stats_accumulate() {
        let store = store_with(10, Duration::from_secs(30));
        store.update_daily_stats(day(16), &quote(1, 680.0));
        store.update_daily_stats(day(16), &quote(2, 672.0));
        let stats = store.update_daily_stats(day(16), &quote(3, 676.0));

        let domestic = stats.market(Market::Domestic).unwrap();
        assert_eq!(domestic.low, 672.0);
        assert_eq!(domestic.high, 680.0);
        assert_eq!(stats.update_count, 3);
        assert_eq!(store.read_daily_stats(day(16)), Some(stats));
        assert_eq!(store.read_daily_stats(day(15)), None);
    }

    #[test]
    fn test_purge_before_cutoff() {
        let store = store_with(10, Duration::from_secs(30));
        for d in 12..=16 {
            store.append_history(day(d), entry(d as i64, 680.0));
        }
        assert_eq!(store.purge_before(day(14)), 2);
        assert_eq!(store.retained_dates(), vec![day(14), day(15), day(16)]);
        assert!(store.read_history(day(12)).is_empty());
    }
}

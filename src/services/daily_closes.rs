//! Long-term per-day aggregate and the day-bucketed history series
//!
//! Days with a recorded close are authentic. Gaps between two authentic days
//! are linearly interpolated; days before the first or after the last
//! authentic day repeat the nearest close. Every point says which it is.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use std::collections::BTreeMap;

use crate::entities::gold_daily_closes::{self, Entity as GoldDailyCloses};
use crate::models::history::{DailyStats, HistoryDayPoint, HistoryRange, HistoryResponse};
use crate::models::quote::Market;

/// Closing prices for one day from either the database or the in-memory store
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayClose {
    pub date: NaiveDate,
    pub domestic: Option<f64>,
    pub international: Option<f64>,
}

impl DayClose {
    pub fn from_stats(stats: &DailyStats) -> Self {
        Self {
            date: stats.date,
            domestic: stats.market(Market::Domestic).map(|m| m.close),
            international: stats.market(Market::International).map(|m| m.close),
        }
    }

    pub fn from_model(model: &gold_daily_closes::Model) -> Self {
        Self {
            date: model.date,
            domestic: model.domestic_close.and_then(|d| d.to_f64()),
            international: model.international_close.and_then(|d| d.to_f64()),
        }
    }

    fn price(&self, market: Market) -> Option<f64> {
        match market {
            Market::Domestic => self.domestic,
            Market::International => self.international,
        }
    }
}

fn decimal(value: f64) -> Option<Decimal> {
    Decimal::from_f64_retain(value).map(|d| d.round_dp(4))
}

/// Insert or refresh the row for `stats.date`
pub async fn upsert_daily_close(db: &DatabaseConnection, stats: &DailyStats) -> Result<(), DbErr> {
    let last_update = DateTime::from_timestamp_millis(stats.last_update)
        .unwrap_or_else(Utc::now)
        .fixed_offset();
    let domestic = stats.market(Market::Domestic);
    let international = stats.market(Market::International);

    let existing = GoldDailyCloses::find()
        .filter(gold_daily_closes::Column::Date.eq(stats.date))
        .one(db)
        .await?;

    let mut row: gold_daily_closes::ActiveModel = match existing {
        Some(record) => record.into(),
        None => gold_daily_closes::ActiveModel {
            date: Set(stats.date),
            ..Default::default()
        },
    };

    row.domestic_open = Set(domestic.and_then(|m| decimal(m.open)));
    row.domestic_high = Set(domestic.and_then(|m| decimal(m.high)));
    row.domestic_low = Set(domestic.and_then(|m| decimal(m.low)));
    row.domestic_close = Set(domestic.and_then(|m| decimal(m.close)));
    row.international_open = Set(international.and_then(|m| decimal(m.open)));
    row.international_high = Set(international.and_then(|m| decimal(m.high)));
    row.international_low = Set(international.and_then(|m| decimal(m.low)));
    row.international_close = Set(international.and_then(|m| decimal(m.close)));
    row.update_count = Set(stats.update_count as i32);
    row.last_update = Set(last_update);

    row.save(db).await?;

    tracing::debug!(date = %stats.date, updates = stats.update_count, "upserted gold daily close");
    Ok(())
}

pub async fn find_daily_close(
    db: &DatabaseConnection,
    date: NaiveDate,
) -> Result<Option<gold_daily_closes::Model>, DbErr> {
    GoldDailyCloses::find()
        .filter(gold_daily_closes::Column::Date.eq(date))
        .one(db)
        .await
}

/// Rows with `from <= date <= to`, oldest first
pub async fn closes_between(
    db: &DatabaseConnection,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<DayClose>, DbErr> {
    let rows = GoldDailyCloses::find()
        .filter(gold_daily_closes::Column::Date.gte(from))
        .filter(gold_daily_closes::Column::Date.lte(to))
        .order_by_asc(gold_daily_closes::Column::Date)
        .all(db)
        .await?;

    Ok(rows.iter().map(DayClose::from_model).collect())
}

/// Value for `date` from the known closes: exact, interpolated or flat-extended
fn estimate(known: &BTreeMap<NaiveDate, f64>, date: NaiveDate) -> Option<(f64, bool)> {
    if let Some(value) = known.get(&date) {
        return Some((*value, true));
    }

    let prev = known.range(..date).next_back();
    let next = known.range(date..).next();

    match (prev, next) {
        (Some((prev_date, prev_value)), Some((next_date, next_value))) => {
            let span = (*next_date - *prev_date).num_days() as f64;
            let offset = (date - *prev_date).num_days() as f64;
            Some((prev_value + (next_value - prev_value) * offset / span, false))
        }
        (Some((_, value)), None) | (None, Some((_, value))) => Some((*value, false)),
        (None, None) => None,
    }
}

/// One point per day for `range` ending at `end`
///
/// Later entries in `closes` win over earlier ones for the same date.
pub fn build_history(range: HistoryRange, end: NaiveDate, closes: &[DayClose]) -> HistoryResponse {
    let start = end - Duration::days(range.days() - 1);

    let known = |market: Market| -> BTreeMap<NaiveDate, f64> {
        closes
            .iter()
            .filter(|c| c.date >= start && c.date <= end)
            .filter_map(|c| c.price(market).map(|p| (c.date, p)))
            .collect()
    };
    let domestic = known(Market::Domestic);
    let international = known(Market::International);

    let mut points = Vec::new();
    if !domestic.is_empty() || !international.is_empty() {
        let mut date = start;
        while date <= end {
            let dom = estimate(&domestic, date);
            let intl = estimate(&international, date);
            let authentic = dom.is_none_or(|(_, real)| real) && intl.is_none_or(|(_, real)| real);
            points.push(HistoryDayPoint {
                date,
                domestic_price: dom.map(|(v, _)| v),
                international_price: intl.map(|(v, _)| v),
                authentic,
            });
            date += Duration::days(1);
        }
    }

    let authentic_days = points.iter().filter(|p| p.authentic).count();
    let approximated_days = points.len() - authentic_days;

    HistoryResponse {
        range: range.as_str().to_string(),
        points,
        authentic_days,
        approximated_days,
        approximated: approximated_days > 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn close(date: NaiveDate, domestic: f64, international: f64) -> DayClose {
        DayClose {
            date,
            domestic: Some(domestic),
            international: Some(international),
        }
    }

    #[test]
    fn test_interpolates_between_authentic_days() {
        let end = day(2026, 10, 16);
        let closes = vec![
            close(end - Duration::days(20), 500.0, 2200.0),
            close(end - Duration::days(10), 510.0, 2300.0),
        ];

        let history = build_history(HistoryRange::OneMonth, end, &closes);
        assert_eq!(history.points.len(), 30);
        assert_eq!(history.authentic_days, 2);
        assert_eq!(history.approximated_days, 28);
        assert!(history.approximated);

        let mid = history
            .points
            .iter()
            .find(|p| p.date == end - Duration::days(15))
            .unwrap();
        assert!(!mid.authentic);
        assert!((mid.domestic_price.unwrap() - 505.0).abs() < 1e-9);
        assert!((mid.international_price.unwrap() - 2250.0).abs() < 1e-9);

        // flat extension past either end
        assert_eq!(history.points[0].domestic_price, Some(500.0));
        assert_eq!(history.points.last().unwrap().domestic_price, Some(510.0));
    }

    #[test]
    fn test_fully_authentic_range() {
        let end = day(2026, 10, 16);
        let closes: Vec<DayClose> = (0..30)
            .map(|i| close(end - Duration::days(i), 500.0 + i as f64, 2300.0))
            .collect();

        let history = build_history(HistoryRange::OneMonth, end, &closes);
        assert_eq!(history.authentic_days, 30);
        assert!(!history.approximated);
        assert_eq!(history.points.first().unwrap().date, end - Duration::days(29));
    }

    #[test]
    fn test_no_closes_gives_empty_series() {
        let history = build_history(HistoryRange::OneYear, day(2026, 10, 16), &[]);
        assert!(history.points.is_empty());
        assert_eq!(history.range, "1y");
        assert!(!history.approximated);
    }

    #[test]
    fn test_later_close_overrides_earlier_for_same_day() {
        let end = day(2026, 10, 16);
        let closes = vec![close(end, 500.0, 2300.0), close(end, 505.0, 2310.0)];
        let history = build_history(HistoryRange::OneMonth, end, &closes);
        assert_eq!(history.points.last().unwrap().domestic_price, Some(505.0));
    }

    #[test]
    fn test_day_close_from_stats() {
        let mut stats = DailyStats::new(day(2026, 10, 16));
        let snap = crate::models::quote::PriceSnapshot::from_parts(512.0, 0.0, 0.0, 0.0, 0.0, "t", 1);
        stats.apply(&crate::models::quote::CombinedQuote::new(1, 7.2, "t", Some(snap), None));
        let close = DayClose::from_stats(&stats);
        assert_eq!(close.domestic, Some(512.0));
        assert_eq!(close.international, None);
    }
}

//! Aggregate figures, status filtering and number formatting for listings.

use crate::ranking::types::RankedPresale;
use crate::types::{PresaleRecord, PresaleStatus};
use serde::Serialize;
use std::collections::HashMap;

/// Headline numbers shown above the listing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MarketSummary {
    pub total_presales: usize,
    pub live_presales: usize,
    /// Sum of all parseable raise amounts in USD
    pub total_raised: f64,
    /// Mean APY in percent; unparseable values count as zero
    pub average_apy: f64,
}

impl MarketSummary {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a PresaleRecord>) -> Self {
        let mut total_presales = 0;
        let mut live_presales = 0;
        let mut total_raised = 0.0;
        let mut apy_sum = 0.0;

        for record in records {
            total_presales += 1;
            if record.status == PresaleStatus::Live {
                live_presales += 1;
            }
            total_raised += record.raise.to_usd().unwrap_or(0.0);
            apy_sum += record.apy_percent().unwrap_or(0.0);
        }

        let average_apy = if total_presales > 0 {
            apy_sum / total_presales as f64
        } else {
            0.0
        };

        Self {
            total_presales,
            live_presales,
            total_raised,
            average_apy,
        }
    }

    pub fn from_ranked(presales: &[RankedPresale]) -> Self {
        Self::from_records(presales.iter().map(|p| &p.presale))
    }
}

/// Listing filter tabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusFilter {
    All,
    Live,
    Upcoming,
    Ended,
}

impl StatusFilter {
    pub const ALL: [StatusFilter; 4] = [
        StatusFilter::All,
        StatusFilter::Live,
        StatusFilter::Upcoming,
        StatusFilter::Ended,
    ];

    pub fn matches(&self, status: PresaleStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Live => status == PresaleStatus::Live,
            StatusFilter::Upcoming => status == PresaleStatus::Upcoming,
            StatusFilter::Ended => status == PresaleStatus::Ended,
        }
    }
}

/// Items matching `filter`, in their current order.
pub fn filter_ranked(presales: &[RankedPresale], filter: StatusFilter) -> Vec<&RankedPresale> {
    presales
        .iter()
        .filter(|p| filter.matches(p.presale.status))
        .collect()
}

/// Count per status, as shown next to each filter tab.
pub fn status_counts(presales: &[RankedPresale]) -> HashMap<PresaleStatus, usize> {
    let mut counts = HashMap::new();
    for presale in presales {
        *counts.entry(presale.presale.status).or_insert(0) += 1;
    }
    counts
}

/// `1234567` -> `"1.2M"`, `4500` -> `"4.5K"`, `999.6` -> `"1000"`.
pub fn format_number(value: f64) -> String {
    if value >= 1_000_000.0 {
        format!("{:.1}M", value / 1_000_000.0)
    } else if value >= 1_000.0 {
        format!("{:.1}K", value / 1_000.0)
    } else {
        format!("{:.0}", value)
    }
}

pub fn format_currency(value: f64) -> String {
    format!("${}", format_number(value))
}

/// Signed percentage with one decimal, e.g. `"+4.2%"`.
pub fn format_percentage(value: f64) -> String {
    let sign = if value >= 0.0 { "+" } else { "" };
    format!("{}{:.1}%", sign, value)
}

/// Compact USD used for totals: B/M/K with one decimal, cents below that.
pub fn format_usd_compact(value: f64) -> String {
    if value >= 1_000_000_000.0 {
        format!("${:.1}B", value / 1_000_000_000.0)
    } else if value >= 1_000_000.0 {
        format!("${:.1}M", value / 1_000_000.0)
    } else if value >= 1_000.0 {
        format!("${:.1}K", value / 1_000.0)
    } else {
        format!("${:.2}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(symbol: &str, status: &str, raise: serde_json::Value, apy: &str) -> PresaleRecord {
        serde_json::from_value(serde_json::json!({
            "slug": symbol.to_lowercase(),
            "title": symbol,
            "symbol": symbol,
            "status": status,
            "raise": raise,
            "apy": apy,
        }))
        .unwrap()
    }

    fn ranked() -> Vec<RankedPresale> {
        RankedPresale::from_records(vec![
            record("A", "Live", serde_json::json!("$1.5M"), "40%"),
            record("B", "Upcoming", serde_json::json!(500000), "20%"),
            record("C", "Live", serde_json::json!("TBA"), "n/a"),
            record("D", "Ended", serde_json::json!("$250K"), "60%"),
        ])
    }

    #[test]
    fn test_market_summary() {
        let summary = MarketSummary::from_ranked(&ranked());

        assert_eq!(summary.total_presales, 4);
        assert_eq!(summary.live_presales, 2);
        assert!((summary.total_raised - 2_250_000.0).abs() < 1e-6);
        assert!((summary.average_apy - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_summary_has_zero_average() {
        let summary = MarketSummary::from_ranked(&[]);
        assert_eq!(summary.total_presales, 0);
        assert_eq!(summary.average_apy, 0.0);
    }

    #[test]
    fn test_filter_and_counts() {
        let presales = ranked();

        let live: Vec<_> = filter_ranked(&presales, StatusFilter::Live)
            .iter()
            .map(|p| p.symbol())
            .collect();
        assert_eq!(live, vec!["A", "C"]);
        assert_eq!(filter_ranked(&presales, StatusFilter::All).len(), 4);

        let counts = status_counts(&presales);
        assert_eq!(counts.get(&PresaleStatus::Live), Some(&2));
        assert_eq!(counts.get(&PresaleStatus::Ended), Some(&1));
        assert_eq!(counts.get(&PresaleStatus::Paused), None);

        let tabs: Vec<usize> = StatusFilter::ALL
            .iter()
            .map(|f| filter_ranked(&presales, *f).len())
            .collect();
        assert_eq!(tabs, vec![4, 2, 1, 1]);
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format_number(1_234_567.0), "1.2M");
        assert_eq!(format_number(4_500.0), "4.5K");
        assert_eq!(format_number(999.4), "999");
        assert_eq!(format_currency(2_000_000.0), "$2.0M");
        assert_eq!(format_percentage(4.24), "+4.2%");
        assert_eq!(format_percentage(-3.06), "-3.1%");
        assert_eq!(format_percentage(0.0), "+0.0%");
        assert_eq!(format_usd_compact(3_200_000_000.0), "$3.2B");
        assert_eq!(format_usd_compact(12.5), "$12.50");
    }
}

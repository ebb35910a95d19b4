//! Core types for the presale listing catalog.

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Listing status of a presale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PresaleStatus {
    Live,
    Upcoming,
    Ended,
    Paused,
    /// Any status string we do not recognise
    #[serde(other)]
    Unknown,
}

impl PresaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresaleStatus::Live => "Live",
            PresaleStatus::Upcoming => "Upcoming",
            PresaleStatus::Ended => "Ended",
            PresaleStatus::Paused => "Paused",
            PresaleStatus::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for PresaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Amount raised so far: either a plain number or a preformatted string
/// such as `"$1.5M"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RaiseAmount {
    Amount(f64),
    Formatted(String),
}

impl RaiseAmount {
    /// Numeric USD value. Strings accept `$`, thousands separators and a
    /// trailing K/M/B multiplier.
    pub fn to_usd(&self) -> Option<f64> {
        match self {
            RaiseAmount::Amount(value) if value.is_finite() => Some(*value),
            RaiseAmount::Amount(_) => None,
            RaiseAmount::Formatted(text) => parse_usd(text),
        }
    }
}

impl Default for RaiseAmount {
    fn default() -> Self {
        RaiseAmount::Amount(0.0)
    }
}

fn parse_usd(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let (number, multiplier) = match cleaned.chars().last()?.to_ascii_uppercase() {
        'K' => (&cleaned[..cleaned.len() - 1], 1_000.0),
        'M' => (&cleaned[..cleaned.len() - 1], 1_000_000.0),
        'B' => (&cleaned[..cleaned.len() - 1], 1_000_000_000.0),
        _ => (cleaned.as_str(), 1.0),
    };

    let value: f64 = number.parse().ok()?;
    value.is_finite().then_some(value * multiplier)
}

fn default_date() -> String {
    Utc::now().to_rfc3339()
}

/// A listed presale as stored in the static catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresaleRecord {
    /// Identifier, derived from the file name when missing
    #[serde(default)]
    pub slug: String,
    pub title: String,
    pub symbol: String,
    #[serde(default)]
    pub description: String,
    pub status: PresaleStatus,
    #[serde(default)]
    pub raise: RaiseAmount,
    #[serde(default)]
    pub apy: String,
    #[serde(default)]
    pub affiliate_link: String,
    /// ISO 8601 listing date
    #[serde(default = "default_date")]
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participants: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

impl PresaleRecord {
    /// Reject records missing the fields every view relies on.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(anyhow!("presale record has an empty title"));
        }
        if self.symbol.trim().is_empty() {
            return Err(anyhow!("presale '{}' has an empty symbol", self.title));
        }
        Ok(())
    }

    /// Listing date as a UTC timestamp, accepting RFC 3339 or a bare `YYYY-MM-DD`.
    pub fn listed_at(&self) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(&self.date) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDate::parse_from_str(&self.date, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
    }

    /// Numeric APY, e.g. `"45%"` -> 45.0.
    pub fn apy_percent(&self) -> Option<f64> {
        self.apy.trim().trim_end_matches('%').trim().parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raise_amount_parsing() {
        assert_eq!(RaiseAmount::Amount(1200.0).to_usd(), Some(1200.0));
        assert_eq!(RaiseAmount::Formatted("$1.5M".into()).to_usd(), Some(1_500_000.0));
        assert_eq!(RaiseAmount::Formatted("$250K".into()).to_usd(), Some(250_000.0));
        assert_eq!(RaiseAmount::Formatted("$1,200,000".into()).to_usd(), Some(1_200_000.0));
        assert_eq!(RaiseAmount::Formatted("3.2b".into()).to_usd(), Some(3_200_000_000.0));
        assert_eq!(RaiseAmount::Formatted("TBA".into()).to_usd(), None);
        assert_eq!(RaiseAmount::Formatted("".into()).to_usd(), None);
    }

    #[test]
    fn test_record_deserialization() {
        let json = r#"{
            "title": "Best Wallet",
            "symbol": "BEST",
            "description": "Wallet token",
            "status": "Live",
            "raise": "$13.2M",
            "apy": "87%",
            "affiliateLink": "https://example.com/best",
            "date": "2025-01-10T00:00:00Z",
            "participants": 4200
        }"#;

        let record: PresaleRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.status, PresaleStatus::Live);
        assert_eq!(record.affiliate_link, "https://example.com/best");
        assert_eq!(record.participants, Some(4200));
        assert_eq!(record.apy_percent(), Some(87.0));
        assert!(record.slug.is_empty());
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_unknown_status_is_tolerated() {
        let json = r#"{"title": "X", "symbol": "X", "status": "Cancelled"}"#;
        let record: PresaleRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.status, PresaleStatus::Unknown);
        // Missing date falls back to "now"
        assert!(record.listed_at().is_some());
    }

    #[test]
    fn test_validation_rejects_empty_symbol() {
        let json = r#"{"title": "No Symbol", "symbol": "  ", "status": "Live"}"#;
        let record: PresaleRecord = serde_json::from_str(json).unwrap();
        assert!(record.validate().is_err());
    }

    #[test]
    fn test_listed_at_accepts_plain_dates() {
        let json = r#"{"title": "A", "symbol": "A", "status": "Ended", "date": "2024-06-01"}"#;
        let record: PresaleRecord = serde_json::from_str(json).unwrap();
        let ts = record.listed_at().unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-06-01T00:00:00+00:00");

        let mut bad = record.clone();
        bad.date = "sometime".into();
        assert!(bad.listed_at().is_none());
    }
}

//! Mandi (wholesale market) rates.

use serde::{Deserialize, Serialize};

/// States the backend has market data for.
pub const SUPPORTED_STATES: [&str; 4] = ["Madhya Pradesh", "Maharashtra", "Punjab", "Uttar Pradesh"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    #[default]
    #[serde(other)]
    Stable,
}

/// One commodity quote, prices per quintal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MandiRate {
    pub commodity: String,
    pub market: String,
    pub min_price: f64,
    pub price: f64,
    pub max_price: f64,
    #[serde(default)]
    pub trend: Trend,
    #[serde(default)]
    pub date: Option<String>,
}

/// Case-insensitive substring match on the commodity name. An empty query keeps everything.
pub fn filter_by_commodity<'a>(rates: &'a [MandiRate], query: &str) -> Vec<&'a MandiRate> {
    let needle = query.trim().to_lowercase();
    rates
        .iter()
        .filter(|r| needle.is_empty() || r.commodity.to_lowercase().contains(&needle))
        .collect()
}

pub fn is_supported_state(state: &str) -> bool {
    SUPPORTED_STATES.iter().any(|s| s.eq_ignore_ascii_case(state.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate(commodity: &str, trend: Trend) -> MandiRate {
        MandiRate {
            commodity: commodity.to_string(),
            market: "Sehore Mandi".to_string(),
            min_price: 3000.0,
            price: 3200.0,
            max_price: 3400.0,
            trend,
            date: None,
        }
    }

    #[test]
    fn filters_case_insensitively() {
        let rates = vec![
            rate("Wheat (Sharbati)", Trend::Up),
            rate("Soybean", Trend::Down),
            rate("Wheat", Trend::Stable),
        ];
        assert_eq!(filter_by_commodity(&rates, "WHEAT").len(), 2);
        assert_eq!(filter_by_commodity(&rates, "soy")[0].commodity, "Soybean");
        assert_eq!(filter_by_commodity(&rates, "  ").len(), 3);
        assert!(filter_by_commodity(&rates, "garlic").is_empty());
    }

    #[test]
    fn unknown_trend_reads_as_stable() {
        let parsed: MandiRate = serde_json::from_str(
            r#"{"commodity":"Onion","market":"Lasalgaon Mandi","min_price":1600,"price":1800,"max_price":2000,"trend":"sideways"}"#,
        )
        .unwrap();
        assert_eq!(parsed.trend, Trend::Stable);
        assert!(is_supported_state("punjab"));
        assert!(!is_supported_state("Kerala"));
    }
}

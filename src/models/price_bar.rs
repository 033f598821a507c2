use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One trading day of a listed stock, shaped like a `stock_prices` row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBar {
    pub symbol: String,
    pub trading_date: NaiveDate,
    pub open_price: i64,
    pub high_price: i64,
    pub low_price: i64,
    pub close_price: i64,
    pub volume: i64,
    pub value: i64,
}

/// One trading day of a market index, shaped like a `market_indices` row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexBar {
    pub index_code: String,
    pub trading_date: NaiveDate,
    pub open_value: f64,
    pub high_value: f64,
    pub low_value: f64,
    pub close_value: f64,
    pub volume: i64,
    pub value: i64,
    pub change_value: f64,
    pub change_percent: f64,
}

/// Records that carry a trading date, so they can be range-filtered
pub trait TradingDated {
    fn trading_date(&self) -> NaiveDate;
}

impl TradingDated for PriceBar {
    fn trading_date(&self) -> NaiveDate {
        self.trading_date
    }
}

impl TradingDated for IndexBar {
    fn trading_date(&self) -> NaiveDate {
        self.trading_date
    }
}

/// Keep only bars with `from <= trading_date <= to`, preserving relative order.
///
/// Either bound may be open.
pub fn filter_date_range<B: TradingDated>(
    bars: Vec<B>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Vec<B> {
    bars.into_iter()
        .filter(|bar| {
            let date = bar.trading_date();
            from.map_or(true, |f| date >= f) && to.map_or(true, |t| date <= t)
        })
        .collect()
}

/// Multiplier applied to upstream prices before they are stored as integers.
///
/// Some upstream feeds quote in thousands of VND, others in full VND. The
/// scale is always configured explicitly and logged at the start of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriceScale {
    /// Upstream already quotes full VND
    #[default]
    Unit,
    /// Upstream quotes thousands of VND (26.7 = 26,700 VND)
    Thousands,
}

impl PriceScale {
    pub fn factor(&self) -> f64 {
        match self {
            PriceScale::Unit => 1.0,
            PriceScale::Thousands => 1000.0,
        }
    }

    /// Parse from "1" / "1000" (also "unit" / "thousands")
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.trim().to_lowercase().as_str() {
            "1" | "unit" => Ok(PriceScale::Unit),
            "1000" | "thousands" => Ok(PriceScale::Thousands),
            _ => Err(format!("Invalid price scale: '{}'. Valid values: 1, 1000", s)),
        }
    }

    /// Scale an upstream price into a non-negative integer amount
    pub fn apply(&self, raw: f64) -> i64 {
        if !raw.is_finite() {
            return 0;
        }
        ((raw * self.factor()).round() as i64).max(0)
    }
}

/// Baseline used for the change of the first bar in an index series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeBaseline {
    /// Treat the first bar's open as the previous close
    #[default]
    FirstOpen,
    /// Report zero change for the first bar
    Zero,
}

impl ChangeBaseline {
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.trim().to_lowercase().as_str() {
            "first-open" | "open" => Ok(ChangeBaseline::FirstOpen),
            "zero" | "none" => Ok(ChangeBaseline::Zero),
            _ => Err(format!("Invalid baseline: '{}'. Valid values: first-open, zero", s)),
        }
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(date: &str) -> PriceBar {
        PriceBar {
            symbol: "FPT".to_string(),
            trading_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            open_price: 1,
            high_price: 1,
            low_price: 1,
            close_price: 1,
            volume: 0,
            value: 0,
        }
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_filter_is_inclusive_and_keeps_order() {
        let bars = vec![
            bar("2025-03-10"),
            bar("2025-03-06"),
            bar("2025-03-07"),
            bar("2025-07-30"),
            bar("2025-07-31"),
        ];

        let filtered = filter_date_range(bars, Some(d("2025-03-07")), Some(d("2025-07-30")));
        let dates: Vec<String> = filtered.iter().map(|b| b.trading_date.to_string()).collect();

        assert_eq!(dates, vec!["2025-03-10", "2025-03-07", "2025-07-30"]);
    }

    #[test]
    fn test_filter_with_open_bounds() {
        let bars = vec![bar("2025-01-02"), bar("2025-01-03"), bar("2025-01-06")];

        assert_eq!(filter_date_range(bars.clone(), None, None).len(), 3);
        assert_eq!(filter_date_range(bars.clone(), Some(d("2025-01-03")), None).len(), 2);
        assert_eq!(filter_date_range(bars, None, Some(d("2025-01-02"))).len(), 1);
    }

    #[test]
    fn test_price_scale() {
        assert_eq!(PriceScale::Unit.apply(26700.0), 26700);
        assert_eq!(PriceScale::Thousands.apply(26.7), 26700);
        assert_eq!(PriceScale::Unit.apply(-5.0), 0);
        assert_eq!(PriceScale::Unit.apply(f64::NAN), 0);
        assert_eq!(PriceScale::from_str("1000").unwrap(), PriceScale::Thousands);
        assert!(PriceScale::from_str("100").is_err());
    }

    #[test]
    fn test_price_bar_serializes_column_names() {
        let json = serde_json::to_value(bar("2025-01-02")).unwrap();
        assert_eq!(json["trading_date"], "2025-01-02");
        assert_eq!(json["symbol"], "FPT");
        assert!(json.get("close_price").is_some());
    }
}

use chrono::{Datelike, NaiveDate};
use std::collections::BTreeSet;

/// A stretch without stored bars between two stored dates (both exclusive)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateGap {
    /// Last stored date before the gap
    pub from: NaiveDate,
    /// First stored date after the gap
    pub to: NaiveDate,
    pub days: i64,
}

/// Consecutive stored dates more than `max_gap_days` apart.
///
/// `dates` need not be sorted or unique.
pub fn find_gaps(dates: &[NaiveDate], max_gap_days: i64) -> Vec<DateGap> {
    let sorted: BTreeSet<NaiveDate> = dates.iter().copied().collect();

    sorted
        .iter()
        .zip(sorted.iter().skip(1))
        .filter_map(|(&from, &to)| {
            let days = (to - from).num_days();
            (days > max_gap_days).then_some(DateGap { from, to, days })
        })
        .collect()
}

/// `YYYY-MM` months in `[from, to]` that hold no stored date
pub fn missing_months(dates: &[NaiveDate], from: NaiveDate, to: NaiveDate) -> Vec<String> {
    let covered: BTreeSet<(i32, u32)> = dates.iter().map(|d| (d.year(), d.month())).collect();

    let mut missing = Vec::new();
    let (mut year, mut month) = (from.year(), from.month());
    while (year, month) <= (to.year(), to.month()) {
        if !covered.contains(&(year, month)) {
            missing.push(format!("{:04}-{:02}", year, month));
        }
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_weekends_are_not_gaps() {
        let dates = vec![d("2025-01-02"), d("2025-01-03"), d("2025-01-06"), d("2025-01-07")];
        assert!(find_gaps(&dates, 10).is_empty());
    }

    #[test]
    fn test_finds_long_gap_in_unsorted_input() {
        let dates = vec![d("2025-03-20"), d("2025-01-02"), d("2025-01-03"), d("2025-01-03")];
        let gaps = find_gaps(&dates, 10);
        assert_eq!(
            gaps,
            vec![DateGap {
                from: d("2025-01-03"),
                to: d("2025-03-20"),
                days: 76
            }]
        );
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let dates = vec![d("2025-01-01"), d("2025-01-11")];
        assert!(find_gaps(&dates, 10).is_empty());
        assert_eq!(find_gaps(&dates, 9).len(), 1);
    }

    #[test]
    fn test_missing_months() {
        let dates = vec![d("2024-11-05"), d("2025-01-10")];
        assert_eq!(
            missing_months(&dates, d("2024-11-01"), d("2025-02-28")),
            vec!["2024-12", "2025-02"]
        );
    }

    #[test]
    fn test_no_dates_means_every_month_missing() {
        assert_eq!(
            missing_months(&[], d("2025-01-15"), d("2025-03-01")),
            vec!["2025-01", "2025-02", "2025-03"]
        );
        assert!(find_gaps(&[], 10).is_empty());
    }
}

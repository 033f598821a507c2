use crate::services::vci::FetchError;
use std::time::Duration;

/// Lifecycle of one symbol within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolState {
    Pending,
    Fetching,
    Fetched,
    FetchFailed,
    Upserting,
    Upserted,
    UpsertFailed,
    Skipped,
    /// Never reached because the run was aborted
    NotAttempted,
}

impl SymbolState {
    /// Whether a symbol in this state may move to `next`
    pub fn can_advance_to(self, next: SymbolState) -> bool {
        use SymbolState::*;
        matches!(
            (self, next),
            (Pending, Fetching | NotAttempted)
                | (Fetching, Fetched | FetchFailed | Skipped)
                | (Fetched, Upserting | Skipped)
                | (Upserting, Upserted | UpsertFailed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SymbolState::FetchFailed
                | SymbolState::Upserted
                | SymbolState::UpsertFailed
                | SymbolState::Skipped
                | SymbolState::NotAttempted
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
}

/// Final result for one symbol
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolOutcome {
    Upserted {
        fetched: usize,
        accepted: usize,
    },
    FetchFailed(FetchError),
    /// Some chunks were rejected; `accepted` rows are stored regardless
    UpsertFailed {
        fetched: usize,
        accepted: usize,
        reason: String,
    },
    /// Nothing new to store
    Skipped {
        reason: String,
    },
    NotAttempted,
}

impl SymbolOutcome {
    pub fn state(&self) -> SymbolState {
        match self {
            SymbolOutcome::Upserted { .. } => SymbolState::Upserted,
            SymbolOutcome::FetchFailed(_) => SymbolState::FetchFailed,
            SymbolOutcome::UpsertFailed { .. } => SymbolState::UpsertFailed,
            SymbolOutcome::Skipped { .. } => SymbolState::Skipped,
            SymbolOutcome::NotAttempted => SymbolState::NotAttempted,
        }
    }

    /// Rows the storage accepted for this symbol
    pub fn accepted(&self) -> usize {
        match self {
            SymbolOutcome::Upserted { accepted, .. }
            | SymbolOutcome::UpsertFailed { accepted, .. } => *accepted,
            _ => 0,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SymbolOutcome::FetchFailed(_) | SymbolOutcome::UpsertFailed { .. }
        )
    }

    /// Status text shown after the symbol on the console
    pub fn describe(&self) -> String {
        match self {
            SymbolOutcome::Upserted { accepted, .. } => format!("OK ({} records)", accepted),
            SymbolOutcome::FetchFailed(e) => format!("FAILED ({})", e),
            SymbolOutcome::UpsertFailed {
                fetched,
                accepted,
                reason,
            } => format!("PARTIAL ({}/{} records, {})", accepted, fetched, reason),
            SymbolOutcome::Skipped { reason } => format!("SKIPPED ({})", reason),
            SymbolOutcome::NotAttempted => "NOT ATTEMPTED".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolReport {
    pub symbol: String,
    pub outcome: SymbolOutcome,
    pub elapsed: Duration,
}

/// Position of a symbol within the run, for progress lines
#[derive(Debug, Clone, Copy)]
pub struct FetchProgress {
    /// 1-based
    pub current: usize,
    pub total: usize,
}

impl FetchProgress {
    pub fn new(current: usize, total: usize) -> Self {
        Self { current, total }
    }

    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.current as f64 / self.total as f64) * 100.0
        }
    }

    /// `[ 50%] FPT ... OK (3 records)`
    pub fn format_line(&self, symbol: &str, outcome: &SymbolOutcome) -> String {
        format!(
            "[{:>3.0}%] {} ... {}",
            self.percentage(),
            symbol,
            outcome.describe()
        )
    }
}

/// Outcome of one driver run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub reports: Vec<SymbolReport>,
    /// Set when upstream blocking stopped the run early
    pub aborted: bool,
    pub state: RunState,
    pub elapsed: Duration,
}

impl Default for RunSummary {
    fn default() -> Self {
        Self {
            reports: Vec::new(),
            aborted: false,
            state: RunState::Idle,
            elapsed: Duration::ZERO,
        }
    }
}

impl RunSummary {
    fn count(&self, state: SymbolState) -> usize {
        self.reports
            .iter()
            .filter(|r| r.outcome.state() == state)
            .count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(SymbolState::Upserted)
    }

    pub fn failed(&self) -> usize {
        self.reports.iter().filter(|r| r.outcome.is_failure()).count()
    }

    pub fn skipped(&self) -> usize {
        self.count(SymbolState::Skipped)
    }

    pub fn not_attempted(&self) -> usize {
        self.count(SymbolState::NotAttempted)
    }

    pub fn records(&self) -> usize {
        self.reports.iter().map(|r| r.outcome.accepted()).sum()
    }

    pub fn outcome(&self, symbol: &str) -> Option<&SymbolOutcome> {
        self.reports
            .iter()
            .find(|r| r.symbol == symbol)
            .map(|r| &r.outcome)
    }

    pub fn format_display(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Succeeded:     {}", self.succeeded()),
            format!("Failed:        {}", self.failed()),
            format!("Skipped:       {}", self.skipped()),
            format!("Not attempted: {}", self.not_attempted()),
            format!("Records:       {}", self.records()),
            format!("Elapsed:       {:.1}s", self.elapsed.as_secs_f64()),
        ];
        if self.aborted {
            lines.push("Run aborted: upstream is blocking requests".to_string());
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(symbol: &str, outcome: SymbolOutcome) -> SymbolReport {
        SymbolReport {
            symbol: symbol.to_string(),
            outcome,
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn test_progress_line() {
        let line = FetchProgress::new(1, 2).format_line(
            "FPT",
            &SymbolOutcome::Upserted {
                fetched: 3,
                accepted: 3,
            },
        );
        assert_eq!(line, "[ 50%] FPT ... OK (3 records)");

        let line = FetchProgress::new(2, 2).format_line("HPG", &SymbolOutcome::FetchFailed(FetchError::Blocked));
        assert_eq!(line, "[100%] HPG ... FAILED (403 Blocked)");
    }

    #[test]
    fn test_state_transitions() {
        use SymbolState::*;

        let upserted = [Pending, Fetching, Fetched, Upserting, Upserted];
        assert!(upserted.windows(2).all(|w| w[0].can_advance_to(w[1])));
        assert!(Fetching.can_advance_to(Skipped));
        assert!(Fetched.can_advance_to(Skipped));
        assert!(Pending.can_advance_to(NotAttempted));

        assert!(!Pending.can_advance_to(Upserting));
        assert!(!Fetching.can_advance_to(NotAttempted));
        assert!(!Fetched.can_advance_to(FetchFailed));
        assert!(!Upserted.can_advance_to(Fetching));

        for state in [FetchFailed, Upserted, UpsertFailed, Skipped, NotAttempted] {
            assert!(state.is_terminal());
            assert!(!state.can_advance_to(Pending));
        }
        for state in [Pending, Fetching, Fetched, Upserting] {
            assert!(!state.is_terminal());
        }

        let outcome = SymbolOutcome::UpsertFailed {
            fetched: 1,
            accepted: 0,
            reason: "HTTP 500".to_string(),
        };
        assert!(Upserting.can_advance_to(outcome.state()));
    }

    #[test]
    fn test_summary_counts() {
        let summary = RunSummary {
            reports: vec![
                report("FPT", SymbolOutcome::Upserted { fetched: 3, accepted: 3 }),
                report(
                    "VCB",
                    SymbolOutcome::UpsertFailed {
                        fetched: 4,
                        accepted: 2,
                        reason: "HTTP 500".to_string(),
                    },
                ),
                report("HPG", SymbolOutcome::FetchFailed(FetchError::Blocked)),
                report("SSI", SymbolOutcome::Skipped { reason: "no new data".to_string() }),
                report("MWG", SymbolOutcome::NotAttempted),
            ],
            aborted: true,
            state: RunState::Completed,
            elapsed: Duration::from_secs(3),
        };

        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.failed(), 2);
        assert_eq!(summary.skipped(), 1);
        assert_eq!(summary.not_attempted(), 1);
        assert_eq!(summary.records(), 5);
        assert!(summary.format_display().last().unwrap().contains("aborted"));
    }
}

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

/// Longest reason a denial or leave request may carry. Discord rejects embed
/// field values over 1024 characters and the denial DM prefixes the reason.
pub const REASON_MAX_CHARS: usize = 1_000;

pub fn check_reason_length(reason: &str) -> Result<(), ValidationError> {
    if reason.chars().count() > REASON_MAX_CHARS {
        return Err(ValidationError::TooLong { field: "reason", max: REASON_MAX_CHARS });
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionState {
    Pending,
    Approved,
    Denied { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionOutcome {
    Approved,
    Denied { reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionKind {
    Approved,
    Denied,
}

impl DecisionOutcome {
    pub fn kind(&self) -> DecisionKind {
        match self {
            Self::Approved => DecisionKind::Approved,
            Self::Denied { .. } => DecisionKind::Denied,
        }
    }

    /// Footer appended to the decided message.
    pub fn footer(&self) -> String {
        match self {
            Self::Approved => "✅ Approved".to_owned(),
            Self::Denied { reason } => format!("❌ Denied - Reason: {reason}"),
        }
    }
}

impl From<DecisionOutcome> for DecisionState {
    fn from(outcome: DecisionOutcome) -> Self {
        match outcome {
            DecisionOutcome::Approved => Self::Approved,
            DecisionOutcome::Denied { reason } => Self::Denied { reason },
        }
    }
}

impl DecisionState {
    pub fn decided_kind(&self) -> Option<DecisionKind> {
        match self {
            Self::Pending => None,
            Self::Approved => Some(DecisionKind::Approved),
            Self::Denied { .. } => Some(DecisionKind::Denied),
        }
    }
}

/// Holds one record's decision state. `decide` is the only way out of
/// `Pending` and succeeds at most once.
#[derive(Debug)]
pub struct DecisionCell {
    state: Mutex<DecisionState>,
}

impl Default for DecisionCell {
    fn default() -> Self {
        Self { state: Mutex::new(DecisionState::Pending) }
    }
}

impl DecisionCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DecisionState {
        match self.state.lock() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Fails with the already-recorded kind when the cell has left `Pending`.
    pub fn ensure_pending(&self) -> Result<(), DecisionKind> {
        match self.state().decided_kind() {
            Some(kind) => Err(kind),
            None => Ok(()),
        }
    }

    /// Compare-and-set from `Pending` to the terminal state for `outcome`.
    pub fn decide(&self, outcome: &DecisionOutcome) -> Result<(), DecisionKind> {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(kind) = guard.decided_kind() {
            return Err(kind);
        }
        *guard = outcome.clone().into();
        Ok(())
    }
}

/// Result of one best-effort side effect performed after a primary step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SideEffectStatus {
    Delivered,
    Skipped(String),
    Failed(String),
}

impl SideEffectStatus {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SideEffectReport {
    pub effect: &'static str,
    pub status: SideEffectStatus,
}

/// Primary outcome of a decision plus every secondary effect it fanned out to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TransitionReport {
    pub outcome: DecisionOutcome,
    pub side_effects: Vec<SideEffectReport>,
}

impl TransitionReport {
    pub fn new(outcome: DecisionOutcome) -> Self {
        Self { outcome, side_effects: Vec::new() }
    }

    pub fn record(&mut self, effect: &'static str, status: SideEffectStatus) {
        self.side_effects.push(SideEffectReport { effect, status });
    }

    pub fn status_of(&self, effect: &str) -> Option<&SideEffectStatus> {
        self.side_effects.iter().find(|report| report.effect == effect).map(|report| &report.status)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::{
        DecisionCell, DecisionKind, DecisionOutcome, DecisionState, SideEffectStatus,
        TransitionReport,
    };

    #[test]
    fn first_decision_wins_and_later_ones_are_rejected() {
        let cell = DecisionCell::new();
        assert_eq!(cell.state(), DecisionState::Pending);

        cell.decide(&DecisionOutcome::Denied { reason: "Colors clash".to_owned() })
            .expect("pending cell should accept a decision");

        assert_eq!(cell.decide(&DecisionOutcome::Approved), Err(DecisionKind::Denied));
        assert_eq!(cell.state(), DecisionState::Denied { reason: "Colors clash".to_owned() });
        assert_eq!(cell.ensure_pending(), Err(DecisionKind::Denied));
    }

    #[test]
    fn concurrent_decisions_admit_exactly_one_winner() {
        let cell = Arc::new(DecisionCell::new());
        let handles = (0..8)
            .map(|index| {
                let cell = Arc::clone(&cell);
                thread::spawn(move || {
                    let outcome = if index % 2 == 0 {
                        DecisionOutcome::Approved
                    } else {
                        DecisionOutcome::Denied { reason: format!("reason {index}") }
                    };
                    cell.decide(&outcome).is_ok()
                })
            })
            .collect::<Vec<_>>();

        let winners =
            handles.into_iter().map(|handle| handle.join().expect("thread")).filter(|w| *w).count();
        assert_eq!(winners, 1);
        assert!(cell.state().decided_kind().is_some());
    }

    #[test]
    fn footers_carry_reason_verbatim() {
        assert_eq!(DecisionOutcome::Approved.footer(), "✅ Approved");
        assert_eq!(
            DecisionOutcome::Denied { reason: "Colors clash".to_owned() }.footer(),
            "❌ Denied - Reason: Colors clash"
        );
    }

    #[test]
    fn report_looks_up_side_effects_by_name() {
        let mut report = TransitionReport::new(DecisionOutcome::Approved);
        report.record("role_grant", SideEffectStatus::Failed("missing permission".to_owned()));
        report.record("direct_message", SideEffectStatus::Delivered);

        assert!(report.status_of("direct_message").is_some_and(SideEffectStatus::is_delivered));
        assert!(matches!(report.status_of("role_grant"), Some(SideEffectStatus::Failed(_))));
        assert!(report.status_of("missing").is_none());
    }
}

//! Per-user conversation state and the table that holds it.

use std::collections::BTreeMap;

use dashmap::DashMap;

/// Steps of the progress-logging dialog.
///
/// Progresses linearly: AwaitingWeight → AwaitingMood → AwaitingEnergy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStep {
    AwaitingWeight,
    AwaitingMood,
    AwaitingEnergy,
}

impl ProgressStep {
    /// The step after this one, `None` once energy has been asked.
    pub fn next(&self) -> Option<ProgressStep> {
        match self {
            Self::AwaitingWeight => Some(Self::AwaitingMood),
            Self::AwaitingMood => Some(Self::AwaitingEnergy),
            Self::AwaitingEnergy => None,
        }
    }
}

impl std::fmt::Display for ProgressStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AwaitingWeight => "awaiting_weight",
            Self::AwaitingMood => "awaiting_mood",
            Self::AwaitingEnergy => "awaiting_energy",
        };
        write!(f, "{s}")
    }
}

/// Values collected so far by the progress dialog.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressDraft {
    pub weight: Option<f64>,
    pub mood: Option<String>,
}

/// What the next non-command message from a user means.
///
/// No entry in the table means the user is idle and gets the chat fallback.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationState {
    /// Answering question `step` of the questionnaire.
    Onboarding {
        step: usize,
        answers: BTreeMap<String, String>,
    },
    ProgressLogging {
        step: ProgressStep,
        draft: ProgressDraft,
    },
}

impl ConversationState {
    pub fn new_onboarding() -> Self {
        Self::Onboarding {
            step: 0,
            answers: BTreeMap::new(),
        }
    }

    pub fn new_progress() -> Self {
        Self::ProgressLogging {
            step: ProgressStep::AwaitingWeight,
            draft: ProgressDraft::default(),
        }
    }

    /// Short label for log lines.
    pub fn label(&self) -> String {
        match self {
            Self::Onboarding { step, .. } => format!("onboarding[{step}]"),
            Self::ProgressLogging { step, .. } => format!("progress[{step}]"),
        }
    }
}

/// Concurrent map of user id → active conversation state.
///
/// Accessors clone in and out so no map guard outlives the call.
#[derive(Debug, Default)]
pub struct SessionTable {
    states: DashMap<String, ConversationState>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: &str) -> Option<ConversationState> {
        self.states.get(user_id).map(|s| s.value().clone())
    }

    pub fn set(&self, user_id: &str, state: ConversationState) {
        self.states.insert(user_id.to_string(), state);
    }

    /// Remove and return the user's state.
    pub fn clear(&self, user_id: &str) -> Option<ConversationState> {
        self.states.remove(user_id).map(|(_, s)| s)
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.states.contains_key(user_id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_steps_are_linear() {
        assert_eq!(ProgressStep::AwaitingWeight.next(), Some(ProgressStep::AwaitingMood));
        assert_eq!(ProgressStep::AwaitingMood.next(), Some(ProgressStep::AwaitingEnergy));
        assert_eq!(ProgressStep::AwaitingEnergy.next(), None);
    }

    #[test]
    fn table_set_get_clear() {
        let table = SessionTable::new();
        assert!(table.get("1").is_none());

        table.set("1", ConversationState::new_onboarding());
        assert!(table.contains("1"));
        assert_eq!(table.get("1"), Some(ConversationState::new_onboarding()));

        table.set("1", ConversationState::new_progress());
        assert_eq!(table.len(), 1);
        assert_eq!(table.clear("1"), Some(ConversationState::new_progress()));
        assert!(table.is_empty());
        assert_eq!(table.clear("1"), None);
    }

    #[test]
    fn users_do_not_share_state() {
        let table = SessionTable::new();
        let mut answers = BTreeMap::new();
        answers.insert("age".to_string(), "25".to_string());
        table.set(
            "a",
            ConversationState::Onboarding { step: 1, answers },
        );
        table.set("b", ConversationState::new_onboarding());

        match table.get("b") {
            Some(ConversationState::Onboarding { step, answers }) => {
                assert_eq!(step, 0);
                assert!(answers.is_empty());
            }
            other => panic!("unexpected state: {other:?}"),
        }
    }

    #[test]
    fn labels() {
        assert_eq!(ConversationState::new_onboarding().label(), "onboarding[0]");
        assert_eq!(
            ConversationState::new_progress().label(),
            "progress[awaiting_weight]"
        );
    }
}

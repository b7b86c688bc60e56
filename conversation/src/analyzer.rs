//! Keyword heuristics that move a conversation between dialogue states.

use dialogue_core::{DialogueState, HistoryEntry, Role};

/// A direct request for a lesson always closes the conversation.
const LESSON_REQUEST: &[&str] = &[
    "пробн",
    "бесплатн",
    "попробова",
    "записат",
    "хочу урок",
    "дайте ссылку",
];

/// Checked in order; the first table with a hit wins.
const STATE_KEYWORDS: &[(DialogueState, &[&str])] = &[
    (
        DialogueState::ProblemSolving,
        &[
            "проблем",
            "сложно",
            "трудно",
            "застенчив",
            "боится",
            "не слушается",
            "агрессивн",
            "замкн",
            "помогите",
        ],
    ),
    (
        DialogueState::FactFinding,
        &[
            "цена",
            "стоимость",
            "расписание",
            "время",
            "когда",
            "сколько",
            "преподаватель",
            "группа",
            "возраст",
        ],
    ),
    (
        DialogueState::Closing,
        &[
            "записат",
            "попробова",
            "хочу",
            "готов",
            "решил",
            "интересно",
            "согласен",
            "давайте",
        ],
    ),
];

const SHORT_MESSAGE_WORDS: usize = 5;
const LONG_MESSAGE_WORDS: usize = 10;
const RECENT_USER_MESSAGES: usize = 4;

#[derive(Debug, Clone, Copy, Default)]
pub struct StateAnalyzer;

impl StateAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze_transition(&self, message: &str, current: DialogueState) -> DialogueState {
        let message = message.trim();
        if message.is_empty() {
            return current;
        }

        let lowered = message.to_lowercase();
        if contains_any(&lowered, LESSON_REQUEST) {
            tracing::debug!("Direct lesson request detected");
            return DialogueState::Closing;
        }

        if let Some(state) = keyword_state(&lowered) {
            return state;
        }

        let words = message.split_whitespace().count();
        if words < SHORT_MESSAGE_WORDS {
            return current;
        }

        match current {
            DialogueState::Greeting => DialogueState::FactFinding,
            DialogueState::FactFinding if words > LONG_MESSAGE_WORDS => {
                DialogueState::ProblemSolving
            }
            other => other,
        }
    }

    /// Best guess for a conversation whose state was never stored or has
    /// expired. `history` is chronological.
    pub fn infer_from_history(&self, history: &[HistoryEntry]) -> DialogueState {
        if history.is_empty() {
            return DialogueState::Greeting;
        }

        let user_messages: Vec<&str> = history
            .iter()
            .filter(|entry| entry.role == Role::User)
            .map(|entry| entry.text.as_str())
            .collect();
        let recent = &user_messages[user_messages.len().saturating_sub(RECENT_USER_MESSAGES)..];
        let recent_text = recent.join(" ").to_lowercase();

        if let Some(state) = keyword_state(&recent_text) {
            return state;
        }

        match history.len() {
            0..4 => DialogueState::Greeting,
            4..8 => DialogueState::FactFinding,
            _ => DialogueState::ProblemSolving,
        }
    }
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| text.contains(keyword))
}

fn keyword_state(lowered: &str) -> Option<DialogueState> {
    STATE_KEYWORDS
        .iter()
        .find(|(_, keywords)| contains_any(lowered, keywords))
        .map(|(state, _)| *state)
}

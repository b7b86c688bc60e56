use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Identifier of one end user's conversation.
///
/// Raw identifiers arrive from the transport layer as arbitrary strings
/// (chat ids, phone numbers). They are trimmed before use and an empty value
/// never produces a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationKey(String);

impl ConversationKey {
    pub fn parse(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse stage of a conversation with a parent.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DialogueState {
    #[default]
    Greeting,
    FactFinding,
    ProblemSolving,
    Closing,
}

impl DialogueState {
    /// Parses a stored or caller supplied value. Unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        value.trim().parse().ok()
    }

    /// Parses a stored value, resetting anything unknown to the initial state.
    pub fn parse_or_initial(value: &str) -> Self {
        Self::parse(value).unwrap_or_default()
    }
}

/// Speaker of a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Label used when an entry is rendered or persisted as a line.
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "Пользователь",
            Role::Assistant => "Ассистент",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        match label {
            "Пользователь" => Some(Role::User),
            "Ассистент" => Some(Role::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub text: String,
}

impl HistoryEntry {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }

    /// Parses a persisted `"<role>: <text>"` line.
    ///
    /// Lines written by other tools without a known role prefix are kept as
    /// assistant text so that history is never silently dropped.
    pub fn parse_line(line: &str) -> Self {
        if let Some((label, text)) = line.split_once(": ") {
            if let Some(role) = Role::from_label(label) {
                return Self {
                    role,
                    text: text.to_string(),
                };
            }
        }
        Self::assistant(line)
    }

    pub fn to_line(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.role.label(), self.text)
    }
}

/// One user message and the assistant reply to it, appended as a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub user: HistoryEntry,
    pub assistant: HistoryEntry,
}

impl Exchange {
    pub fn new(user_text: impl Into<String>, assistant_text: impl Into<String>) -> Self {
        Self {
            user: HistoryEntry::user(user_text),
            assistant: HistoryEntry::assistant(assistant_text),
        }
    }
}

/// How much history a backend keeps and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Maximum retained entries; two per exchange.
    pub max_entries: usize,
    /// Sliding expiration refreshed on every write.
    pub ttl: Duration,
}

impl RetentionPolicy {
    /// Every backend keeps at least the latest exchange.
    pub const MIN_ENTRIES: usize = 2;

    pub fn from_window(window_size: usize, ttl: Duration) -> Self {
        Self {
            max_entries: window_size.max(1) * 2,
            ttl,
        }
    }

    /// Number of entries a backend retains: `max_entries`, but never fewer
    /// than one exchange.
    pub fn entry_limit(&self) -> usize {
        self.max_entries.max(Self::MIN_ENTRIES)
    }
}

/// Closed set of classification categories. Each maps to a fixed cache
/// lifetime in the classifier's policy table.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CacheCategory {
    Factual,
    Philosophical,
    ProblemSolving,
    Sensitive,
    LeadState,
}

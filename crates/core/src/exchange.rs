//! Conversation value objects passed by the caller into every retrieval.
//!
//! An [`Exchange`] is one completed question/answer turn. The caller owns a
//! [`ConversationHistory`], appends to it after each retrieval, and hands
//! the orchestrator an immutable suffix of it. The orchestrator keeps no
//! session state of its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of exchanges a history retains.
pub const DEFAULT_HISTORY_CAPACITY: usize = 5;

/// Truncation limits applied when an exchange is created.
#[derive(Debug, Clone, Copy)]
pub struct SnippetLimits {
    pub result_chars: usize,
    pub response_chars: usize,
}

impl Default for SnippetLimits {
    fn default() -> Self {
        Self {
            result_chars: 800,
            response_chars: 300,
        }
    }
}

/// One turn of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub question: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_used: Option<String>,

    #[serde(default)]
    pub result_snippet: String,

    #[serde(default)]
    pub assistant_response_snippet: String,

    pub created_at: DateTime<Utc>,
}

impl Exchange {
    /// Record a completed turn, truncating the result and response texts.
    pub fn new(
        question: impl Into<String>,
        sql_used: Option<String>,
        result: &str,
        assistant_response: &str,
        limits: SnippetLimits,
    ) -> Self {
        Self {
            question: question.into(),
            sql_used,
            result_snippet: truncate_chars(result, limits.result_chars).to_string(),
            assistant_response_snippet: truncate_chars(assistant_response, limits.response_chars)
                .to_string(),
            created_at: Utc::now(),
        }
    }

    /// Build an exchange from already-prepared fields, without truncation.
    pub fn from_parts(
        question: impl Into<String>,
        sql_used: Option<String>,
        result_snippet: impl Into<String>,
        assistant_response_snippet: impl Into<String>,
    ) -> Self {
        Self {
            question: question.into(),
            sql_used,
            result_snippet: result_snippet.into(),
            assistant_response_snippet: assistant_response_snippet.into(),
            created_at: Utc::now(),
        }
    }
}

/// Ordered, bounded exchange log (most recent last).
///
/// Appending past capacity drops the oldest entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationHistory {
    exchanges: VecDeque<Exchange>,
    capacity: usize,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            exchanges: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append an exchange, evicting the oldest when over capacity.
    pub fn push(&mut self, exchange: Exchange) {
        self.exchanges.push_back(exchange);
        while self.exchanges.len() > self.capacity {
            self.exchanges.pop_front();
        }
    }

    /// The last `n` exchanges in order, as an owned snapshot.
    pub fn recent(&self, n: usize) -> Vec<Exchange> {
        let skip = self.exchanges.len().saturating_sub(n);
        self.exchanges.iter().skip(skip).cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Exchange> {
        self.exchanges.iter()
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.exchanges.clear();
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new()
    }
}

/// Truncate to at most `max_chars` characters, respecting char boundaries.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ex(q: &str) -> Exchange {
        Exchange::from_parts(q, None, "", "")
    }

    #[test]
    fn push_drops_oldest_past_capacity() {
        let mut history = ConversationHistory::new();
        for i in 0..7 {
            history.push(ex(&format!("q{i}")));
        }
        assert_eq!(history.len(), 5);
        let questions: Vec<&str> = history.iter().map(|e| e.question.as_str()).collect();
        assert_eq!(questions, vec!["q2", "q3", "q4", "q5", "q6"]);
    }

    #[test]
    fn recent_returns_suffix_in_order() {
        let mut history = ConversationHistory::new();
        for i in 0..4 {
            history.push(ex(&format!("q{i}")));
        }
        let recent = history.recent(3);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].question, "q1");
        assert_eq!(recent[2].question, "q3");
        assert_eq!(history.recent(10).len(), 4);
    }

    #[test]
    fn new_exchange_truncates_snippets() {
        let long_result = "é".repeat(1000);
        let long_answer = "a".repeat(400);
        let exchange = Exchange::new(
            "Événement 102",
            Some("SELECT 1;".into()),
            &long_result,
            &long_answer,
            SnippetLimits::default(),
        );
        assert_eq!(exchange.result_snippet.chars().count(), 800);
        assert_eq!(exchange.assistant_response_snippet.len(), 300);
        assert_eq!(exchange.question, "Événement 102");
    }

    #[test]
    fn truncate_chars_is_boundary_safe() {
        assert_eq!(truncate_chars("événement", 3), "évé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 0), "");
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut history = ConversationHistory::with_capacity(0);
        history.push(ex("a"));
        history.push(ex("b"));
        assert_eq!(history.capacity(), 1);
        assert_eq!(history.recent(5)[0].question, "b");
    }
}

//! Relevance detection and conversation compression.
//!
//! Before each retrieval the compressor decides whether the question
//! continues the conversation. Unrelated questions get no history at all;
//! related ones get a history whose older turns are cut down to keyword
//! digests while the latest turn is kept as is.

use regex_lite::Regex;
use safeq_core::exchange::{Exchange, truncate_chars};
use std::sync::{Arc, LazyLock};
use tracing::debug;

/// Words that point back at something already discussed.
const REFERENCE_WORDS: &[&str] = &[
    // French
    "cette", "cet", "ce", "celui", "celle", "ceux", "lui", "elle", "eux", "leur", "leurs", "ça",
    "cela", "celui-là", "celle-là", "même", "aussi", "également", "encore", "et", "puis", "après",
    "ensuite", "autres", "autre", "pareil", "similaire",
    // English
    "this", "that", "these", "those", "it", "its", "him", "her", "them", "their", "also", "and",
    "again", "same", "other", "others", "too",
];

/// Openers of a self-contained question.
const NEW_TOPIC_STARTERS: &[&str] = &[
    "list",
    "show me",
    "how many",
    "which are the",
    "who are the",
    "all the",
    "combien",
    "liste",
    "donne",
    "montre",
    "affiche",
    "quels sont",
    "quel est",
    "qui sont",
    "qui est",
    "trouve",
    "cherche",
    "recherche",
];

/// References strong enough to override a new-topic opener.
const EXPLICIT_REFERENCES: &[&str] = &[
    "cette", "celui", "celle", "ceux", "this", "these", "those", "same", "même",
];

const SHORT_FOLLOW_UP_CHARS: usize = 25;
const SHORT_DEFAULT_CHARS: usize = 40;
const DIGEST_FALLBACK_CHARS: usize = 100;

static INTEGER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d+\b").unwrap());

static ID_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:event_id|person_id|risk_id|measure_id|unit_id)[:=\s]*(\d+)").unwrap()
});

static NAME_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:name|family_name|nom|declarer|full_name)\s*[:=]\s*'?([^,\n|';]+)")
        .unwrap()
});

static TYPE_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:type|classification|gravity|gravité)\s*[:=]\s*'?([A-Za-zÀ-ÿ][A-Za-zÀ-ÿ ]*)")
        .unwrap()
});

static FIGURE_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:cost|cout|coût|count|nombre|total)\w*\s*[:=]\s*(\d+(?:\.\d+)?)").unwrap()
});

/// Decides whether a question continues the conversation.
pub trait RelevanceClassifier: Send + Sync {
    fn name(&self) -> &str;

    /// `prior_questions` are oldest first.
    fn is_related(&self, question: &str, prior_questions: &[&str]) -> bool;
}

/// Rule-based classifier using reference words, length and shared IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicClassifier;

impl RelevanceClassifier for HeuristicClassifier {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn is_related(&self, question: &str, prior_questions: &[&str]) -> bool {
        is_related(question, prior_questions)
    }
}

fn has_reference_token(lower: &str) -> bool {
    lower
        .split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .filter(|t| !t.is_empty())
        .any(|token| {
            REFERENCE_WORDS.contains(&token)
                || token.split('-').any(|part| REFERENCE_WORDS.contains(&part))
        })
}

fn integers(text: &str) -> impl Iterator<Item = &str> {
    INTEGER.find_iter(text).map(|m| m.as_str())
}

/// Rules apply in order; the first that decides wins.
///
/// 1. no prior questions: unrelated
/// 2. a reference word appears as a token: related
/// 3. fewer than 25 characters: related
/// 4. shares an integer with one of the last two prior questions: related
/// 5. opens like a new question: related only with an explicit reference
/// 6. otherwise related when shorter than 40 characters
pub fn is_related(question: &str, prior_questions: &[&str]) -> bool {
    if prior_questions.is_empty() {
        return false;
    }

    let trimmed = question.trim();
    let lower = trimmed.to_lowercase();

    if has_reference_token(&lower) {
        return true;
    }

    let length = trimmed.chars().count();
    if length < SHORT_FOLLOW_UP_CHARS {
        return true;
    }

    let recent = &prior_questions[prior_questions.len().saturating_sub(2)..];
    if integers(trimmed).any(|id| recent.iter().any(|prior| integers(prior).any(|p| p == id))) {
        return true;
    }

    if NEW_TOPIC_STARTERS.iter().any(|s| lower.starts_with(s)) {
        return EXPLICIT_REFERENCES.iter().any(|r| lower.contains(r));
    }

    length < SHORT_DEFAULT_CHARS
}

fn push_unique(found: &mut Vec<String>, value: &str, limit: usize) {
    let value = value.trim();
    if !value.is_empty() && found.len() < limit && !found.iter().any(|v| v == value) {
        found.push(value.to_string());
    }
}

fn collect(re: &Regex, text: &str, limit: usize) -> Vec<String> {
    let mut found = Vec::new();
    for caps in re.captures_iter(text) {
        if let Some(m) = caps.get(1) {
            push_unique(&mut found, m.as_str(), limit);
        }
    }
    found
}

/// Keyword digest of a question, query or result.
///
/// Keeps entity IDs, name-like values, type/classification values and
/// cost/count figures, joined with ` | `. Text with none of those comes
/// back as its first 100 characters.
pub fn digest(text: &str) -> String {
    let mut parts = Vec::new();

    let ids = collect(&ID_FIELD, text, 10);
    if !ids.is_empty() {
        parts.push(format!("IDs: {}", ids.join(", ")));
    }

    let names = collect(&NAME_FIELD, text, 3);
    if !names.is_empty() {
        parts.push(format!("Names: {}", names.join(", ")));
    }

    let types = collect(&TYPE_FIELD, text, 3);
    if !types.is_empty() {
        parts.push(format!("Types: {}", types.join(", ")));
    }

    let figures = collect(&FIGURE_FIELD, text, 3);
    if !figures.is_empty() {
        parts.push(format!("Figures: {}", figures.join(", ")));
    }

    if parts.is_empty() {
        truncate_chars(text, DIGEST_FALLBACK_CHARS).to_string()
    } else {
        parts.join(" | ")
    }
}

fn digest_capped(text: &str, max_chars: usize) -> String {
    truncate_chars(&digest(text), max_chars).to_string()
}

/// Shrink a history slice: digest the first turn (only past three turns),
/// cut interior turns down to their question and a short query digest,
/// and keep the last turn untouched.
pub fn synthesize(history: &[Exchange]) -> Vec<Exchange> {
    let Some((last, rest)) = history.split_last() else {
        return Vec::new();
    };

    let mut out = Vec::with_capacity(history.len());
    for (index, exchange) in rest.iter().enumerate() {
        let reduced = if index == 0 {
            if history.len() > 3 {
                Exchange {
                    question: digest(&exchange.question),
                    sql_used: exchange.sql_used.as_deref().map(|s| digest_capped(s, 100)),
                    result_snippet: digest_capped(&exchange.result_snippet, 100),
                    assistant_response_snippet: String::new(),
                    created_at: exchange.created_at,
                }
            } else {
                exchange.clone()
            }
        } else {
            Exchange {
                question: truncate_chars(&exchange.question, 80).to_string(),
                sql_used: exchange.sql_used.as_deref().map(|s| digest_capped(s, 60)),
                result_snippet: String::new(),
                assistant_response_snippet: String::new(),
                created_at: exchange.created_at,
            }
        };
        out.push(reduced);
    }
    out.push(last.clone());
    out
}

/// The history view handed to the query generator. Never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompressedHistory(Vec<Exchange>);

impl CompressedHistory {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Exchange] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Exchange>> for CompressedHistory {
    fn from(entries: Vec<Exchange>) -> Self {
        Self(entries)
    }
}

/// Prepares the history for one retrieval.
#[derive(Clone)]
pub struct MemoryCompressor {
    classifier: Arc<dyn RelevanceClassifier>,
    threshold: usize,
}

impl Default for MemoryCompressor {
    fn default() -> Self {
        Self::new(Arc::new(HeuristicClassifier), 2)
    }
}

impl MemoryCompressor {
    /// Histories longer than `threshold` are synthesized.
    pub fn new(classifier: Arc<dyn RelevanceClassifier>, threshold: usize) -> Self {
        Self {
            classifier,
            threshold,
        }
    }

    pub fn classifier(&self) -> &dyn RelevanceClassifier {
        self.classifier.as_ref()
    }

    /// Empty for an unrelated question, otherwise the (possibly compressed)
    /// history.
    pub fn prepare(&self, history: &[Exchange], question: &str) -> CompressedHistory {
        if history.is_empty() {
            return CompressedHistory::empty();
        }

        let prior: Vec<&str> = history.iter().map(|e| e.question.as_str()).collect();
        if !self.classifier.is_related(question, &prior) {
            debug!(classifier = self.classifier.name(), "Question unrelated, history dropped");
            return CompressedHistory::empty();
        }

        if history.len() > self.threshold {
            debug!(turns = history.len(), "Compressing history");
            return synthesize(history).into();
        }

        history.to_vec().into()
    }
}

impl std::fmt::Debug for MemoryCompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCompressor")
            .field("classifier", &self.classifier.name())
            .field("threshold", &self.threshold)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(question: &str, sql: &str, result: &str, response: &str) -> Exchange {
        Exchange::from_parts(question, Some(sql.to_string()), result, response)
    }

    fn five_turns() -> Vec<Exchange> {
        vec![
            exchange(
                "Événement 102",
                "SELECT * FROM event e WHERE e.event_id = 102;",
                "### Row 1:\n  - event_id: 102\n  - type: Incident\n  - classification: Grave",
                "L'événement 102 est une panne électrique déclarée par Jean Dupont.",
            ),
            exchange(
                "Donne les infos sur cette personne",
                "SELECT * FROM person p WHERE p.name = 'Jean' AND p.family_name = 'Dupont';",
                "  - person_id: 1\n  - name: Jean\n  - family_name: Dupont",
                "Jean Dupont est technicien de maintenance.",
            ),
            exchange(
                "Et les risques?",
                "SELECT r.name, r.gravity FROM risk r JOIN event_risk er ON r.risk_id = er.risk_id WHERE er.event_id = 102;",
                "  - name: Électrocution\n  - gravity: Élevée",
                "Deux risques sont associés.",
            ),
            exchange(
                "Combien ça coûte?",
                "SELECT SUM(cm.cost) AS total_cost FROM corrective_measure cm JOIN event_corrective_measure ecm ON cm.measure_id = ecm.measure_id WHERE ecm.event_id = 102;",
                "  - total_cost: 1500.0",
                "Le coût total est de 1500 euros.",
            ),
            exchange(
                "Qui a mis en place ces mesures?",
                "SELECT p.name, p.family_name FROM person p JOIN corrective_measure cm ON p.person_id = cm.owner_id;",
                "  - name: Marie\n  - family_name: Martin",
                "Marie Martin.",
            ),
        ]
    }

    #[test]
    fn no_prior_questions_is_never_related() {
        assert!(!is_related("Liste tous les risques de gravité élevée", &[]));
        assert!(!is_related("Et les risques?", &[]));
    }

    #[test]
    fn reference_word_marks_continuation() {
        assert!(is_related(
            "Et les risques?",
            &["Donne-moi les infos sur l'événement 102"]
        ));
        assert!(is_related(
            "What corrective measures were taken for that incident last spring?",
            &["Show event 102"]
        ));
        assert!(is_related(
            "Donne-moi toutes les informations sur celle-là et son unité",
            &["Quel est le risque le plus grave ?"]
        ));
    }

    #[test]
    fn short_questions_are_follow_ups() {
        assert!(is_related("Combien coûte-t-il ?", &["Événement 102"]));
    }

    #[test]
    fn shared_id_with_recent_questions() {
        let prior = ["Événement 102", "Quels risques sont associés à l'incident"];
        assert!(is_related(
            "Quelles mesures correctives pour l'événement numéro 102 ?",
            &prior
        ));

        // Only the last two prior questions count.
        let older = ["Événement 102", "Quels sont les risques critiques", "Liste les unités"];
        assert!(!is_related(
            "Quelles personnes ont déclaré l'événement numéro 102 en 2024",
            &older
        ));
    }

    #[test]
    fn new_topic_opener_without_reference_is_unrelated() {
        let prior = ["Événement 102"];
        assert!(!is_related("Liste tous les risques de gravité élevée", &prior));
        assert!(!is_related("How many corrective measures cost over 1000 euros", &prior));
        assert!(is_related(
            "Liste toutes les personnes impliquées dans celles-ci depuis janvier",
            &prior
        ));
    }

    #[test]
    fn default_depends_on_length() {
        let prior = ["Événement 102"];
        assert!(is_related("Quelle unité a le plus d'accidents", &prior));
        assert!(!is_related(
            "Quelle unité organisationnelle a déclaré le plus d'accidents graves en 2023",
            &prior
        ));
    }

    #[test]
    fn digest_extracts_ids_names_types_and_figures() {
        let text = "event_id: 102\nname: Jean\nfamily_name: Dupont\ntype: Incident\ntotal_cost: 1500.5";
        let d = digest(text);
        assert!(d.contains("IDs: 102"), "{d}");
        assert!(d.contains("Names: Jean, Dupont"), "{d}");
        assert!(d.contains("Types: Incident"), "{d}");
        assert!(d.contains("Figures: 1500.5"), "{d}");
        assert_eq!(d.matches(" | ").count(), 3);
    }

    #[test]
    fn digest_of_sql_keeps_filters() {
        let d = digest("SELECT * FROM person p WHERE p.name = 'Jean' AND p.family_name = 'Dupont';");
        assert!(d.contains("Names: Jean, Dupont"), "{d}");
        let d = digest("SELECT * FROM event e WHERE e.event_id = 102;");
        assert_eq!(d, "IDs: 102");
    }

    #[test]
    fn digest_without_matches_returns_prefix() {
        let text = "x".repeat(150);
        assert_eq!(digest(&text), "x".repeat(100));
        assert_eq!(digest("bonjour"), "bonjour");
    }

    #[test]
    fn synthesize_keeps_last_exchange_verbatim() {
        let history = five_turns();
        let out = synthesize(&history);

        assert_eq!(out.len(), history.len());
        assert_eq!(out.last(), history.last());
    }

    #[test]
    fn synthesize_digests_first_and_trims_interior() {
        let history = five_turns();
        let out = synthesize(&history);

        assert_eq!(out[0].question, digest("Événement 102"));
        assert_eq!(out[0].sql_used.as_deref(), Some("IDs: 102"));
        assert!(out[0].assistant_response_snippet.is_empty());

        for interior in &out[1..4] {
            assert!(interior.question.chars().count() <= 80);
            assert!(interior.result_snippet.is_empty());
            assert!(interior.assistant_response_snippet.is_empty());
            assert!(interior.sql_used.as_ref().is_some_and(|s| s.chars().count() <= 60));
        }
    }

    #[test]
    fn synthesize_keeps_first_verbatim_up_to_three_turns() {
        let history: Vec<Exchange> = five_turns().into_iter().take(3).collect();
        let out = synthesize(&history);
        assert_eq!(out[0], history[0]);
        assert_eq!(out[2], history[2]);
        assert!(out[1].result_snippet.is_empty());
        assert!(synthesize(&[]).is_empty());
    }

    #[test]
    fn prepare_drops_history_for_unrelated_question() {
        let compressor = MemoryCompressor::default();
        let history = five_turns();
        let prepared = compressor.prepare(
            &history[..3],
            "Liste toutes les mesures correctives mises en place en 2024 par unité",
        );
        assert!(prepared.is_empty());
    }

    #[test]
    fn prepare_compresses_past_threshold() {
        let compressor = MemoryCompressor::default();
        let history = five_turns();

        let two = compressor.prepare(&history[..2], "Et les risques?");
        assert_eq!(two.entries(), &history[..2]);

        let three = compressor.prepare(&history[2..], "Et après?");
        assert_eq!(three.len(), 3);
        assert_eq!(three.entries()[2], history[4]);
        assert!(three.entries()[1].result_snippet.is_empty());
    }

    #[test]
    fn custom_classifier_is_consulted() {
        struct Always;
        impl RelevanceClassifier for Always {
            fn name(&self) -> &str {
                "always"
            }
            fn is_related(&self, _question: &str, _prior: &[&str]) -> bool {
                true
            }
        }

        let compressor = MemoryCompressor::new(Arc::new(Always), 5);
        let history = five_turns();
        let prepared = compressor.prepare(&history[..1], "Liste tous les risques de gravité élevée");
        assert_eq!(prepared.len(), 1);
        assert_eq!(compressor.classifier().name(), "always");
    }
}

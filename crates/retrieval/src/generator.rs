//! Query generator: prompt assembly, one model call, extraction and cleaning.
//!
//! The generator never retries. Every failure comes back as a
//! [`RetrievalError`] and the orchestrator decides what happens next.

use crate::relevance::CompressedHistory;
use crate::schema::schema_description;
use regex_lite::Regex;
use safeq_core::error::RetrievalError;
use safeq_core::exchange::truncate_chars;
use safeq_core::provider::{Provider, ProviderRequest};
use std::fmt::Write;
use std::sync::{Arc, LazyLock};
use tracing::debug;

const HISTORY_RESULT_PREVIEW_CHARS: usize = 300;
const DEFAULT_EXPLANATION: &str = "Generated query";

static SQL_MARKERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[SQL_START\](.*?)\[SQL_END\]").unwrap());

static EXPLAIN_MARKERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[EXPLAIN_START\](.*?)\[EXPLAIN_END\]").unwrap());

static SQL_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)```(?:sqlite|sql)[ \t]*\n?(.*?)```").unwrap());

static LEADING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```[A-Za-z]*\s*").unwrap());

static TRAILING_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*```$").unwrap());

static HORIZONTAL_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());

static BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n").unwrap());

const INSTRUCTIONS: &str = "You are an expert SQL analyst for an occupational safety events \
database. Translate the user's question into one valid, read-only SQLite query. Questions may \
be asked in French or English.";

const REFERENCE_RESOLUTION: &str = r#"## CONTEXT AND REFERENCES
If the question is ambiguous or refers back to the conversation:
- "this person", "cette personne", "him", "lui", "elle": take the name from the history
- "this event", "cet événement", "celui-là": take the event_id from the history
- "the cost", "combien" with no subject: look at what was discussed last
- a bare number such as "102": most likely an ID mentioned before

Worked examples:
1. Previous exchange: "Événement 102", result mentions Jean Dupont as declarer.
   Question: "Donne les infos sur cette personne"
   SQL: SELECT * FROM person p WHERE p.name = 'Jean' AND p.family_name = 'Dupont';
2. Previous SQL contained WHERE e.event_id = 102.
   Question: "Quels sont les risques associés?"
   SQL: SELECT r.* FROM risk r JOIN event_risk er ON r.risk_id = er.risk_id WHERE er.event_id = 102;
3. Previous exchange: "Combien d'événements par type?", result "Accident: 15, Incident: 23".
   Question: "Montre-moi les accidents"
   SQL: SELECT * FROM event e WHERE e.type = 'Accident' LIMIT 15;
"#;

const RULES: &str = r#"## RULES
1. SELECT (or WITH ... SELECT) only. Never INSERT, UPDATE, DELETE or any DDL.
2. Always use table aliases: e=event, p=person, r=risk, cm=corrective_measure, ou=organizational_unit, ee=event_employee, er=event_risk, ecm=event_corrective_measure.
3. Concatenate names with p.name || ' ' || p.family_name AS full_name.
4. For "recent" use ORDER BY e.start_datetime DESC.
5. Default to LIMIT 10-20 unless the user asks for everything.
6. If the select list has COUNT, SUM, AVG, MIN or MAX, GROUP BY is mandatory.
7. Every selected column must be either aggregated or listed in GROUP BY.
8. Dates are ISO-8601 text: use date(e.start_datetime) or strftime('%Y-%m', e.start_datetime).
9. Qualify every column with its alias (e.event_id, not event_id).
10. WHERE goes before GROUP BY, HAVING after it.
11. Quote strings with single quotes, never double quotes.
12. Use IS NULL / IS NOT NULL, never = NULL.
13. Check that parentheses balance.
"#;

const RESPONSE_FORMAT: &str = r#"## ANSWER FORMAT
[SQL_START]
<the SQL query, executable as is>
[SQL_END]

[EXPLAIN_START]
<one or two sentences on what the query does>
[EXPLAIN_END]
"#;

/// A cleaned query and the model's explanation of it.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedQuery {
    pub sql: String,
    pub explanation: String,
}

fn render_history(history: &CompressedHistory) -> String {
    if history.is_empty() {
        return String::new();
    }

    let mut out = String::from(
        "## CONVERSATION HISTORY\n\
         Use these exchanges to resolve pronouns and demonstratives (\"this\", \"that\", \
         \"cette\", \"lui\", \"ça\") in the question.\n\n",
    );

    for (i, exchange) in history.entries().iter().enumerate() {
        let _ = writeln!(out, "### Exchange {}:", i + 1);
        let _ = writeln!(out, "Question: {}", exchange.question);
        // A refused statement is never shown back to the model.
        if let Some(sql) = exchange
            .sql_used
            .as_deref()
            .filter(|s| !s.is_empty() && safeq_security::is_safe(s))
        {
            let _ = writeln!(out, "SQL used: {sql}");
        }
        if !exchange.result_snippet.is_empty() {
            let _ = writeln!(
                out,
                "Result: {}...",
                truncate_chars(&exchange.result_snippet, HISTORY_RESULT_PREVIEW_CHARS)
            );
        }
        if !exchange.assistant_response_snippet.is_empty() {
            let _ = writeln!(out, "Answer: {}", exchange.assistant_response_snippet);
        }
        out.push('\n');
    }

    out
}

/// Assemble the single prompt sent to the model.
pub fn build_prompt(
    question: &str,
    history: &CompressedHistory,
    prior_error: Option<&str>,
) -> String {
    let mut prompt = String::with_capacity(8 * 1024);
    prompt.push_str(INSTRUCTIONS);
    prompt.push_str("\n\n");
    prompt.push_str(schema_description());
    prompt.push('\n');
    prompt.push_str(&render_history(history));
    prompt.push_str(REFERENCE_RESOLUTION);
    prompt.push('\n');
    prompt.push_str(RULES);
    prompt.push('\n');
    let _ = write!(prompt, "## QUESTION\n{question}\n\n");

    if let Some(error) = prior_error {
        let _ = write!(
            prompt,
            "## PREVIOUS ATTEMPT FAILED\n\
             The previous query failed with this error:\n{error}\n\
             Write a corrected query that avoids this error.\n\n"
        );
    }

    prompt.push_str(RESPONSE_FORMAT);
    prompt
}

/// Pull the query (and explanation, if any) out of a model response.
///
/// Delimiter markers win; a ```sql fenced block is the fallback.
pub fn extract_query(response: &str) -> Option<(String, Option<String>)> {
    let explanation = EXPLAIN_MARKERS
        .captures(response)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty());

    if let Some(m) = SQL_MARKERS.captures(response).and_then(|c| c.get(1)) {
        return Some((m.as_str().trim().to_string(), explanation));
    }

    SQL_FENCE
        .captures(response)
        .and_then(|c| c.get(1))
        .map(|m| (m.as_str().trim().to_string(), explanation))
}

/// Normalize an extracted query and reject obviously broken ones.
pub fn clean_sql(raw: &str) -> Result<String, RetrievalError> {
    let unfenced = LEADING_FENCE.replace(raw.trim(), "");
    let unfenced = TRAILING_FENCE.replace(&unfenced, "");

    let spaced = HORIZONTAL_SPACE.replace_all(&unfenced, " ");
    let compact = BLANK_LINES.replace_all(&spaced, "\n");

    let body = compact
        .trim()
        .trim_end_matches(|c: char| c == ';' || c.is_whitespace());
    if body.is_empty() {
        return Err(RetrievalError::MalformedQuery("empty query".into()));
    }

    let opens = body.matches('(').count();
    let closes = body.matches(')').count();
    if opens != closes {
        return Err(RetrievalError::MalformedQuery(format!(
            "unbalanced parentheses: {opens} opening, {closes} closing"
        )));
    }

    if body.matches('\'').count() % 2 != 0 {
        return Err(RetrievalError::MalformedQuery(
            "unbalanced single quotes".into(),
        ));
    }

    Ok(format!("{body};"))
}

/// Turns a question into a candidate query with one model call.
pub struct QueryGenerator {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl QueryGenerator {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.1,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generate, extract and clean one query.
    pub async fn generate(
        &self,
        question: &str,
        history: &CompressedHistory,
        prior_error: Option<&str>,
    ) -> Result<GeneratedQuery, RetrievalError> {
        let prompt = build_prompt(question, history, prior_error);

        let mut request = ProviderRequest::prompt(&self.model, prompt);
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;

        debug!(
            provider = self.provider.name(),
            model = %self.model,
            history = history.len(),
            retry = prior_error.is_some(),
            "Requesting query"
        );

        let response = self
            .provider
            .complete(request)
            .await
            .map_err(|e| RetrievalError::GenerationFailure(format!("provider error: {e}")))?;

        let text = response.message.content;
        if text.trim().is_empty() {
            return Err(RetrievalError::GenerationFailure("empty response".into()));
        }

        let (raw_sql, explanation) = extract_query(&text).ok_or_else(|| {
            RetrievalError::GenerationFailure("no query found in the response".into())
        })?;

        let sql = clean_sql(&raw_sql)?;
        Ok(GeneratedQuery {
            sql,
            explanation: explanation.unwrap_or_else(|| DEFAULT_EXPLANATION.to_string()),
        })
    }
}

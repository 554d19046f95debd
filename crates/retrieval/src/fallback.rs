//! Deterministic keyword search used once every generation attempt failed.
//!
//! No model is involved: the question is matched against fixed keyword
//! groups and each matching group runs one fixed, read-only statement.

use crate::format::format_rows_titled;
use safeq_core::store::QueryStore;
use std::fmt::Write;
use tracing::{debug, warn};

/// First line of every fallback context.
pub const FALLBACK_HEADER: &str = "Automatic keyword search (query generation failed):";

struct KeywordGroup {
    title: &'static str,
    keywords: &'static [&'static str],
    /// Statement with a `{limit}` placeholder.
    statement: &'static str,
}

const GROUPS: &[KeywordGroup] = &[
    KeywordGroup {
        title: "Recent events",
        keywords: &[
            "événement", "evenement", "event", "incident", "accident", "récent", "recent",
        ],
        statement: "SELECT e.event_id, e.description, e.type, e.classification, e.start_datetime \
                    FROM event e ORDER BY e.start_datetime DESC LIMIT {limit}",
    },
    KeywordGroup {
        title: "Risks",
        keywords: &["risque", "risk", "danger", "gravité", "gravite", "gravity"],
        statement: "SELECT r.risk_id, r.name, r.gravity, r.probability \
                    FROM risk r ORDER BY r.risk_id LIMIT {limit}",
    },
    KeywordGroup {
        title: "Corrective measures",
        keywords: &[
            "mesure", "measure", "correction", "corrective", "action", "prévention", "prevention",
        ],
        statement: "SELECT cm.measure_id, cm.name, cm.description, cm.implementation_date, cm.cost \
                    FROM corrective_measure cm ORDER BY cm.implementation_date DESC LIMIT {limit}",
    },
    KeywordGroup {
        title: "Persons",
        keywords: &[
            "personne", "person", "people", "employé", "employe", "employee", "responsable",
            "auteur", "impliqué", "implique",
        ],
        statement: "SELECT p.person_id, p.matricule, p.name, p.family_name, p.role \
                    FROM person p ORDER BY p.family_name LIMIT {limit}",
    },
];

const OVERVIEW_STATEMENT: &str = "SELECT \
    (SELECT COUNT(*) FROM event) AS events, \
    (SELECT COUNT(*) FROM risk) AS risks, \
    (SELECT COUNT(*) FROM corrective_measure) AS corrective_measures, \
    (SELECT COUNT(*) FROM person) AS persons";

fn matching_groups(question: &str) -> Vec<&'static KeywordGroup> {
    let lowered = question.to_lowercase();
    GROUPS
        .iter()
        .filter(|g| g.keywords.iter().any(|k| lowered.contains(k)))
        .collect()
}

async fn render_section(
    out: &mut String,
    store: &dyn QueryStore,
    title: &str,
    statement: &str,
    cap: usize,
) {
    let _ = write!(out, "\n\n### {title}\n");
    match store.fetch(statement).await {
        Ok(rows) if rows.is_empty() => out.push_str("No rows."),
        Ok(rows) => out.push_str(&format_rows_titled(title, &rows, cap)),
        Err(e) => {
            warn!(section = title, error = %e, "Fallback section failed");
            let _ = write!(out, "Search failed: {e}");
        }
    }
}

/// Run the keyword search and render its findings.
///
/// Never fails: store errors are reported inline. The returned text always
/// starts with [`FALLBACK_HEADER`].
pub async fn fallback_search(store: &dyn QueryStore, question: &str, limit: usize) -> String {
    let limit = limit.max(1);
    let groups = matching_groups(question);
    debug!(groups = groups.len(), limit, "Running fallback search");

    let mut out = String::from(FALLBACK_HEADER);

    if groups.is_empty() {
        render_section(&mut out, store, "Database overview", OVERVIEW_STATEMENT, 1).await;
        return out;
    }

    for group in groups {
        let statement = group.statement.replace("{limit}", &limit.to_string());
        render_section(&mut out, store, group.title, &statement, limit).await;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{Scripted, ScriptedStore};
    use safeq_core::error::StoreError;
    use safeq_core::store::{RowSet, Value};
    use safeq_security::is_safe;

    fn one_row(column: &str, value: Value) -> RowSet {
        let mut rows = RowSet::new(vec![column.into()]);
        rows.push(vec![value]);
        rows
    }

    #[test]
    fn every_statement_passes_the_guard() {
        for group in GROUPS {
            assert!(is_safe(&group.statement.replace("{limit}", "10")), "{}", group.title);
        }
        assert!(is_safe(OVERVIEW_STATEMENT));
    }

    #[test]
    fn keywords_match_by_substring_in_any_case() {
        let titles: Vec<&str> = matching_groups("Quels RISQUES pour les Événements récents?")
            .iter()
            .map(|g| g.title)
            .collect();
        assert_eq!(titles, vec!["Recent events", "Risks"]);
        assert!(matching_groups("bonjour").is_empty());
    }

    #[tokio::test]
    async fn matching_groups_run_with_the_limit() {
        let store = ScriptedStore::new(vec![Scripted::Rows(one_row(
            "name",
            Value::Text("Électrocution".into()),
        ))]);

        let text = fallback_search(&store, "liste des dangers", 10).await;
        assert!(text.starts_with(FALLBACK_HEADER));
        assert!(text.contains("### Risks"));
        assert!(text.contains("  - name: Électrocution"));

        let statements = store.statements();
        assert_eq!(statements.len(), 1);
        assert!(statements[0].ends_with("LIMIT 10"));
    }

    #[tokio::test]
    async fn no_keyword_gives_overview_counts() {
        let store = ScriptedStore::new(vec![Scripted::Rows(one_row("events", Value::Integer(3)))]);

        let text = fallback_search(&store, "bonjour", 10).await;
        assert!(text.contains("### Database overview"));
        assert!(text.contains("  - events: 3"));
        assert!(store.statements()[0].contains("COUNT(*)"));
    }

    #[tokio::test]
    async fn section_errors_are_reported_inline() {
        let store = ScriptedStore::new(vec![
            Scripted::Fail(StoreError::execution("DatabaseError", "no such table: person")),
        ]);

        let text = fallback_search(&store, "quel employé?", 10).await;
        assert!(text.starts_with(FALLBACK_HEADER));
        assert!(text.contains("Search failed: DatabaseError: no such table: person"));
    }
}

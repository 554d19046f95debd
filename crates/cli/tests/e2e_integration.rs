//! End-to-end tests for the safeq retrieval pipeline.
//!
//! Each test drives the full loop (relevance, generation, safety gate,
//! execution, formatting) against a seeded SQLite database. Only the model
//! is scripted.

use std::sync::{Arc, Mutex};

use safeq_core::error::ProviderError;
use safeq_core::exchange::{ConversationHistory, Exchange, SnippetLimits};
use safeq_core::message::Message;
use safeq_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use safeq_core::store::QueryStore;
use safeq_retrieval::{QueryGenerator, Retriever};
use safeq_security::{AuditEvent, AuditLogger, AuditOutcome, is_safe};
use safeq_store::{SqliteStore, bootstrap};

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that returns scripted responses in sequence.
struct ScriptedProvider {
    responses: Vec<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<String>) -> Self {
        Self {
            responses,
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn sql(statements: &[&str]) -> Self {
        Self::new(statements.iter().map(|s| sql_response(s)).collect())
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn prompt(&self, call: usize) -> String {
        self.prompts.lock().unwrap()[call].clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut prompts = self.prompts.lock().unwrap();
        let call = prompts.len();
        if call >= self.responses.len() {
            panic!(
                "ScriptedProvider exhausted: call #{call}, have {}",
                self.responses.len()
            );
        }
        prompts.push(
            request
                .messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default(),
        );
        Ok(ProviderResponse {
            message: Message::assistant(self.responses[call].clone()),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model: "mock".into(),
        })
    }
}

fn sql_response(sql: &str) -> String {
    format!("[SQL_START]\n{sql}\n[SQL_END]\n\n[EXPLAIN_START]Scripted[EXPLAIN_END]")
}

async fn demo_store() -> Arc<SqliteStore> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    bootstrap::seed_demo(store.pool()).await.unwrap();
    Arc::new(store)
}

fn retriever(provider: &Arc<ScriptedProvider>, store: Arc<SqliteStore>) -> Retriever {
    Retriever::new(QueryGenerator::new(provider.clone(), "mock"), store)
}

const EVENT_102: &str = "SELECT e.event_id, e.description, e.type, e.classification, \
    p.name || ' ' || p.family_name AS declarer \
    FROM event e LEFT JOIN person p ON e.declared_by_id = p.person_id \
    WHERE e.event_id = 102";

// ── E2E: Single question ─────────────────────────────────────────────────

#[tokio::test]
async fn e2e_event_lookup_by_id() {
    let provider = Arc::new(ScriptedProvider::sql(&[EVENT_102]));
    let retriever = retriever(&provider, demo_store().await);

    let result = retriever.retrieve("Événement 102", &[]).await;

    assert!(result.success);
    assert_eq!(result.attempts, 1);
    assert_eq!(result.row_count, 1);
    assert!(result.context.contains("  - description: Panne électrique sur la ligne 3"));
    assert!(result.context.contains("  - declarer: Jean Dupont"));
    assert!(result.sql_raw.as_deref().unwrap().ends_with(';'));
    assert!(result.sql_used.as_deref().unwrap().contains("\nLEFT JOIN person p"));
}

#[tokio::test]
async fn e2e_aggregate_without_group_by_self_corrects() {
    let provider = Arc::new(ScriptedProvider::sql(&[
        "SELECT e.type, COUNT(*) AS n FROM event e WHERE COUNT(*) > 0",
        "SELECT e.type, COUNT(*) AS n FROM event e GROUP BY e.type ORDER BY e.type",
    ]));
    let retriever = retriever(&provider, demo_store().await);

    let result = retriever
        .retrieve("Combien d'événements par type?", &[])
        .await;

    assert!(result.success);
    assert_eq!(result.attempts, 2);
    assert_eq!(result.row_count, 3);
    assert!(provider.prompt(1).contains("DatabaseError: "));
}

#[tokio::test]
async fn e2e_unknown_column_error_reaches_next_prompt() {
    let provider = Arc::new(ScriptedProvider::sql(&[
        "SELECT e.id FROM event e",
        "SELECT e.event_id FROM event e ORDER BY e.event_id",
    ]));
    let retriever = retriever(&provider, demo_store().await);

    let result = retriever.retrieve("Liste des événements", &[]).await;

    assert!(result.success);
    assert_eq!(result.attempts, 2);
    assert!(provider.prompt(1).contains("no such column: e.id"));
}

#[tokio::test]
async fn e2e_dangerous_statement_never_runs() {
    let audit = Arc::new(AuditLogger::new());
    let store = demo_store().await;
    let provider = Arc::new(ScriptedProvider::sql(&["DELETE FROM event WHERE 1 = 1"]));
    let retriever = retriever(&provider, store.clone()).with_audit(audit.clone());

    let result = retriever.retrieve("Efface tous les événements", &[]).await;

    assert!(!result.success);
    assert_eq!(result.context, "query not authorized");
    assert_eq!(result.error.as_deref(), Some("potentially dangerous query"));
    assert_eq!(provider.calls(), 1);

    let remaining = store.fetch("SELECT COUNT(*) AS n FROM event").await.unwrap();
    assert_eq!(remaining.rows[0][0].to_string(), "3");

    let denied = audit.entries_by_outcome(&AuditOutcome::Denied);
    assert_eq!(denied.len(), 1);
    assert_eq!(denied[0].event, AuditEvent::QueryRejected { attempt: 1 });
}

#[tokio::test]
async fn e2e_exhausted_attempts_fall_back_to_keyword_search() {
    let provider = Arc::new(ScriptedProvider::sql(&[
        "SELECT r.nom FROM risk r",
        "SELECT r.nom FROM risk r",
        "SELECT r.nom FROM risk r",
        "SELECT r.nom FROM risk r",
        "SELECT r.nom FROM risk r",
    ]));
    let retriever = retriever(&provider, demo_store().await);

    let result = retriever.retrieve("Quels sont les risques?", &[]).await;

    assert!(!result.success);
    assert_eq!(result.attempts, 5);
    assert!(result.context.contains("### Risks"));
    assert!(result.context.contains("  - name: Électrocution"));
    assert!(result.error.as_deref().unwrap().starts_with("exhausted 5 attempts"));
    assert_eq!(provider.calls(), 5);
}

// ── E2E: Conversation ────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_follow_up_resolves_through_history() {
    let provider = Arc::new(ScriptedProvider::sql(&[
        EVENT_102,
        "SELECT p.matricule, p.name, p.family_name, p.role FROM person p \
         WHERE p.name = 'Jean' AND p.family_name = 'Dupont'",
    ]));
    let retriever = retriever(&provider, demo_store().await);
    let mut history = ConversationHistory::with_capacity(5);

    let first = retriever
        .retrieve("Événement 102", &history.recent(3))
        .await;
    assert!(first.success);
    history.push(Exchange::new(
        "Événement 102",
        first.sql_raw.clone(),
        &first.context,
        "L'événement 102 a été déclaré par Jean Dupont.",
        SnippetLimits::default(),
    ));

    let second = retriever
        .retrieve("Donne les infos sur cette personne", &history.recent(3))
        .await;

    assert!(second.success);
    assert!(second.context.contains("  - matricule: M1001"));

    let prompt = provider.prompt(1);
    assert!(prompt.contains("### Exchange 1:"));
    assert!(prompt.contains("Question: Événement 102"));
    assert!(prompt.contains("WHERE e.event_id = 102"));
}

#[tokio::test]
async fn e2e_unrelated_question_drops_history() {
    let provider = Arc::new(ScriptedProvider::sql(&[
        "SELECT r.name FROM risk r ORDER BY r.name",
    ]));
    let retriever = retriever(&provider, demo_store().await);
    let history = vec![Exchange::from_parts(
        "Événement 102",
        Some(format!("{EVENT_102};")),
        "  - declarer: Jean Dupont",
        "",
    )];

    let result = retriever
        .retrieve("Quels sont les risques les plus fréquents dans l'entrepôt?", &history)
        .await;

    assert!(result.success);
    assert!(!provider.prompt(0).contains("CONVERSATION HISTORY"));
}

// ── E2E: Read-only database ──────────────────────────────────────────────

#[tokio::test]
async fn e2e_read_only_file_store_serves_queries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.db");
    let path = path.to_str().unwrap();

    {
        let writable = SqliteStore::open(path, false, 1).await.unwrap();
        bootstrap::create_schema(writable.pool()).await.unwrap();
        bootstrap::seed_demo(writable.pool()).await.unwrap();
        writable.pool().close().await;
    }

    let store = Arc::new(SqliteStore::open(path, true, 2).await.unwrap());
    assert!(store.is_read_only());
    assert!(store.fetch("DELETE FROM event").await.is_err());

    let provider = Arc::new(ScriptedProvider::sql(&[
        "SELECT r.name FROM risk r JOIN event_risk er ON r.risk_id = er.risk_id \
         WHERE er.event_id = 102 ORDER BY r.name",
    ]));
    let retriever = Retriever::new(QueryGenerator::new(provider.clone(), "mock"), store);

    let result = retriever
        .retrieve("Quels sont les risques associés à l'événement 102?", &[])
        .await;

    assert!(result.success);
    assert_eq!(result.row_count, 2);
    assert!(result.context.contains("Électrocution"));
    assert!(result.context.contains("Incendie"));
    assert!(is_safe(result.sql_raw.as_deref().unwrap()));
}

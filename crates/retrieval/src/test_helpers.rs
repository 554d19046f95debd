//! Scripted provider and store shared by the retrieval tests.

use async_trait::async_trait;
use safeq_core::error::{ProviderError, StoreError};
use safeq_core::message::Message;
use safeq_core::provider::{Provider, ProviderRequest, ProviderResponse};
use safeq_core::store::{QueryStore, RowSet, Value};
use std::collections::VecDeque;
use std::sync::Mutex;

/// One scripted model reply.
pub enum Reply {
    Text(String),
    Fail(ProviderError),
    /// Never answers.
    Hang,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// A well-formed marker response around `sql`.
    pub fn sql(sql: &str) -> Self {
        Self::Text(format!(
            "[SQL_START]\n{sql}\n[SQL_END]\n[EXPLAIN_START]Scripted query[EXPLAIN_END]"
        ))
    }
}

/// Provider that plays back a fixed list of replies, in order.
///
/// Panics when asked for more replies than were scripted.
pub struct SequentialMockProvider {
    replies: Mutex<VecDeque<Reply>>,
    prompts: Mutex<Vec<String>>,
}

impl SequentialMockProvider {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential-mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let prompt = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.prompts.lock().unwrap().push(prompt);

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("SequentialMockProvider ran out of scripted replies");

        match reply {
            Reply::Text(text) => Ok(ProviderResponse {
                message: Message::assistant(text),
                usage: None,
                model: request.model,
            }),
            Reply::Fail(err) => Err(err),
            Reply::Hang => std::future::pending().await,
        }
    }
}

/// One scripted store outcome.
pub enum Scripted {
    Rows(RowSet),
    Fail(StoreError),
    Hang,
}

/// Store that plays back scripted outcomes and records every statement.
///
/// Returns an empty row set once the script is exhausted.
#[derive(Default)]
pub struct ScriptedStore {
    outcomes: Mutex<VecDeque<Scripted>>,
    statements: Mutex<Vec<String>>,
}

impl ScriptedStore {
    pub fn new(outcomes: Vec<Scripted>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            statements: Mutex::new(Vec::new()),
        }
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryStore for ScriptedStore {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch(&self, sql: &str) -> Result<RowSet, StoreError> {
        self.statements.lock().unwrap().push(sql.to_string());
        let outcome = self.outcomes.lock().unwrap().pop_front();
        match outcome {
            Some(Scripted::Rows(rows)) => Ok(rows),
            Some(Scripted::Fail(err)) => Err(err),
            Some(Scripted::Hang) => std::future::pending().await,
            None => Ok(RowSet::default()),
        }
    }
}

/// The single row describing event 102.
pub fn event_102() -> RowSet {
    let mut rows = RowSet::new(vec![
        "event_id".into(),
        "description".into(),
        "type".into(),
        "classification".into(),
        "declarer".into(),
    ]);
    rows.push(vec![
        Value::Integer(102),
        Value::Text("Panne électrique sur la ligne 3".into()),
        Value::Text("Incident".into()),
        Value::Text("Grave".into()),
        Value::Text("Jean Dupont".into()),
    ]);
    rows
}

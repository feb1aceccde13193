//! Per-connection protocol state machine.
//!
//! A session owns everything one client negotiated: its startup parameters,
//! the key pair it was issued and the completions waiting for a Sync. The
//! SQLite connection and the schema registry are shared with every other
//! session. I/O is left to the caller; a session only turns decoded requests
//! into the messages to send back.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{ReturningCompletion, ServerConfig};
use crate::pg::{
    BackendMessage, FrontendMessage, PgError, PgResult, Severity, SqlState, StartupRequest,
};
use crate::projector::project;
use crate::schema::SchemaRegistry;
use crate::sqlite::{SqliteConnection, SqliteError};
use crate::translate::{self, Statement, StatementKind, TranslateError, TranslatedStatement};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingStartup,
    Ready,
    Terminated,
}

/// Reply to a startup-phase packet.
#[derive(Debug, Clone, PartialEq)]
pub enum StartupReply {
    /// Handshake complete; send these messages.
    Accepted(Vec<BackendMessage>),
    /// Answer with the single decline byte and wait for another startup packet.
    EncryptionDeclined,
    /// Close the connection without replying.
    Close,
}

/// Why a statement failed. Sent to the client as an ErrorResponse.
#[derive(Error, Debug)]
enum StatementError {
    #[error(transparent)]
    Translate(#[from] TranslateError),

    #[error("{}", .0.client_message())]
    Engine(#[from] SqliteError),
}

impl StatementError {
    fn sql_state(&self) -> SqlState {
        match self {
            StatementError::Translate(e) => e.sql_state(),
            StatementError::Engine(e) => e.sql_state(),
        }
    }
}

pub struct Session {
    state: SessionState,
    config: Arc<ServerConfig>,
    engine: Arc<SqliteConnection>,
    registry: SchemaRegistry,
    parameters: HashMap<String, String>,
    pending_completions: VecDeque<BackendMessage>,
    process_id: i32,
    secret_key: i32,
}

impl Session {
    pub fn new(
        config: Arc<ServerConfig>,
        engine: Arc<SqliteConnection>,
        registry: SchemaRegistry,
        process_id: i32,
        secret_key: i32,
    ) -> Self {
        Self {
            state: SessionState::AwaitingStartup,
            config,
            engine,
            registry,
            parameters: HashMap::new(),
            pending_completions: VecDeque::new(),
            process_id,
            secret_key,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state == SessionState::Terminated
    }

    pub fn process_id(&self) -> i32 {
        self.process_id
    }

    pub fn secret_key(&self) -> i32 {
        self.secret_key
    }

    /// A startup parameter the client sent, e.g. `user` or `database`.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    pub fn pending_completions(&self) -> usize {
        self.pending_completions.len()
    }

    pub fn handle_startup(&mut self, request: StartupRequest) -> PgResult<StartupReply> {
        if self.state != SessionState::AwaitingStartup {
            return Err(PgError::Protocol(
                "Startup packet after startup completed".to_string(),
            ));
        }

        match request {
            StartupRequest::Startup { parameters } => {
                self.parameters = parameters.into_iter().collect();
                info!(
                    user = self.parameter("user").unwrap_or(""),
                    database = self.parameter("database").unwrap_or(""),
                    "client authenticated"
                );

                let mut out = vec![BackendMessage::AuthenticationOk];
                for (name, value) in self.config.parameter_statuses() {
                    out.push(BackendMessage::ParameterStatus {
                        name: name.to_string(),
                        value: value.to_string(),
                    });
                }
                out.push(BackendMessage::BackendKeyData {
                    process_id: self.process_id,
                    secret_key: self.secret_key,
                });
                out.push(BackendMessage::ready());

                self.state = SessionState::Ready;
                Ok(StartupReply::Accepted(out))
            }
            StartupRequest::SslRequest | StartupRequest::GssEncRequest => {
                warn!("declining encryption request");
                Ok(StartupReply::EncryptionDeclined)
            }
            StartupRequest::CancelRequest { process_id, .. } => {
                info!(target_pid = process_id, "cancel request ignored");
                self.state = SessionState::Terminated;
                Ok(StartupReply::Close)
            }
        }
    }

    /// Handle one post-startup message.
    ///
    /// Statement failures are answered in-band; an `Err` means the connection
    /// has to be closed.
    pub async fn handle_message(
        &mut self,
        message: FrontendMessage,
    ) -> PgResult<Vec<BackendMessage>> {
        match self.state {
            SessionState::Terminated => return Ok(Vec::new()),
            SessionState::AwaitingStartup => {
                return Err(PgError::Protocol(format!(
                    "Unexpected message '{}' before startup",
                    char::from(message.tag())
                )))
            }
            SessionState::Ready => {}
        }

        match message {
            FrontendMessage::Query(sql) => Ok(self.simple_query(&sql).await),
            FrontendMessage::Sync => {
                let mut out: Vec<BackendMessage> = self.pending_completions.drain(..).collect();
                out.push(BackendMessage::ready());
                Ok(out)
            }
            FrontendMessage::Terminate => {
                debug!("client terminated");
                self.state = SessionState::Terminated;
                self.pending_completions.clear();
                Ok(Vec::new())
            }
            FrontendMessage::Unknown { tag, payload } => {
                warn!(
                    tag = %char::from(tag),
                    len = payload.len(),
                    "ignoring unsupported message"
                );
                Ok(Vec::new())
            }
        }
    }

    async fn simple_query(&mut self, sql: &str) -> Vec<BackendMessage> {
        if translate::normalize(sql).is_empty() {
            return vec![BackendMessage::EmptyQueryResponse, BackendMessage::ready()];
        }

        match self.execute(sql).await {
            Ok(out) => out,
            Err(e) => {
                error!(code = %e.sql_state(), error = %e, query = %sql, "statement failed");
                vec![
                    BackendMessage::error(Severity::Error, e.sql_state(), e.to_string()),
                    BackendMessage::ready(),
                ]
            }
        }
    }

    async fn execute(&mut self, sql: &str) -> Result<Vec<BackendMessage>, StatementError> {
        let stmt = translate::parse(sql)?;
        debug!(kind = %stmt.kind(), translated = %stmt.translated, "translated statement");

        let mut out = Vec::new();
        match &stmt.statement {
            Statement::CreateTable(create) => {
                self.engine.query(&stmt.translated, &[]).await?;
                self.registry.register(create);
                out.push(BackendMessage::command_complete(
                    StatementKind::CreateTable.keyword(),
                ));
            }
            Statement::Drop { table, .. } => {
                self.engine.query(&stmt.translated, &[]).await?;
                if let Some(table) = table {
                    self.registry.drop_table(table);
                }
                out.push(BackendMessage::command_complete(
                    StatementKind::Drop.keyword(),
                ));
            }
            Statement::Select { .. } => {
                let result = self.engine.query(&stmt.translated, &[]).await?;
                let projection = project(&result, stmt.source_table(), &self.registry);
                let count = projection.row_count();
                out.extend(projection.into_messages());
                out.push(BackendMessage::command_complete(format!("SELECT {}", count)));
            }
            Statement::Insert(insert) if insert.returning.is_some() => {
                return self.insert_returning(&stmt).await;
            }
            Statement::Insert(_) | Statement::Update { .. } | Statement::Delete { .. } => {
                let result = self.engine.query_counted(&stmt.translated, &[]).await?;
                out.push(BackendMessage::command_complete(format!(
                    "{} 0 {}",
                    stmt.kind().keyword(),
                    result.rows_affected
                )));
            }
        }

        out.push(BackendMessage::ready());
        Ok(out)
    }

    async fn insert_returning(
        &mut self,
        stmt: &TranslatedStatement,
    ) -> Result<Vec<BackendMessage>, StatementError> {
        let result = self.engine.query_counted(&stmt.translated, &[]).await?;
        let projection = project(&result, stmt.source_table(), &self.registry);

        let mut out: Vec<BackendMessage> = projection.into_messages().collect();
        let complete = BackendMessage::command_complete(format!("INSERT 0 {}", result.rows_affected));

        match self.config.returning_completion {
            ReturningCompletion::Deferred => self.pending_completions.push_back(complete),
            ReturningCompletion::Immediate => {
                out.push(complete);
                out.push(BackendMessage::ready());
            }
        }
        Ok(out)
    }
}

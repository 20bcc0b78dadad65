use std::collections::HashSet;
use std::sync::Arc;

use metrics::counter;
use shardgate_core::{PreparedStatementRegistry, ShardgateError};
use shardgate_protocol::messages::{Command, CommandFrame};
use shardgate_protocol::sequence::{
    build_error_response, build_ok_response, build_prepare_response, ResponseSequence,
};
use tracing::{debug, warn};

pub const ER_BAD_DB_ERROR: u16 = 1049;
pub const ER_UNKNOWN_COM_ERROR: u16 = 1047;
pub const ER_PARSE_ERROR: u16 = 1064;
pub const ER_NOT_SUPPORTED_YET: u16 = 1235;
pub const ER_UNKNOWN_STMT_HANDLER: u16 = 1243;

/// What the connection loop should do after a command was handled.
#[derive(Debug, PartialEq, Eq)]
pub enum Dispatch {
    Respond(ResponseSequence),
    /// COM_STMT_CLOSE gets no response of any kind.
    None,
    Quit,
}

/// Per-connection state. Statement ids issued to this connection are tracked
/// so they can be evicted from the shared registry when the client goes away.
#[derive(Debug, Default)]
pub struct Session {
    statements: HashSet<u32>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    fn track(&mut self, statement_id: u32) {
        self.statements.insert(statement_id);
    }

    fn forget(&mut self, statement_id: u32) {
        self.statements.remove(&statement_id);
    }

    /// Drop every statement this connection still holds.
    pub fn close(&mut self, registry: &PreparedStatementRegistry) {
        for statement_id in self.statements.drain() {
            registry.remove(statement_id);
        }
    }
}

/// Routes decoded command frames to the registry and the SQL resolver and
/// assembles the response sequence for each.
pub struct CommandDispatcher {
    registry: Arc<PreparedStatementRegistry>,
    logic_schema: String,
}

impl CommandDispatcher {
    pub fn new(registry: Arc<PreparedStatementRegistry>, logic_schema: String) -> Self {
        Self {
            registry,
            logic_schema,
        }
    }

    /// Handle one command. Errors returned here are connection-fatal; every
    /// recoverable failure is answered in-band with an ERR packet.
    pub fn handle(
        &self,
        session: &mut Session,
        frame: &CommandFrame,
    ) -> Result<Dispatch, ShardgateError> {
        counter!("command_total").increment(1);
        let sequence_id = frame.sequence_id;
        match &frame.command {
            Command::StmtPrepare { sql } => self.prepare(session, sequence_id, sql),
            Command::StmtExecute { statement_id } => {
                Ok(Dispatch::Respond(self.execute(sequence_id, *statement_id)))
            }
            Command::StmtClose { statement_id } => {
                self.registry.remove(*statement_id);
                session.forget(*statement_id);
                debug!(statement_id, "closed prepared statement");
                Ok(Dispatch::None)
            }
            Command::InitDb { schema } => {
                if schema == &self.logic_schema {
                    Ok(Dispatch::Respond(build_ok_response(sequence_id)))
                } else {
                    Ok(Dispatch::Respond(build_error_response(
                        sequence_id,
                        ER_BAD_DB_ERROR,
                        "42000",
                        format!("Unknown database '{schema}'"),
                    )))
                }
            }
            Command::Query { .. } => Ok(Dispatch::Respond(build_error_response(
                sequence_id,
                ER_NOT_SUPPORTED_YET,
                "42000",
                "Query execution is not routed through this endpoint".into(),
            ))),
            Command::Ping => Ok(Dispatch::Respond(build_ok_response(sequence_id))),
            Command::Quit => Ok(Dispatch::Quit),
            Command::Unsupported { tag } => Ok(Dispatch::Respond(build_error_response(
                sequence_id,
                ER_UNKNOWN_COM_ERROR,
                "08S01",
                format!("Unknown command {tag:#04x}"),
            ))),
        }
    }

    fn prepare(
        &self,
        session: &mut Session,
        sequence_id: u8,
        sql: &str,
    ) -> Result<Dispatch, ShardgateError> {
        match shardgate_sql::resolve(sql) {
            Ok(shape) => {
                // Exhaustion of the identifier space propagates and kills the
                // connection; nothing sane can be answered at that point.
                let statement_id = self.registry.register(sql, shape.clone())?;
                session.track(statement_id);
                counter!("prepare_success_total").increment(1);
                debug!(
                    statement_id,
                    parameters = shape.parameter_count,
                    columns = shape.result_column_count,
                    "registered prepared statement"
                );
                Ok(Dispatch::Respond(build_prepare_response(
                    sequence_id,
                    statement_id,
                    &shape,
                    &self.logic_schema,
                )))
            }
            Err(ShardgateError::Parse(message)) => {
                counter!("prepare_error_total").increment(1);
                warn!(error = %message, "rejecting statement that failed to parse");
                Ok(Dispatch::Respond(build_error_response(
                    sequence_id,
                    ER_PARSE_ERROR,
                    "42000",
                    message,
                )))
            }
            Err(err) => Err(err),
        }
    }

    fn execute(&self, sequence_id: u8, statement_id: u32) -> ResponseSequence {
        match self.registry.lookup(statement_id) {
            // The execution pipeline lives behind the sharding router; this
            // front end only validates the handle.
            Some(_) => build_error_response(
                sequence_id,
                ER_NOT_SUPPORTED_YET,
                "42000",
                "Statement execution is not routed through this endpoint".into(),
            ),
            None => build_error_response(
                sequence_id,
                ER_UNKNOWN_STMT_HANDLER,
                "HY000",
                format!("Unknown prepared statement handler ({statement_id}) given to EXECUTE"),
            ),
        }
    }
}

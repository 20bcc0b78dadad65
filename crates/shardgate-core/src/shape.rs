use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementKind {
    Select,
    Insert,
    Other,
}

/// Structural summary of a statement, derived once at prepare time.
/// Counts are u16 because the prepare acknowledgement carries them as
/// 2-byte wire fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementShape {
    pub kind: StatementKind,
    pub parameter_count: u16,
    pub result_column_count: u16,
    /// Present only when the statement unambiguously targets one table.
    pub target_table: Option<String>,
}

impl StatementShape {
    pub fn other() -> Self {
        Self {
            kind: StatementKind::Other,
            parameter_count: 0,
            result_column_count: 0,
            target_table: None,
        }
    }
}

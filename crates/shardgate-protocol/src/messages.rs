//! Typed command and response packets of the MySQL client/server protocol,
//! restricted to what the proxy front end speaks.

pub const COM_QUIT: u8 = 0x01;
pub const COM_INIT_DB: u8 = 0x02;
pub const COM_QUERY: u8 = 0x03;
pub const COM_PING: u8 = 0x0e;
pub const COM_STMT_PREPARE: u8 = 0x16;
pub const COM_STMT_EXECUTE: u8 = 0x17;
pub const COM_STMT_CLOSE: u8 = 0x19;

pub const OK_HEADER: u8 = 0x00;
pub const EOF_HEADER: u8 = 0xfe;
pub const ERR_HEADER: u8 = 0xff;

pub const MYSQL_TYPE_VARCHAR: u8 = 0x0f;
pub const CHARSET_UTF8_GENERAL_CI: u16 = 33;
pub const SERVER_STATUS_AUTOCOMMIT: u16 = 0x0002;

/// Column catalog is always the literal "def".
pub const CATALOG: &str = "def";

/// Column length advertised for placeholder column definitions; real lengths
/// are unknown before execution.
pub const PLACEHOLDER_COLUMN_LENGTH: u32 = 100;

/// One decoded inbound unit: connection-level sequence id plus the typed
/// command carried by the frame payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    pub sequence_id: u8,
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StmtPrepare { sql: String },
    StmtExecute { statement_id: u32 },
    StmtClose { statement_id: u32 },
    InitDb { schema: String },
    Query { sql: String },
    Ping,
    Quit,
    Unsupported { tag: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponsePacket {
    /// COM_STMT_PREPARE acknowledgement. Payload is exactly 12 bytes.
    PrepareOk {
        statement_id: u32,
        column_count: u16,
        parameter_count: u16,
        warnings: u16,
    },
    /// ColumnDefinition41.
    ColumnDefinition {
        schema: String,
        table: String,
        org_table: String,
        name: String,
        org_name: String,
        charset: u16,
        column_length: u32,
        column_type: u8,
        flags: u16,
        decimals: u8,
    },
    Eof {
        warnings: u16,
        status_flags: u16,
    },
    Ok {
        affected_rows: u64,
        last_insert_id: u64,
        status_flags: u16,
        warnings: u16,
    },
    Err {
        code: u16,
        /// Five-character SQLSTATE, e.g. "42000".
        sql_state: String,
        message: String,
    },
}

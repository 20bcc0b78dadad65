pub mod error;
pub mod registry;
pub mod shape;

pub use error::ShardgateError;
pub use registry::{PreparedStatement, PreparedStatementRegistry};
pub use shape::{StatementKind, StatementShape};

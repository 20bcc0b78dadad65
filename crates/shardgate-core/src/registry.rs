use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::ShardgateError;
use crate::shape::StatementShape;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedStatement {
    pub statement_id: u32,
    pub sql: String,
    pub shape: StatementShape,
}

/// Server-wide store of prepared statements, shared by every connection.
/// Identifiers are monotone and never reused for the life of the process.
#[derive(Debug, Default)]
pub struct PreparedStatementRegistry {
    next_id: AtomicU32,
    statements: RwLock<HashMap<u32, Arc<PreparedStatement>>>,
}

impl PreparedStatementRegistry {
    pub fn new() -> Self {
        Self {
            // MySQL statement ids start at 1; 0 is never handed out.
            next_id: AtomicU32::new(1),
            statements: RwLock::new(HashMap::new()),
        }
    }

    /// Allocate the next identifier and store the entry. Exhaustion of the
    /// 32-bit space is sticky: the counter never advances past its ceiling,
    /// so no identifier is ever issued twice.
    pub fn register(
        &self,
        sql: &str,
        shape: StatementShape,
    ) -> Result<u32, ShardgateError> {
        let statement_id = self.allocate_id()?;
        let entry = Arc::new(PreparedStatement {
            statement_id,
            sql: sql.to_string(),
            shape,
        });
        self.statements
            .write()
            .expect("registry lock poisoned")
            .insert(statement_id, entry);
        Ok(statement_id)
    }

    fn allocate_id(&self) -> Result<u32, ShardgateError> {
        let mut current = self.next_id.load(Ordering::Relaxed);
        loop {
            if current == u32::MAX {
                return Err(ShardgateError::RegistryExhausted);
            }
            match self.next_id.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(id) => return Ok(id),
                Err(observed) => current = observed,
            }
        }
    }

    pub fn lookup(&self, statement_id: u32) -> Option<Arc<PreparedStatement>> {
        self.statements
            .read()
            .expect("registry lock poisoned")
            .get(&statement_id)
            .cloned()
    }

    /// Idempotent: removing an unknown identifier is a no-op.
    pub fn remove(&self, statement_id: u32) {
        self.statements
            .write()
            .expect("registry lock poisoned")
            .remove(&statement_id);
    }

    pub fn len(&self) -> usize {
        self.statements
            .read()
            .expect("registry lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identifier the next `register` call would return.
    pub fn peek_next_id(&self) -> u32 {
        self.next_id.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{StatementKind, StatementShape};
    use std::thread;

    fn select_shape() -> StatementShape {
        StatementShape {
            kind: StatementKind::Select,
            parameter_count: 1,
            result_column_count: 2,
            target_table: Some("t".into()),
        }
    }

    #[test]
    fn register_lookup_round_trip() {
        let registry = PreparedStatementRegistry::new();
        let id = registry
            .register("SELECT a, b FROM t WHERE id = ?", select_shape())
            .expect("register");
        let entry = registry.lookup(id).expect("entry");
        assert_eq!(entry.sql, "SELECT a, b FROM t WHERE id = ?");
        assert_eq!(entry.shape, select_shape());
        assert_eq!(entry.statement_id, id);
    }

    #[test]
    fn lookup_unknown_id_is_none() {
        let registry = PreparedStatementRegistry::new();
        assert!(registry.lookup(42).is_none());
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = PreparedStatementRegistry::new();
        let id = registry.register("SELECT 1", StatementShape::other()).expect("register");
        registry.remove(id);
        assert!(registry.lookup(id).is_none());
        // Second removal of the same id and removal of a never-issued id are
        // both no-ops.
        registry.remove(id);
        registry.remove(9999);
        assert!(registry.is_empty());
    }

    #[test]
    fn ids_are_never_reused_after_remove() {
        let registry = PreparedStatementRegistry::new();
        let first = registry.register("SELECT 1", StatementShape::other()).expect("register");
        registry.remove(first);
        let second = registry.register("SELECT 2", StatementShape::other()).expect("register");
        assert!(second > first);
    }

    #[test]
    fn exhaustion_is_sticky() {
        let registry = PreparedStatementRegistry::new();
        registry.next_id.store(u32::MAX, Ordering::Relaxed);
        // Every attempt after the ceiling fails; the counter never wraps back
        // to 0 or re-issues low ids.
        for _ in 0..2 {
            let err = registry
                .register("SELECT 1", StatementShape::other())
                .expect_err("must fail");
            assert!(matches!(err, ShardgateError::RegistryExhausted));
        }
        assert!(registry.is_empty());
        assert_eq!(registry.peek_next_id(), u32::MAX);
    }

    #[test]
    fn concurrent_registration_yields_distinct_ids() {
        let registry = Arc::new(PreparedStatementRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(thread::spawn(move || {
                let mut ids = Vec::new();
                for _ in 0..200 {
                    ids.push(
                        registry
                            .register("SELECT 1", StatementShape::other())
                            .expect("register"),
                    );
                }
                ids
            }));
        }
        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.join().expect("join"));
        }
        all.sort_unstable();
        let before = all.len();
        all.dedup();
        assert_eq!(before, all.len());
        assert_eq!(registry.len(), before);
    }
}

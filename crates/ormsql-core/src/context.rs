//! Ambient database context.
//!
//! A [`Session`] carries a stack of [`DbContext`]s for one logical unit of
//! work. Only the innermost context is active; entering a scope pushes a
//! context and dropping the returned [`ContextGuard`] pops it again, so the
//! previous context is restored even on early return or error.

use parking_lot::Mutex;

use crate::cache::current_timestamp;

/// Connection and transaction state for database calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbContext {
    /// Logical database (connection) name.
    pub database: String,
    /// Connection string, if resolved.
    pub connection_string: Option<String>,
    /// Whether a transaction is open on this context.
    pub transaction_open: bool,
}

impl DbContext {
    /// Context for a named database.
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            connection_string: None,
            transaction_open: false,
        }
    }

    /// Attach a connection string.
    pub fn with_connection_string(mut self, connection_string: impl Into<String>) -> Self {
        self.connection_string = Some(connection_string.into());
        self
    }

    /// Same context with a transaction open.
    pub fn in_transaction(mut self) -> Self {
        self.transaction_open = true;
        self
    }
}

/// Context stack for one unit of work (a request, a job).
///
/// Sessions are not shared between units of work; each one owns its stack.
#[derive(Debug)]
pub struct Session {
    root: DbContext,
    stack: Mutex<Vec<DbContext>>,
    started_at: u64,
}

impl Session {
    /// Start a session on `root`.
    pub fn new(root: DbContext) -> Self {
        Self {
            root,
            stack: Mutex::new(Vec::new()),
            started_at: current_timestamp(),
        }
    }

    /// Make `context` active until the guard is dropped.
    pub fn enter(&self, context: DbContext) -> ContextGuard<'_> {
        let mut stack = self.stack.lock();
        stack.push(context);
        ContextGuard {
            session: self,
            depth: stack.len(),
        }
    }

    /// The active context.
    pub fn current(&self) -> DbContext {
        self.stack
            .lock()
            .last()
            .cloned()
            .unwrap_or_else(|| self.root.clone())
    }

    /// Number of entered scopes.
    pub fn depth(&self) -> usize {
        self.stack.lock().len()
    }

    /// Whether any context on the stack has a transaction open.
    pub fn has_open_transaction(&self) -> bool {
        self.root.transaction_open || self.stack.lock().iter().any(|c| c.transaction_open)
    }

    /// When the session started (microseconds since epoch).
    pub fn started_at(&self) -> u64 {
        self.started_at
    }
}

/// Scope of an entered context. Pops it on drop.
#[must_use = "the context is popped as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ContextGuard<'a> {
    session: &'a Session,
    depth: usize,
}

impl ContextGuard<'_> {
    /// The context this guard entered.
    pub fn context(&self) -> DbContext {
        self.session
            .stack
            .lock()
            .get(self.depth - 1)
            .cloned()
            .unwrap_or_else(|| self.session.root.clone())
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        // Scopes entered after this one leave with it.
        self.session.stack.lock().truncate(self.depth - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_context() {
        let session = Session::new(DbContext::new("AppDatabase"));
        assert_eq!(session.current().database, "AppDatabase");
        assert_eq!(session.depth(), 0);
        assert!(!session.has_open_transaction());
    }

    #[test]
    fn test_nested_scopes_restore() {
        let session = Session::new(DbContext::new("AppDatabase"));
        {
            let _reporting = session.enter(DbContext::new("Reporting"));
            assert_eq!(session.current().database, "Reporting");
            {
                let inner = session.enter(DbContext::new("Archive"));
                assert_eq!(inner.context().database, "Archive");
                assert_eq!(session.depth(), 2);
            }
            assert_eq!(session.current().database, "Reporting");
        }
        assert_eq!(session.current().database, "AppDatabase");
        assert_eq!(session.depth(), 0);
    }

    #[test]
    fn test_restored_on_error_path() {
        fn failing(session: &Session) -> Result<(), &'static str> {
            let _guard = session.enter(DbContext::new("Other"));
            Err("boom")
        }

        let session = Session::new(DbContext::new("AppDatabase"));
        assert!(failing(&session).is_err());
        assert_eq!(session.current().database, "AppDatabase");
    }

    #[test]
    fn test_transaction_visible_from_inner_scope() {
        let session = Session::new(DbContext::new("AppDatabase"));
        let _tx = session.enter(DbContext::new("AppDatabase").in_transaction());
        let _inner = session.enter(DbContext::new("AppDatabase"));
        assert!(session.has_open_transaction());
    }
}

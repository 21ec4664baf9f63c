//! Cache keys.
//!
//! A prepared statement is cached per `(connection, prepare method, args)`.
//! Two physical connections never share cached statements, so the
//! connection part of the key is an identity token, not a value.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identity token for one raw database connection.
///
/// Allocated when the pool creates the connection and carried alongside it
/// for the connection's lifetime. Ids are never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the id for a newly created connection.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which preparation variant produced the statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrepareMethod {
    /// Parameterized statement.
    Prepare,
    /// Stored procedure call.
    PrepareCall,
}

impl fmt::Display for PrepareMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrepareMethod::Prepare => write!(f, "prepare"),
            PrepareMethod::PrepareCall => write!(f, "prepare_call"),
        }
    }
}

/// One prepare argument: the SQL text or a driver flag.
///
/// Equality is structural and order-sensitive within the args list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PrepareArg {
    Null,
    Int(i32),
    Text(String),
    Ints(Vec<i32>),
    Texts(Vec<String>),
}

impl fmt::Display for PrepareArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrepareArg::Null => write!(f, "null"),
            PrepareArg::Int(value) => write!(f, "{}", value),
            PrepareArg::Text(value) => write!(f, "{}", value),
            PrepareArg::Ints(values) => write!(f, "{:?}", values),
            PrepareArg::Texts(values) => write!(f, "{:?}", values),
        }
    }
}

/// Key for one cached prepared statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatementKey {
    connection: ConnectionId,
    method: PrepareMethod,
    args: Vec<PrepareArg>,
}

impl StatementKey {
    pub fn new(connection: ConnectionId, method: PrepareMethod, args: Vec<PrepareArg>) -> Self {
        Self {
            connection,
            method,
            args,
        }
    }

    /// Key for a plain parameterized prepare of the given SQL.
    pub fn prepare(connection: ConnectionId, sql: impl Into<String>) -> Self {
        Self::new(
            connection,
            PrepareMethod::Prepare,
            vec![PrepareArg::Text(sql.into())],
        )
    }

    /// Key for a stored procedure prepare of the given SQL.
    pub fn prepare_call(connection: ConnectionId, sql: impl Into<String>) -> Self {
        Self::new(
            connection,
            PrepareMethod::PrepareCall,
            vec![PrepareArg::Text(sql.into())],
        )
    }

    /// Connection this key belongs to.
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    pub fn method(&self) -> PrepareMethod {
        self.method
    }

    pub fn args(&self) -> &[PrepareArg] {
        &self.args
    }
}

impl fmt::Display for StatementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "connection {}, method {}, args [",
            self.connection, self.method
        )?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", arg)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_connection_ids_unique() {
        let first = ConnectionId::next();
        let second = ConnectionId::next();
        assert_ne!(first, second);
    }

    #[test]
    fn test_key_equality_structural() {
        let conn = ConnectionId::next();
        let one = StatementKey::prepare(conn, "SELECT 1");
        let two = StatementKey::prepare(conn, "SELECT 1");
        assert_eq!(one, two);

        let other_conn = StatementKey::prepare(ConnectionId::next(), "SELECT 1");
        assert_ne!(one, other_conn);

        let call = StatementKey::prepare_call(conn, "SELECT 1");
        assert_ne!(one, call);
    }

    #[test]
    fn test_args_order_sensitive() {
        let conn = ConnectionId::next();
        let args = vec![PrepareArg::Text("SELECT 1".into()), PrepareArg::Int(1003)];
        let reversed = vec![PrepareArg::Int(1003), PrepareArg::Text("SELECT 1".into())];
        assert_ne!(
            StatementKey::new(conn, PrepareMethod::Prepare, args),
            StatementKey::new(conn, PrepareMethod::Prepare, reversed),
        );
    }

    #[test]
    fn test_null_arg_safe() {
        let conn = ConnectionId::next();
        let with_null = StatementKey::new(
            conn,
            PrepareMethod::Prepare,
            vec![PrepareArg::Text("SELECT 1".into()), PrepareArg::Null],
        );
        let without = StatementKey::prepare(conn, "SELECT 1");
        assert_ne!(with_null, without);
        assert_eq!(with_null, with_null.clone());
    }

    #[test]
    fn test_key_usable_in_map() {
        let conn = ConnectionId::next();
        let mut map = HashMap::new();
        map.insert(StatementKey::prepare(conn, "SELECT 1"), 1);
        map.insert(StatementKey::prepare(conn, "SELECT 2"), 2);
        assert_eq!(map.get(&StatementKey::prepare(conn, "SELECT 1")), Some(&1));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_display() {
        let conn = ConnectionId::next();
        let key = StatementKey::new(
            conn,
            PrepareMethod::Prepare,
            vec![PrepareArg::Text("SELECT 1".into()), PrepareArg::Int(1003)],
        );
        assert_eq!(
            key.to_string(),
            format!("connection {}, method prepare, args [SELECT 1, 1003]", conn)
        );
    }
}

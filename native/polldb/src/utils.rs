/// Utility functions and helpers for PollDb
///
/// This module provides commonly used helper functions for locking, for splitting
/// multi-statement SQL, and for converting libsql rows into the engine's value model.
use crate::error::Error;
use crate::models::{RowSet, Value};
use libsql::Rows;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

/// Safely lock a mutex with proper error handling
///
/// Returns a descriptive error if the mutex is poisoned.
pub fn safe_lock<'a, T>(mutex: &'a Mutex<T>, context: &str) -> Result<MutexGuard<'a, T>, Error> {
    mutex
        .lock()
        .map_err(|e| Error::LockPoisoned(format!("{context}: {e}")))
}

/// Safely lock an Arc<Mutex<T>> with proper error handling
///
/// Returns a descriptive error if the mutex is poisoned.
pub fn safe_lock_arc<'a, T>(
    arc_mutex: &'a Arc<Mutex<T>>,
    context: &str,
) -> Result<MutexGuard<'a, T>, Error> {
    arc_mutex
        .lock()
        .map_err(|e| Error::LockPoisoned(format!("{context} (arc): {e}")))
}

/// Lock a mutex whose data stays valid even if a holder panicked.
///
/// Used on the worker and completion paths, where refusing to make progress would
/// strand queued jobs.
pub fn lock_recovering<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Lock a mutex only if nobody holds it.
///
/// Returns `Ok(None)` when the lock is busy, so callers on latency-sensitive
/// threads can skip the work instead of waiting.
pub fn try_lock_now<'a, T>(
    mutex: &'a Mutex<T>,
    context: &str,
) -> Result<Option<MutexGuard<'a, T>>, Error> {
    match mutex.try_lock() {
        Ok(guard) => Ok(Some(guard)),
        Err(TryLockError::WouldBlock) => Ok(None),
        Err(TryLockError::Poisoned(e)) => Err(Error::LockPoisoned(format!("{context}: {e}"))),
    }
}

/// Split SQL text into its statements, in order.
///
/// Semicolons inside string literals, quoted identifiers (`"x"`, `` `x` ``,
/// `[x]`), comments, and the body of a `CREATE TRIGGER ... END` do not end a
/// statement. Statements are trimmed; empty and comment-only pieces are dropped.
pub fn split_statements(sql: &str) -> Vec<&str> {
    let bytes = sql.as_bytes();
    let len = bytes.len();
    let mut statements = Vec::new();
    let mut start = 0;
    let mut has_code = false;
    let mut i = 0;

    while i < len {
        match bytes[i] {
            quote @ (b'\'' | b'"' | b'`') => {
                has_code = true;
                i += 1;
                while i < len {
                    if bytes[i] == quote {
                        // Doubled quote is an escaped quote
                        if i + 1 < len && bytes[i + 1] == quote {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
            }
            b'[' => {
                has_code = true;
                while i < len && bytes[i] != b']' {
                    i += 1;
                }
            }
            b'-' if i + 1 < len && bytes[i + 1] == b'-' => {
                while i < len && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if i + 1 < len && bytes[i + 1] == b'*' => {
                i += 2;
                while i + 1 < len && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i += 1;
            }
            b';' => {
                let piece = &sql[start..i];
                if !is_open_trigger(piece) {
                    if has_code {
                        push_statement(&mut statements, piece);
                    }
                    start = i + 1;
                    has_code = false;
                }
            }
            c if !c.is_ascii_whitespace() => has_code = true,
            _ => {}
        }
        i += 1;
    }

    if has_code {
        push_statement(&mut statements, &sql[start..]);
    }
    statements
}

fn push_statement<'a>(statements: &mut Vec<&'a str>, piece: &'a str) {
    let trimmed = piece.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed);
    }
}

fn sql_words(sql: &str) -> impl Iterator<Item = &str> {
    sql.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|word| !word.is_empty())
}

// A trigger body runs until the `END` that closes it.
fn is_open_trigger(piece: &str) -> bool {
    let mut words = sql_words(piece);
    if !words.next().is_some_and(|w| w.eq_ignore_ascii_case("CREATE")) {
        return false;
    }
    let is_trigger = match words.next() {
        Some(w) if w.eq_ignore_ascii_case("TEMP") || w.eq_ignore_ascii_case("TEMPORARY") => {
            words.next().is_some_and(|w| w.eq_ignore_ascii_case("TRIGGER"))
        }
        Some(w) => w.eq_ignore_ascii_case("TRIGGER"),
        None => false,
    };
    is_trigger && !sql_words(piece).last().is_some_and(|w| w.eq_ignore_ascii_case("END"))
}

pub fn value_from_libsql(value: libsql::Value) -> Value {
    match value {
        libsql::Value::Null => Value::Null,
        libsql::Value::Integer(v) => Value::Integer(v),
        libsql::Value::Real(v) => Value::Real(v),
        libsql::Value::Text(v) => Value::Text(v),
        libsql::Value::Blob(v) => Value::Blob(v),
    }
}

/// Collect rows from a libsql result into a `RowSet`
///
/// Returns `None` for statements that expose no columns at all.
pub async fn collect_rows(mut rows: Rows) -> Result<Option<RowSet>, libsql::Error> {
    let column_count = rows.column_count();
    if column_count <= 0 {
        return Ok(None);
    }

    let columns: Vec<String> = (0..column_count)
        .map(|i| {
            rows.column_name(i)
                .map_or_else(|| format!("col{i}"), ToString::to_string)
        })
        .collect();

    let mut collected: Vec<Vec<Value>> = Vec::new();
    while let Some(row) = rows.next().await? {
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..column_count {
            values.push(value_from_libsql(row.get::<libsql::Value>(i)?));
        }
        collected.push(values);
    }

    Ok(Some(RowSet {
        columns,
        rows: collected,
    }))
}

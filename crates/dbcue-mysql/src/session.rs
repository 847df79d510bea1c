// crates/dbcue-mysql/src/session.rs
// ============================================================================
// Module: Session Registry Access
// Description: Introspection and cancellation of blocked MySQL sessions.
// Purpose: Discover sessions sleeping on a barrier tag and cancel their
//          in-flight statements.
// Dependencies: dbcue-core, sqlx, tracing
// ============================================================================

//! ## Overview
//! The wait barrier registers a waiter by running a sleep statement whose
//! literal text embeds the barrier tag. This module is the other half of the
//! mechanism: it lists sessions currently in `User sleep` state from
//! `information_schema.PROCESSLIST`, filters them with an EXACT statement
//! template match, and cancels a chosen session with `KILL QUERY`.
//!
//! Invariants:
//! - Template matching is exact, never prefix or substring: a barrier named
//!   `jobs` must not match a waiter of `jobs-retry`.
//! - Session ordering is oldest wait first (largest `TIME`), session id
//!   ascending on ties.
//! - Killing a session that already expired (error 1094) is a no-op, not a
//!   failure; the race is inherent to remote cancellation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use dbcue_core::CoordError;
use sqlx::Executor;
use sqlx::Row;
use sqlx::mysql::MySqlConnection;
use sqlx::mysql::MySqlDatabaseError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// MySQL error number for `KILL QUERY` on a session that no longer exists.
pub(crate) const ER_NO_SUCH_THREAD: u32 = 1094;

/// MySQL error number raised in some server versions when a statement is
/// killed mid-flight instead of `SLEEP()` returning 1.
pub(crate) const ER_QUERY_INTERRUPTED: u32 = 1317;

/// Longest accepted queue or barrier name.
pub const MAX_NAME_LENGTH: usize = 120;

/// Registry listing of sessions blocked in a user sleep.
///
/// `TIME DESC` puts the session that has been sleeping longest (the oldest
/// registered waiter) first; `ID ASC` breaks ties deterministically.
const LIST_SESSIONS_QUERY: &str = "SELECT ID, INFO \
     FROM information_schema.PROCESSLIST \
     WHERE COMMAND = 'Query' AND STATE = 'User sleep' \
     ORDER BY TIME DESC, ID ASC";

// ============================================================================
// SECTION: Name Validation
// ============================================================================

/// Validates a queue or barrier name.
///
/// Names are embedded verbatim inside statement literals, so the accepted
/// alphabet is restricted to `[A-Za-z0-9_.:-]` and the length is bounded.
///
/// # Errors
///
/// Returns [`CoordError::InvalidName`] for empty, over-long, or
/// out-of-alphabet names.
pub fn validate_name(name: &str) -> Result<(), CoordError> {
    if name.is_empty() {
        return Err(CoordError::InvalidName("name is empty".to_string()));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(CoordError::InvalidName(format!(
            "name exceeds {MAX_NAME_LENGTH} bytes: {name}"
        )));
    }
    let accepted =
        |b: u8| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b':' | b'-');
    if !name.bytes().all(accepted) {
        return Err(CoordError::InvalidName(format!(
            "name contains characters outside [A-Za-z0-9_.:-]: {name}"
        )));
    }
    Ok(())
}

// ============================================================================
// SECTION: Statement Template
// ============================================================================

/// Renders the sleep statement registering a waiter under `tag`.
///
/// The statement must be executed unprepared (text protocol) so the literal
/// tag is visible in the session registry. Seconds are rendered with
/// millisecond precision, matching what [`matches_sleep_statement`] accepts.
pub(crate) fn sleep_statement(tag: &str, duration: Duration) -> String {
    format!("SELECT SLEEP({:.3}), '{tag}'", duration.as_secs_f64())
}

/// Returns `true` when `info` is exactly a sleep statement for `tag`.
///
/// Accepts `SELECT SLEEP(<digits-and-dots>), '<tag>'` and nothing else; any
/// prefix, suffix, or differing tag is rejected.
pub(crate) fn matches_sleep_statement(info: &str, tag: &str) -> bool {
    let Some(rest) = info.strip_prefix("SELECT SLEEP(") else {
        return false;
    };
    let Some(close) = rest.find(')') else {
        return false;
    };
    let seconds = &rest[..close];
    if seconds.is_empty() || !seconds.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return false;
    }
    let Some(rest) = rest[close + 1..].strip_prefix(", '") else {
        return false;
    };
    rest.strip_suffix('\'') == Some(tag)
}

// ============================================================================
// SECTION: Registry Operations
// ============================================================================

/// Lists session ids sleeping under `tag`, oldest wait first.
///
/// # Errors
///
/// Returns [`CoordError::Connectivity`] when the registry query fails.
pub(crate) async fn sleeping_sessions(
    conn: &mut MySqlConnection,
    tag: &str,
) -> Result<Vec<u64>, CoordError> {
    let rows = (&mut *conn)
        .fetch_all(LIST_SESSIONS_QUERY)
        .await
        .map_err(connectivity)?;

    let mut sessions = Vec::new();
    for row in rows {
        let info: Option<String> = row.try_get(1).map_err(connectivity)?;
        if info.as_deref().is_some_and(|statement| matches_sleep_statement(statement, tag)) {
            sessions.push(row.try_get::<u64, _>(0).map_err(connectivity)?);
        }
    }
    Ok(sessions)
}

/// Cancels the in-flight statement of `session_id`.
///
/// Returns `false` when the session was already gone.
///
/// # Errors
///
/// Returns [`CoordError::Connectivity`] when the kill fails for any reason
/// other than the session having expired.
pub(crate) async fn kill_session_query(
    conn: &mut MySqlConnection,
    session_id: u64,
) -> Result<bool, CoordError> {
    tracing::debug!(session_id, "cancelling sleeping session");
    // KILL does not accept placeholders; the id comes from the registry, not
    // from caller input.
    let statement = format!("KILL QUERY {session_id}");
    match (&mut *conn).execute(statement.as_str()).await {
        Ok(_) => Ok(true),
        Err(err) if mysql_error_number(&err) == Some(ER_NO_SUCH_THREAD) => {
            tracing::debug!(session_id, "session expired before cancellation");
            Ok(false)
        }
        Err(err) => Err(connectivity(err)),
    }
}

// ============================================================================
// SECTION: Error Mapping
// ============================================================================

/// Maps a backend failure onto the coordination taxonomy.
pub(crate) fn connectivity(err: sqlx::Error) -> CoordError {
    CoordError::Connectivity(err.to_string())
}

/// Extracts the MySQL server error number, when present.
pub(crate) fn mysql_error_number(err: &sqlx::Error) -> Option<u32> {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .try_downcast_ref::<MySqlDatabaseError>()
            .map(|db_err| u32::from(db_err.number())),
        _ => None,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions and helpers are permitted."
)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn template_matches_own_statement() {
        let statement = sleep_statement("dbcue:jobs", Duration::from_millis(12_345));
        assert_eq!(statement, "SELECT SLEEP(12.345), 'dbcue:jobs'");
        assert!(matches_sleep_statement(&statement, "dbcue:jobs"));
    }

    #[test]
    fn template_rejects_other_tags_and_lookalikes() {
        let statement = sleep_statement("dbcue:jobs", Duration::from_secs(30));
        assert!(!matches_sleep_statement(&statement, "dbcue:jobs-retry"));
        assert!(!matches_sleep_statement(&statement, "dbcue:job"));
        assert!(!matches_sleep_statement("SELECT SLEEP(30.000), 'dbcue:jobs' -- x", "dbcue:jobs"));
        assert!(!matches_sleep_statement("SELECT 1", "dbcue:jobs"));
        assert!(!matches_sleep_statement("SELECT SLEEP(abc), 'dbcue:jobs'", "dbcue:jobs"));
        assert!(!matches_sleep_statement("", "dbcue:jobs"));
    }

    #[test]
    fn template_rejects_prefix_of_longer_tag() {
        // A registered waiter of the longer name must not be woken by the
        // shorter one.
        let statement = sleep_statement("dbcue:queue-a-b", Duration::from_secs(1));
        assert!(!matches_sleep_statement(&statement, "dbcue:queue-a"));
    }

    #[test]
    fn name_validation_accepts_the_documented_alphabet() {
        validate_name("orders").expect("plain name");
        validate_name("orders-eu.west:1_x").expect("full alphabet");
    }

    #[test]
    fn name_validation_rejects_hostile_or_oversized_names() {
        assert!(validate_name("").is_err());
        assert!(validate_name("a'); KILL QUERY 1; --").is_err());
        assert!(validate_name("white space").is_err());
        assert!(validate_name(&"x".repeat(MAX_NAME_LENGTH + 1)).is_err());
    }

    proptest! {
        #[test]
        fn any_valid_name_round_trips_through_the_template(
            name in "[A-Za-z0-9_.:-]{1,64}",
            millis in 1u64..600_000,
        ) {
            validate_name(&name).expect("generated name is valid");
            let tag = format!("dbcue:{name}");
            let statement = sleep_statement(&tag, Duration::from_millis(millis));
            prop_assert!(matches_sleep_statement(&statement, &tag));
            let mismatched_tag = format!("{tag}x");
            prop_assert!(!matches_sleep_statement(&statement, &mismatched_tag));
        }
    }
}

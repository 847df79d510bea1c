// system-tests/src/lib.rs
// ============================================================================
// Module: DBCUE System Tests Library
// Description: Crate anchor for the MySQL-backed system-test binaries.
// Purpose: Host the system-tests package; shared fixtures live under
//          tests/helpers.
// Dependencies: std
// ============================================================================

//! ## Overview
//! This crate exists to own the system-test binaries in `system-tests/tests`.
//! The suites are gated behind the `system-tests` cargo feature because they
//! need a reachable MySQL (either `DBCUE_SYSTEM_MYSQL_URL` or a local Docker
//! daemon for testcontainers); default `cargo test` runs none of them.

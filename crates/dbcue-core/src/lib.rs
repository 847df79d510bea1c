// crates/dbcue-core/src/lib.rs
// ============================================================================
// Module: DBCUE Core
// Description: Store-agnostic coordination surface.
// Purpose: Define the error taxonomy, payload codec seam, blocking queue
//          contract, and future joiner shared by every store backend.
// Dependencies: async-trait, serde, serde_json, thiserror, tokio, tokio-util
// ============================================================================

//! ## Overview
//! dbcue builds cross-process coordination primitives on top of a shared
//! passive relational store. This crate holds everything that does not touch
//! a concrete store: the [`CoordError`] taxonomy, the [`PayloadCodec`] seam
//! for caller-supplied serialization, the [`BlockingQueue`] capability
//! contract, and the [`join_all`]/[`join_all_within`] future joiner.
//!
//! Store backends (for example `dbcue-mysql`) implement the contract; the
//! trait is the substitution point for stores with different native
//! wait/notify primitives.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod codec;
pub mod collection;
pub mod error;
pub mod join;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use codec::JsonCodec;
pub use codec::PayloadCodec;
pub use collection::BlockingQueue;
pub use collection::TAKE_POLL_SEGMENT;
pub use collection::UNBOUNDED_CAPACITY;
pub use error::CoordError;
pub use join::join_all;
pub use join::join_all_within;

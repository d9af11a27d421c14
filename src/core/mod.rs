//! Core types for lockwire.
//!
//! This module hosts the crate-wide error type and the [`Result`] alias the
//! public API is written against. The layering mirrors the rest of the crate:
//! codec and transport carry their own error enums, and [`LockwireError`]
//! wraps them for callers of the contention handler.
//!
//! # Design Principles
//!
//! - **Typed failures**: every operation that can fail returns a [`Result`]
//!   with an enumerated error; callers can match rather than string-scrape.
//! - **Contract vs. environment**: API misuse (duplicate registration, no
//!   reserved port, stopped handler) gets dedicated fail-fast variants, kept
//!   apart from environmental I/O failures.
//! - **Graceful stop is not an error**: shutdown surfaces through the
//!   transport's distinguished stopped condition and is handled internally;
//!   it never escapes to callers as a spurious I/O failure.

pub mod error;

pub use error::LockwireError;

/// Convenient result alias used across the crate's public API.
pub type Result<T, E = LockwireError> = std::result::Result<T, E>;

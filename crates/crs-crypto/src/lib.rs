//! Content hashing for the Context Reference Store.
//!
//! Provides domain-separated BLAKE3 digests over canonical payload bytes.
//! Structured payloads are canonicalized first so that semantically equal
//! JSON documents deduplicate regardless of key order or whitespace.
//!
//! All crypto operations wrap established libraries; no custom cryptography.

pub mod canonical;
pub mod hasher;

pub use canonical::canonicalize;
pub use hasher::{ContentHasher, HasherError};

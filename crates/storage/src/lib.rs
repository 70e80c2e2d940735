//! Storage layer for GreenWatch
//!
//! This crate provides the durable key-value store that backs the session
//! credentials and device-level preferences.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod kv;

pub use kv::{KvConfig, KvError, KvStore};

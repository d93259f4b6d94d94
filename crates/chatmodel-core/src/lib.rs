//! Core domain + application logic for the chat-model middleware.
//!
//! This crate is framework-agnostic. The chat host and the model providers live
//! behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod context_store;
pub mod conversation;
pub mod domain;
pub mod errors;
pub mod handler;
pub mod logging;
pub mod messaging;
pub mod model;
pub mod storage;
pub mod trigger;
pub mod usage;

pub use errors::{Error, Result};

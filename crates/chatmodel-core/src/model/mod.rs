//! Model adapter port and the pieces shared by every provider crate.

pub mod client;
pub mod http;
pub mod registry;
pub mod types;

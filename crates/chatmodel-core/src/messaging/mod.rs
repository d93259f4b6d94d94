//! Reply dispatch back to the host framework.

pub mod port;

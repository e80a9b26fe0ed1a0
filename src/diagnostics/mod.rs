//! Diagnostics HTTP endpoint: cache statistics and the set of observed
//! queries, served over an optional port.

pub mod handlers;
pub mod server;

pub use server::{router, serve};

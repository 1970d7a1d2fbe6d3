//! Study coordinator
//!
//! Participants of a multi-party study each run a protocol agent on their
//! own compute instance. Agents report progress here; the coordinator keeps
//! one consistent study record out of those reports and stops or deletes an
//! instance once its participant has finished the protocol.

pub mod api;
pub mod auth;
pub mod compute;
pub mod config;
pub mod db;
pub mod engine;
pub mod middleware;
pub mod state;
pub mod store;

pub use state::AppState;

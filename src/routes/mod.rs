//! HTTP route handlers.
//!
//! The unibox module carries the whole mailbox surface; health is a trivial
//! readiness probe. Query-string parsing lives in `params` so every handler
//! shares one typed contract.

pub mod health;
pub mod params;
pub mod unibox;

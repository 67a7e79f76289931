//! Per-user conversation sessions.
//!
//! Sessions live in memory only and are lost on restart. Each Telegram user
//! owns at most one session; its id survives `/reset`.

pub mod store;
pub mod types;

pub use store::SessionStore;
pub use types::{MessageRole, Session, StoreError, Turn};

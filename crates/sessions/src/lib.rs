//! Session memory for AgentCore.
//!
//! A bounded, ordered conversation log per `(user, session)` pair, kept in
//! memory and written through to a [`DurableStore`] after every append.

pub mod durable;
pub mod file_store;
pub mod key;
pub mod session;
pub mod store;
pub mod turn;

pub use durable::{DurableStore, MemoryStore};
pub use file_store::FileStore;
pub use key::SessionKey;
pub use session::Session;
pub use store::{SessionMemoryStore, SessionSummary, StoreHealth};
pub use turn::ConversationTurn;

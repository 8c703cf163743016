//! Parley CLI library: backend wiring and the interactive chat loop.

pub mod bootstrap;
pub mod chat;

pub use bootstrap::{Backend, Runtime};
pub use chat::{ChatSession, ChatSessionConfig};

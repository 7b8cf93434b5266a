//! A chat assistant for exploring data files with a hosted model.
//!
//! The crate includes a CLI tool for using in the terminal. And you can also
//! use it as a library, [`ChatBuilder`] wires a model provider to a session
//! running in a background task.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod chat;
pub mod config;

pub use chat::{Chat, ChatBuilder, ChatClosedError, ChatEvent};

/// Re-exports of [`data_assistant_core`] crate.
pub mod core {
    pub use data_assistant_core::*;
}

//! An abstraction layer for hosted text-generation APIs.
//!
//! This crate establishes the protocol the assistant uses to talk to a
//! generation backend: an ordered list of role-tagged message parts plus
//! sampling parameters goes in, a stream of text events comes out. The
//! session logic only depends on these types, so backends can be swapped
//! (or faked in tests) without touching it.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;

//! Core logic of the data assistant: the conversation store, file
//! ingestion, request assembly and the submission cycle.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod assembler;
pub mod conversation;
pub mod ingest;
mod model_client;
mod session;

pub use assembler::RequestAssembler;
pub use session::{
    CycleReport, CycleStage, PendingSubmission, Session, SessionBuilder,
};

//! Ragline - Multi-query retrieval for grounded question answering
//!
//! Turns one natural-language question into a small, high-precision set of
//! context passages plus the identities of the documents consulted, ready to
//! hand to an answer-generation model.

pub mod cli;
pub mod config;
pub mod error;
pub mod providers;
pub mod retrieval;

pub use error::{RaglineError, Result};
pub use retrieval::{RetrievalLimits, RetrievedContext, Retriever};

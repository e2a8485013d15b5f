//! Core types and trait definitions for the Leadline lead intelligence engine.
//!
//! This crate is free of HTTP, database and async-runtime dependencies. The
//! heuristic scorer and the follow-up state machine live here because they are
//! pure functions of their inputs.

// Native `async fn` in traits; the store trait spells out `Send` bounds itself.
#![allow(async_fn_in_trait)]

pub mod clock;
pub mod config;
pub mod error;
pub mod heuristic;
pub mod interaction;
pub mod lead;
pub mod recommend;
pub mod score;
pub mod sequence;
pub mod store;

pub use error::{Error, Result};

//! quire: a staged editorial review pipeline for manuscripts.
//!
//! A manuscript moves through six stages in a fixed order. Each stage asks a
//! text-generation backend for findings, which become [`issue::Issue`]s that a
//! human can ignore or have applied back to the text.

pub mod backend;
pub mod bible;
pub mod cancel;
pub mod config;
pub mod errors;
pub mod extract;
pub mod fix;
pub mod issue;
pub mod pipeline;
pub mod review;
pub mod stage;
pub mod workflow;

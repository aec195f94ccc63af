//! # vidlink-viewer
//!
//! Receives a vidlink stream, records it to disk, and forwards local
//! input commands back to the host.

pub mod config;
pub mod input;
pub mod recorder;

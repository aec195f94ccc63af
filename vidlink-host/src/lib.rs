//! # vidlink-host
//!
//! Streams an encoded media file to a viewer over a vidlink session and
//! receives the viewer's input events.

pub mod config;
pub mod streamer;

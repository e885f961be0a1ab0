//! # gatelog-server
//!
//! Service library for the gatelog RFID gate reader.
//!
//! This library provides the background task wiring, the API handlers and
//! the logging setup for the `gatelog-server` binary.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod state;

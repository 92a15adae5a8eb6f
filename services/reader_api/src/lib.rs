//! services/reader_api/src/lib.rs
//!
//! The web service hosting reading sessions: adapters for the core ports,
//! configuration and the HTTP/WebSocket surface.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;

//! Tapwire - a transparent HTTP proxy that archives every response it relays
//!
//! Each response passes through a staged hook pipeline: directors may rewrite
//! it, writers receive a copy of the body while it streams to the client, and
//! loggers observe the finished exchange. The built-in writers keep a
//! canonical snapshot per resource and a timestamped record per request.

pub mod application;
pub mod builtin;
pub mod config;
pub mod error;
pub mod proxy;
pub mod storage;

pub use application::Application;
pub use error::{Error, Result};

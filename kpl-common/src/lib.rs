//! # KPL Common Library
//!
//! Shared code for the playlist sync services:
//! - Error and result types
//! - Configuration loading
//! - Document store capability (namespaced JSON documents)
//! - Command bus capability (fire-and-forget queue commands)
//! - Queue gateway (the closed capability the reconciler talks to)
//! - Timestamp helpers

pub mod bus;
pub mod config;
pub mod error;
pub mod gateway;
pub mod store;
pub mod time;

pub use error::{Error, Result};

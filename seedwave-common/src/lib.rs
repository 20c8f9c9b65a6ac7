//! # Seedwave Common Library
//!
//! Shared code for Seedwave services:
//! - Error type used by persistence and configuration code
//! - Event types (SeedwaveEvent enum) and the broadcast EventBus
//! - TOML configuration loading and root folder resolution
//! - Server-Sent Events helpers

pub mod config;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};

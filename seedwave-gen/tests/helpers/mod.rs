//! Test Helper Utilities
//!
//! Shared utilities for testing seedwave-gen

#![allow(dead_code)]

pub mod db_utils;
pub mod stubs;

// Each test crate uses a different subset
#[allow(unused_imports)]
pub use db_utils::{create_test_db, create_test_orchestrator, wait_for_terminal, wait_until_idle};
#[allow(unused_imports)]
pub use stubs::{similar_summaries, summary, track, StubCatalog, StubLlm, StubSimilarity};

use seedwave_gen::models::{PlaylistSize, SeedTrackInput};

pub fn seed_input(query: &str, size: PlaylistSize) -> SeedTrackInput {
    SeedTrackInput {
        query: query.to_string(),
        playlist_size: size,
        preferences: None,
    }
}

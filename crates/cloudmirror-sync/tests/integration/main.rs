//! Integration tests for cloudmirror-sync
//!
//! Runs full cycles against a real temporary directory, an SQLite state
//! store and a recording fake of the remote store.

mod common;

mod test_engine;
mod test_resolver;

//! Shared integration test support.

pub mod common;

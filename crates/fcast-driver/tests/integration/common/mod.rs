//! Common fixtures for driver integration tests.

pub mod fixture;

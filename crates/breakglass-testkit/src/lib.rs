//! Shared fixtures and proptest generators for breakglass tests.

pub mod fixtures;
pub mod generators;

pub use fixtures::{hospital_directory, request_input, EngineFixture, StaticDirectory};

//! Unit and integration tests for polldb
//!
//! This module organizes all tests into logical submodules that correspond to
//! the main library modules.

mod registry_tests;
mod retry_tests;
mod worker_tests;

//! Tests for the flow engine
//!
//! Organized by feature area; `helpers` holds the shared builders.

mod helpers;

mod activation_tests;
mod group_tests;
mod match_tests;

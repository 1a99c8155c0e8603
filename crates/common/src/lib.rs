//! Shared utilities for the forward-auth workspace.

#![warn(clippy::pedantic)]

/// Module for JWT envelope parsing, size limits and clock constants
pub mod jwt;

/// Module for secret types that prevent accidental logging
pub mod secret;

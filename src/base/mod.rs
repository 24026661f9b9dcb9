//! Core components, types, and utilities for mirk.
//!
//! This module contains fundamental building blocks used throughout the application:
//! - Configuration handling and environment variables.
//! - The built-in message template table.
//! - Common types, result handling and exit statuses.

pub mod config;
pub mod templates;
pub mod types;

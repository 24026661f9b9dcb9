//! Service integrations for external systems.
//!
//! This module contains implementations for the services mirk sits between:
//! - Bus services (e.g., a ZeroMQ subscriber)
//! - Chat services (e.g., Matrix)
//!
//! Each service module defines both generic traits and concrete implementations,
//! allowing for extensibility and easy testing.

pub mod bus;
pub mod chat;

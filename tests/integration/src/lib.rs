//! Integration test utilities for the sync client
//!
//! This crate provides scripted transports, credential and notification fakes
//! for driving the connection manager end to end.


pub use helpers::*;

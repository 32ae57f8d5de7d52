//! Voice Confirm Core - Domain types for order confirmation calls.
//!
//! This crate provides the types shared by the server, the CLI and the
//! integration tests:
//! - typed identifiers for orders, stores and users
//! - validated value types (`Email`, `PhoneNumber`, `ShopDomain`)
//! - the two orthogonal order axes (`OrderStatus`, `CallStatus`)
//! - the IVR menu mapping (`MenuChoice`) and per-store `VoiceSettings`
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no
//! database access, no HTTP clients.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;

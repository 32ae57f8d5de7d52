//! Business services.
//!
//! - [`shopify`] - Shopify Admin REST adapter, OAuth and webhook signatures
//! - [`telephony`] - Twilio adapter and voice-markup rendering
//! - [`auth`] - password hashing and bearer tokens
//! - [`calls`] - the order-call state machine
//! - [`webhooks`] - Shopify webhook topic dispatch
//! - [`retry`] - background redial worker

pub mod auth;
pub mod calls;
pub mod retry;
pub mod shopify;
pub mod telephony;
pub mod webhooks;

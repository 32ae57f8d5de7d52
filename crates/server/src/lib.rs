//! Voice Confirm server.
//!
//! Connects a Shopify store, ingests new orders from webhooks and places an
//! interactive Twilio call asking the customer to confirm, cancel or reach
//! support. The order-call state machine lives in
//! [`services::calls::CallWorkflow`]; everything else feeds it events or
//! exposes it over HTTP.
//!
//! # Modules
//!
//! - [`config`] - environment configuration
//! - [`db`] - repository traits with `PostgreSQL` and in-memory backends
//! - [`services`] - Shopify and Twilio adapters, auth, call workflow, redial worker
//! - [`routes`] - axum handlers under `/api`

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

pub use config::AppConfig;
pub use error::AppError;
pub use routes::app;
pub use state::AppState;

//! HTTP middleware and extractors.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layers (hub per request, transaction per route)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. CORS for the dashboard origin
//!
//! Telephony callbacks additionally pass [`verify_twilio_signature`].

pub mod auth;
pub mod request_id;
pub mod twilio;

pub use auth::RequireUser;
pub use request_id::request_id_middleware;
pub use twilio::verify_twilio_signature;

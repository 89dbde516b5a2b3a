//! smsrelay — SMS dispatch with pluggable delivery providers.
//!
//! Messages are created either for immediate delivery or deferred to a future
//! time, persisted in SQLite, delivered through a configured backend (Twilio
//! or Plivo), and every lifecycle transition is recorded in an append-only
//! audit trail. A periodic scheduler drains due messages.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod credentials;
pub mod logging;

pub mod providers;
pub mod store;

pub mod engine;
pub mod scheduler;

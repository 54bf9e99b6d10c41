//! Task-management core with interchangeable storage backends.
//!
//! Persistence goes through the repository contracts in [`repositories`];
//! three physical stores (PostgreSQL, MongoDB, DynamoDB) implement them and
//! one is selected from configuration at process start. Task titles,
//! descriptions, and checklists are encrypted at the repository boundary, so
//! every backend provides the same at-rest confidentiality and callers only
//! ever see plaintext domain objects.
//!
//! The transport layer (HTTP routing, request/response shuttling) lives
//! outside this crate and consumes [`services`] and [`state::AppState`].

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod repositories;
pub mod services;
pub mod state;
pub mod utils;
pub mod validation;

/// Installs the process-wide tracing subscriber. Called once by the
/// embedding binary before [`state::AppState::new`].
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskvault_backend=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

//! Relational backend over PostgreSQL.
//!
//! Tables (provisioned outside this crate):
//!
//! ```sql
//! users (id TEXT PRIMARY KEY, username TEXT UNIQUE, email TEXT UNIQUE,
//!        password_hash TEXT, password_reset_token TEXT,
//!        password_reset_expires TIMESTAMPTZ,
//!        created_at TIMESTAMPTZ, updated_at TIMESTAMPTZ)
//! tasks (id TEXT PRIMARY KEY, user_id TEXT REFERENCES users(id),
//!        title TEXT, description TEXT, checklist TEXT,
//!        due_date TIMESTAMPTZ, status TEXT, created_at TIMESTAMPTZ,
//!        modified_at TIMESTAMPTZ, archived_at TIMESTAMPTZ,
//!        deleted_at TIMESTAMPTZ)
//! ```
//!
//! This variant soft-deletes tasks: `deleted_at` is stamped and every read
//! excludes stamped rows.

mod task;
mod user;

pub use task::PostgresTaskRepository;
pub use user::PostgresUserRepository;

pub(crate) const STORE: &str = "postgres";

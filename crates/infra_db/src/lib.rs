//! Infrastructure Database Layer
//!
//! PostgreSQL implementation of the ledger storage ports. Every unit of
//! work runs at SERIALIZABLE isolation; user rows are locked with
//! `SELECT ... FOR UPDATE` (pairs always in ascending internal order), and
//! the (product, user, reference) unique index is what turns a concurrent
//! retry into exactly one committed entry.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{DatabaseConfig, create_pool, run_migrations, PgLedgerStore};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/billing")).await?;
//! run_migrations(&pool).await?;
//! let store = PgLedgerStore::new(pool);
//! ```

pub mod pool;
pub mod store;
pub mod error;

pub use pool::{create_pool, run_migrations, DatabaseConfig, DatabasePool};
pub use store::PgLedgerStore;
pub use error::DatabaseError;

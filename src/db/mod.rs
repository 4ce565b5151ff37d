//! Database layer for data persistence and access.
//!
//! This module implements the data access layer using SQLx with PostgreSQL.
//! It follows the Repository pattern to provide clean abstractions over database operations.
//!
//! # Modules
//!
//! - [`handlers`]: Repository implementations for CRUD operations
//! - [`models`]: Database record structures matching table schemas
//! - [`errors`]: Database-specific error types
//!
//! # Transactions
//!
//! Repositories borrow a `PgConnection`, so a single transaction can flow
//! through every repository an orchestration touches:
//!
//! ```ignore
//! let mut tx = pool.begin().await?;
//! let mut users = Users::new(&mut tx);
//! // ... operations across users, children, memberships ...
//! tx.commit().await?;
//! ```
//!
//! Dropping the transaction without committing rolls everything back, which
//! is what makes multi-entity upserts all-or-nothing.

pub mod errors;
pub mod handlers;
pub mod models;

//! Repository implementations for database operations.
//!
//! Each repository borrows a `PgConnection` so that a single transaction can
//! span every entity an orchestration touches. Repositories never commit;
//! that is the caller's job.

pub mod addresses;
pub mod audit;
pub mod fields;
pub mod memberships;
pub mod password_history;
pub mod repository;
pub mod settings;
pub mod users;

pub use addresses::Addresses;
pub use audit::AuditLog;
pub use fields::Fields;
pub use memberships::{Departments, Roles};
pub use password_history::PasswordHistory;
pub use repository::Repository;
pub use settings::Settings;
pub use users::Users;

//! Database record structures.

pub mod audit;
pub mod memberships;
pub mod profile;
pub mod users;

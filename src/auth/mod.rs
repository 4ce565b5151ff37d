//! Authentication and authorization.
//!
//! Browser-style session authentication with JWT cookies:
//! - Users log in via `/auth/login` with email/password
//! - A signed JWT is stored in a secure, HTTP-only cookie
//! - Logout replaces the cookie with an already-expired one
//!
//! Access control combines role membership with ownership: admins may operate
//! on any user's records, everyone else only on their own.
//!
//! # Modules
//!
//! - [`current_user`]: extractor for the authenticated user in handlers
//! - [`password`]: password hashing and verification using Argon2
//! - [`permissions`]: typed permission extractor and access checks
//! - [`session`]: JWT session token creation and verification

pub mod current_user;
pub mod password;
pub mod permissions;
pub mod session;

//! Repository implementations for database access.
//!
//! Each repository wraps a SQLx connection and provides strongly-typed CRUD
//! operations plus entity-specific helpers, returning models from
//! [`crate::db::models`]. CRUD-shaped repositories implement the
//! [`Repository`] trait.

pub mod groups;
pub mod password_reset_tokens;
pub mod permissions;
pub mod persons;
pub mod repository;
pub mod revoked_tokens;
pub mod users;

pub use groups::Groups;
pub use password_reset_tokens::PasswordResetTokens;
pub use permissions::Permissions;
pub use persons::Persons;
pub use repository::Repository;
pub use revoked_tokens::RevokedTokens;
pub use users::Users;

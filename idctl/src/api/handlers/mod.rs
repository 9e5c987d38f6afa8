//! HTTP request handlers for all API endpoints.
//!
//! Handlers validate and deserialize the request, run authentication and
//! authorization checks, execute business logic through the database
//! repositories, and serialize the response.
//!
//! # Handler Modules
//!
//! - [`auth`]: Signup, login, token refresh, logout, and password resets
//! - [`users`]: Account CRUD, password changes, and active-state management
//! - [`groups`]: Group CRUD, memberships, and permission grants
//! - [`persons`]: Person profiles, account links, and contact records
//! - [`permissions`]: The read-only permission registry
//!
//! # Authentication
//!
//! Protected handlers take either [`crate::api::models::users::CurrentUser`]
//! (authentication only) or [`crate::auth::permissions::Protected`]
//! (authentication plus the codename the request verb requires).
//!
//! # Error Handling
//!
//! Handlers return [`crate::errors::Error`] which converts to the
//! appropriate HTTP status code and message body.

pub mod auth;
pub mod groups;
pub mod permissions;
pub mod persons;
pub mod users;

//! Authentication and authorization.
//!
//! Authentication is JWT based: `/login` issues an access/refresh token pair,
//! `/token/refresh` exchanges a refresh token for a new pair, and `/logout`
//! revokes the refresh token's jti. Handlers get the caller via the
//! [`current_user`] extractor.
//!
//! Authorization maps the request's HTTP verb to a permission codename for the
//! resource being touched; see [`permissions`]. Active superusers bypass the
//! check entirely.
//!
//! # Modules
//!
//! - [`credentials`]: Username-or-email login resolution and password checks
//! - [`current_user`]: Extractor for the authenticated user in handlers
//! - [`password`]: Password hashing and verification using Argon2
//! - [`permissions`]: Verb-to-codename mapping and the [`permissions::Protected`] extractor
//! - [`tokens`]: JWT access/refresh token creation and verification

pub mod credentials;
pub mod current_user;
pub mod password;
pub mod permissions;
pub mod tokens;

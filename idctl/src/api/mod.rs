//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for all API endpoints
//! - **[`models`]**: Request/response data structures for API communication
//!
//! # API Structure
//!
//! - **Authentication** (`/signup`, `/login`, `/token/*`, `/logout`,
//!   `/password-resets/*`): account creation, token pairs, password resets
//! - **Users** (`/users/*`): account management and password changes
//! - **Groups** (`/groups/*`): groups, memberships, permission grants
//! - **Persons** (`/persons/*`): profiles, account links, contact records
//! - **Permissions** (`/permissions`): the seeded registry, read-only
//!
//! # OpenAPI Documentation
//!
//! All endpoints carry `utoipa` annotations; the rendered documentation is
//! served at `/docs` while the server is running.

pub mod handlers;
pub mod models;

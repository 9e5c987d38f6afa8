pub mod auth;
pub mod groups;
pub mod pagination;
pub mod permissions;
pub mod persons;
pub mod users;

//! Database record models matching table schemas.
//!
//! Each model struct corresponds to a database table row. Repositories use
//! these to return query results and accept insertion/update data. Database
//! models are distinct from API models so storage and API representations can
//! evolve independently.

pub mod groups;
pub mod password_reset_tokens;
pub mod permissions;
pub mod persons;
pub mod users;

//! Database models for persons and their contact records.

use crate::types::{AddressId, PersonId, PhoneId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;

/// Database request for creating a new person
#[derive(Debug, Clone)]
pub struct PersonCreateDBRequest {
    pub user_id: Option<UserId>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: NaiveDate,
    pub account_status: String,
    pub created_by: UserId,
}

/// Database request for updating a person
///
/// `None` fields are left unchanged.
#[derive(Debug, Clone)]
pub struct PersonUpdateDBRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub account_status: Option<String>,
    pub updated_by: UserId,
}

/// Database response for a person, with attached contact records
#[derive(Debug, Clone)]
pub struct PersonDBResponse {
    pub id: PersonId,
    pub user_id: Option<UserId>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: NaiveDate,
    pub account_status: String,
    pub created_by: UserId,
    pub updated_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub phones: Vec<PhoneDBResponse>,
    pub addresses: Vec<AddressDBResponse>,
}

/// A shared phone record. Deduplicated by number across persons.
#[derive(Debug, Clone, FromRow)]
pub struct PhoneDBResponse {
    pub id: PhoneId,
    pub number: String,
}

/// A shared address record. Deduplicated by value across persons.
#[derive(Debug, Clone, FromRow)]
pub struct AddressDBResponse {
    pub id: AddressId,
    pub address: String,
}

//! API request/response models for persons and their contact records.

use super::pagination::Pagination;
use crate::db::models::persons::{AddressDBResponse, PersonDBResponse, PhoneDBResponse};
use crate::types::{AddressId, PersonId, PhoneId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Gender {
    M,
    F,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::M => "M",
            Gender::F => "F",
        }
    }

    fn from_db(value: &str) -> Option<Self> {
        match value {
            "M" => Some(Gender::M),
            "F" => Some(Gender::F),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum AccountStatus {
    Incomplete,
    Complete,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Incomplete => "Incomplete",
            AccountStatus::Complete => "Complete",
        }
    }

    fn from_db(value: &str) -> Self {
        match value {
            "Complete" => AccountStatus::Complete,
            _ => AccountStatus::Incomplete,
        }
    }
}

/// Query parameters for listing persons
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListPersonsQuery {
    /// Pagination parameters
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Search query to filter persons by first or last name (case-insensitive substring match)
    pub search: Option<String>,
}

/// Request body for creating a person profile.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PersonCreate {
    /// Account to link this profile to, if any
    #[schema(value_type = Option<String>, format = "uuid")]
    pub user_id: Option<UserId>,
    #[schema(example = "Ada")]
    pub first_name: Option<String>,
    #[schema(example = "Lovelace")]
    pub last_name: Option<String>,
    pub gender: Option<Gender>,
    pub date_of_birth: NaiveDate,
}

/// Request body for updating a person. All fields are optional; only provided
/// fields will be updated.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PersonUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<Gender>,
    pub date_of_birth: Option<NaiveDate>,
    pub account_status: Option<AccountStatus>,
}

/// Request body for linking an account to a person.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LinkUserRequest {
    #[schema(value_type = String, format = "uuid")]
    pub user_guid: UserId,
}

/// Request body for attaching a phone number.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AttachPhoneRequest {
    #[schema(example = "+14155552671")]
    pub number: String,
}

/// Request body for detaching a phone record, matched by its number.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DetachPhoneRequest {
    #[schema(example = "+14155552671")]
    pub number: String,
}

/// Request body for attaching an address.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AttachAddressRequest {
    #[schema(example = "12 Downing St, London")]
    pub address: String,
}

/// Request body for detaching an address record, matched by its value.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DetachAddressRequest {
    #[schema(example = "12 Downing St, London")]
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PhoneResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: PhoneId,
    pub number: String,
}

impl From<PhoneDBResponse> for PhoneResponse {
    fn from(db: PhoneDBResponse) -> Self {
        Self {
            id: db.id,
            number: db.number,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddressResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: AddressId,
    pub address: String,
}

impl From<AddressDBResponse> for AddressResponse {
    fn from(db: AddressDBResponse) -> Self {
        Self {
            id: db.id,
            address: db.address,
        }
    }
}

/// Full person details returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PersonResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: PersonId,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub user_id: Option<UserId>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<Gender>,
    pub date_of_birth: NaiveDate,
    pub account_status: AccountStatus,
    pub phones: Vec<PhoneResponse>,
    pub addresses: Vec<AddressResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<PersonDBResponse> for PersonResponse {
    fn from(db: PersonDBResponse) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            first_name: db.first_name,
            last_name: db.last_name,
            gender: db.gender.as_deref().and_then(Gender::from_db),
            date_of_birth: db.date_of_birth,
            account_status: AccountStatus::from_db(&db.account_status),
            phones: db.phones.into_iter().map(PhoneResponse::from).collect(),
            addresses: db.addresses.into_iter().map(AddressResponse::from).collect(),
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

impl PersonCreate {
    /// A profile is Complete once name, gender, and date of birth are all set.
    pub fn initial_status(&self) -> AccountStatus {
        if self.first_name.is_some() && self.last_name.is_some() && self.gender.is_some() {
            AccountStatus::Complete
        } else {
            AccountStatus::Incomplete
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_status() {
        let full = PersonCreate {
            user_id: None,
            first_name: Some("Ada".to_string()),
            last_name: Some("Lovelace".to_string()),
            gender: Some(Gender::F),
            date_of_birth: NaiveDate::from_ymd_opt(1815, 12, 10).unwrap(),
        };
        assert_eq!(full.initial_status(), AccountStatus::Complete);

        let partial = PersonCreate {
            last_name: None,
            ..full
        };
        assert_eq!(partial.initial_status(), AccountStatus::Incomplete);
    }
}

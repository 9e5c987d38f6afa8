//! Input validation for identifiers and contact records.

use crate::errors::{Error, Result};

/// Trim an optional identifier, collapsing empty and whitespace-only values
/// to `None`. An account created with `""` as its only identifier could never
/// log in, so blank identifiers are treated as absent.
pub fn normalize_identifier(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Validate a phone number in international format.
///
/// Parse failures and numbers that parse but are not valid for any region get
/// distinct messages, since the fix for each is different.
pub fn validate_phone_number(value: &str) -> Result<()> {
    let number = phonenumber::parse(None, value).map_err(|_| Error::BadRequest {
        message: format!("{value} is not a valid phone number format"),
    })?;

    if !phonenumber::is_valid(&number) {
        return Err(Error::BadRequest {
            message: format!("{value} is not a valid international number"),
        });
    }

    Ok(())
}

/// Addresses are free-form but must not be blank.
pub fn validate_address(value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "Address must not be empty".to_string(),
        });
    }
    Ok(())
}

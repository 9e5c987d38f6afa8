//! Common type definitions.
//!
//! All entity identifiers are opaque UUIDs wrapped in type aliases: surrogate
//! 128-bit keys rather than sequential integers, so identifiers cannot be
//! enumerated.

use uuid::Uuid;

// Type aliases for IDs
pub type UserId = Uuid;
pub type GroupId = Uuid;
pub type PermissionId = Uuid;
pub type PersonId = Uuid;
pub type PhoneId = Uuid;
pub type AddressId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

//! OpenAPI documentation for the identity API.
//!
//! The generated spec is served interactively at `/docs` via RapiDoc.

use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

use crate::api;

/// Security scheme for the API (Bearer access token).
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.security_schemes.insert(
                "BearerAuth".to_string(),
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "JWT access token obtained from `/login` or `/token/refresh`. \
                            Include it in the `Authorization` header:\n\n\
                            ```\nAuthorization: Bearer YOUR_ACCESS_TOKEN\n```",
                        ))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    paths(
        api::handlers::auth::signup,
        api::handlers::auth::login,
        api::handlers::auth::refresh_token,
        api::handlers::auth::logout,
        api::handlers::auth::request_password_reset,
        api::handlers::auth::confirm_password_reset,
        api::handlers::users::list_users,
        api::handlers::users::create_user,
        api::handlers::users::get_user,
        api::handlers::users::update_user,
        api::handlers::users::delete_user,
        api::handlers::users::change_password,
        api::handlers::groups::list_groups,
        api::handlers::groups::create_group,
        api::handlers::groups::get_group,
        api::handlers::groups::update_group,
        api::handlers::groups::delete_group,
        api::handlers::groups::add_permissions_to_group,
        api::handlers::groups::remove_permissions_from_group,
        api::handlers::groups::add_user_to_group,
        api::handlers::groups::remove_user_from_group,
        api::handlers::persons::list_persons,
        api::handlers::persons::create_person,
        api::handlers::persons::get_person,
        api::handlers::persons::update_person,
        api::handlers::persons::delete_person,
        api::handlers::persons::link_user,
        api::handlers::persons::unlink_user,
        api::handlers::persons::add_phone,
        api::handlers::persons::remove_phone,
        api::handlers::persons::add_address,
        api::handlers::persons::remove_address,
        api::handlers::permissions::list_permissions,
    ),
    components(
        schemas(
            api::models::auth::SignupRequest,
            api::models::auth::LoginRequest,
            api::models::auth::LoginResponse,
            api::models::auth::TokenRefreshRequest,
            api::models::auth::TokenPairResponse,
            api::models::auth::LogoutRequest,
            api::models::auth::PasswordResetRequest,
            api::models::auth::PasswordResetConfirmRequest,
            api::models::auth::MessageResponse,
            api::models::users::UserCreate,
            api::models::users::UserUpdate,
            api::models::users::ChangePasswordRequest,
            api::models::users::UserResponse,
            api::models::groups::GroupCreate,
            api::models::groups::GroupUpdate,
            api::models::groups::PermissionBatch,
            api::models::groups::MembershipChange,
            api::models::groups::GroupResponse,
            api::models::persons::Gender,
            api::models::persons::AccountStatus,
            api::models::persons::PersonCreate,
            api::models::persons::PersonUpdate,
            api::models::persons::LinkUserRequest,
            api::models::persons::AttachPhoneRequest,
            api::models::persons::DetachPhoneRequest,
            api::models::persons::AttachAddressRequest,
            api::models::persons::DetachAddressRequest,
            api::models::persons::PhoneResponse,
            api::models::persons::AddressResponse,
            api::models::persons::PersonResponse,
            api::models::permissions::PermissionResponse,
        )
    ),
    tags(
        (name = "authentication", description = "Signup, login, token refresh, logout and password resets.

Login returns a pair of JWTs. The short-lived access token authenticates API
calls; the refresh token obtains new pairs via `/token/refresh` and is rotated
on every use. Logout revokes the presented refresh token."),
        (name = "users", description = "Manage user accounts.

Users can always read and edit their own account. Operating on other accounts
requires the relevant permission codename (`view_user`, `modify_other_user`,
`delete_other_user`)."),
        (name = "groups", description = "Manage permission groups and their membership.

Groups bundle permission codenames; users inherit the permissions of every
group they belong to. Permission batches are applied all-or-nothing."),
        (name = "persons", description = "Manage person profiles, linked accounts, phones and addresses.

A person may be linked to at most one user account, and a user account to at
most one person. Owners manage their own profile freely; acting on someone
else's requires the matching permission codename."),
        (name = "permissions", description = "Browse the permission registry.

Permissions are seeded by migrations and read-only at runtime; grant them to
groups rather than editing them."),
    ),
    info(
        title = "Identity API",
        version = "1.0.0",
        description = "Multi-tenant identity and profile management.

## Authentication

Obtain a token pair via `POST /login`, then pass the access token in the
`Authorization` header:

```
Authorization: Bearer YOUR_ACCESS_TOKEN
```

## Errors

Errors are returned as a JSON object with a `message` field:

```json
{
  \"message\": \"Group not found\"
}
```",
    ),
)]
pub struct ApiDoc;

//! HTTP verb to permission codename mapping and the [`Protected`] extractor.
//!
//! Each guarded resource maps request verbs to codenames from the seeded
//! permission registry: GET/HEAD need `view_*`, POST needs `add_*`, PUT/PATCH
//! need `change_*`, DELETE needs `delete_*`. Verbs outside the map are
//! rejected with 405 before any permission lookup happens.
//!
//! A user's effective permissions are the union of the codenames granted to
//! the groups they belong to, evaluated per request. Active superusers skip
//! the lookup entirely.

use std::marker::PhantomData;

use axum::{extract::FromRequestParts, http::Method, http::request::Parts};
use tracing::instrument;

use crate::{
    AppState,
    api::models::users::CurrentUser,
    db::{errors::DbError, handlers::Groups},
    errors::{Error, Result},
};

/// A resource guarded by verb-mapped permissions
pub trait ResourceKind: Send + Sync + 'static {
    const RESOURCE: &'static str;

    /// The codename the verb requires, or None for unmapped verbs
    fn required_codename(method: &Method) -> Option<&'static str>;
}

macro_rules! resource_kind {
    ($name:ident, $resource:literal, $view:literal, $add:literal, $change:literal, $delete:literal) => {
        pub struct $name;

        impl ResourceKind for $name {
            const RESOURCE: &'static str = $resource;

            fn required_codename(method: &Method) -> Option<&'static str> {
                match *method {
                    Method::GET | Method::HEAD => Some($view),
                    Method::POST => Some($add),
                    Method::PUT | Method::PATCH => Some($change),
                    Method::DELETE => Some($delete),
                    _ => None,
                }
            }
        }
    };
}

resource_kind!(UserResource, "user", "view_user", "add_user", "change_user", "delete_user");
resource_kind!(GroupResource, "group", "view_group", "add_group", "change_group", "delete_group");
resource_kind!(PersonResource, "person", "view_person", "add_person", "change_person", "delete_person");

/// Whether a user holds a required codename. Active superusers hold
/// everything; inactive accounts hold nothing.
pub fn has_permission(user: &CurrentUser, granted: &[String], required: &str) -> bool {
    if !user.is_active {
        return false;
    }
    if user.is_superuser {
        return true;
    }
    granted.iter().any(|codename| codename == required)
}

/// Extractor that authenticates the caller and checks the permission the
/// request verb requires for resource `R`.
pub struct Protected<R: ResourceKind> {
    pub user: CurrentUser,
    _resource: PhantomData<R>,
}

impl<R: ResourceKind> FromRequestParts<AppState> for Protected<R> {
    type Rejection = Error;

    #[instrument(skip(parts, state), fields(resource = R::RESOURCE, method = %parts.method))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let user = CurrentUser::from_request_parts(parts, state).await?;

        let required = R::required_codename(&parts.method).ok_or_else(|| Error::MethodNotAllowed {
            method: parts.method.clone(),
        })?;

        // Superusers skip the group permission lookup
        if user.is_active && user.is_superuser {
            return Ok(Self {
                user,
                _resource: PhantomData,
            });
        }

        let mut conn = state.db.acquire().await.map_err(DbError::from)?;
        let granted = Groups::new(&mut conn).effective_permissions(user.id).await?;

        if !has_permission(&user, &granted, required) {
            return Err(Error::InsufficientPermissions {
                required: required.to_string(),
            });
        }

        Ok(Self {
            user,
            _resource: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(active: bool, superuser: bool) -> CurrentUser {
        CurrentUser {
            id: uuid::Uuid::new_v4(),
            username: Some("tester".to_string()),
            email: None,
            is_active: active,
            is_superuser: superuser,
        }
    }

    #[test]
    fn test_verb_mapping() {
        assert_eq!(UserResource::required_codename(&Method::GET), Some("view_user"));
        assert_eq!(UserResource::required_codename(&Method::HEAD), Some("view_user"));
        assert_eq!(UserResource::required_codename(&Method::POST), Some("add_user"));
        assert_eq!(GroupResource::required_codename(&Method::PUT), Some("change_group"));
        assert_eq!(GroupResource::required_codename(&Method::PATCH), Some("change_group"));
        assert_eq!(PersonResource::required_codename(&Method::DELETE), Some("delete_person"));

        // Unmapped verbs get no codename at all
        assert_eq!(UserResource::required_codename(&Method::TRACE), None);
        assert_eq!(PersonResource::required_codename(&Method::OPTIONS), None);
    }

    #[test]
    fn test_has_permission() {
        let granted = vec!["view_user".to_string(), "change_user".to_string()];

        assert!(has_permission(&user(true, false), &granted, "view_user"));
        assert!(!has_permission(&user(true, false), &granted, "delete_user"));

        // Active superusers hold everything
        assert!(has_permission(&user(true, true), &[], "delete_user"));

        // Inactive accounts hold nothing, superuser or not
        assert!(!has_permission(&user(false, true), &granted, "view_user"));
        assert!(!has_permission(&user(false, false), &granted, "view_user"));
    }
}

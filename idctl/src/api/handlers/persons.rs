use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::models::{
        persons::{
            AttachAddressRequest, AttachPhoneRequest, DetachAddressRequest, DetachPhoneRequest, LinkUserRequest, ListPersonsQuery,
            PersonCreate, PersonResponse, PersonUpdate,
        },
        users::CurrentUser,
    },
    auth::permissions::{PersonResource, Protected, has_permission},
    db::{
        errors::DbError,
        handlers::{Groups, Persons, Repository, Users, persons::PersonFilter},
        models::persons::{PersonCreateDBRequest, PersonDBResponse, PersonUpdateDBRequest},
    },
    errors::{Error, Result},
    types::PersonId,
    validation,
};

/// Owner-or-codename check for changing a person. The owner is the account
/// linked to the profile; everyone else needs the named codename.
async fn authorize_person_change(
    state: &AppState,
    current_user: &CurrentUser,
    person: &PersonDBResponse,
    own_codename: Option<&str>,
    other_codename: &str,
) -> Result<()> {
    let is_owner = person.user_id == Some(current_user.id);
    let required = match (is_owner, own_codename) {
        (true, None) => return Ok(()),
        (true, Some(own)) => own,
        (false, _) => other_codename,
    };

    let granted = if current_user.is_superuser {
        Vec::new()
    } else {
        let mut conn = state.db.acquire().await.map_err(DbError::from)?;
        Groups::new(&mut conn).effective_permissions(current_user.id).await?
    };
    if !has_permission(current_user, &granted, required) {
        return Err(Error::InsufficientPermissions {
            required: required.to_string(),
        });
    }
    Ok(())
}

async fn load_person(state: &AppState, person_id: PersonId) -> Result<PersonDBResponse> {
    let mut pool_conn = state.db.acquire().await.map_err(DbError::from)?;
    Persons::new(&mut pool_conn)
        .get_by_id(person_id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "Person".to_string(),
            id: person_id.to_string(),
        })
}

#[utoipa::path(
    get,
    path = "/persons",
    tag = "persons",
    summary = "List persons",
    params(ListPersonsQuery),
    responses(
        (status = 200, description = "List of persons", body = Vec<PersonResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing view_person permission"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_persons(
    State(state): State<AppState>,
    Query(query): Query<ListPersonsQuery>,
    _: Protected<PersonResource>,
) -> Result<Json<Vec<PersonResponse>>> {
    let mut pool_conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut repo = Persons::new(&mut pool_conn);

    let (skip, limit) = query.pagination.params();
    let mut filter = PersonFilter::new(skip, limit);
    if let Some(search) = query.search {
        filter = filter.with_search(search);
    }

    let persons = repo.list(&filter).await?;
    Ok(Json(persons.into_iter().map(PersonResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/persons",
    tag = "persons",
    summary = "Create person",
    request_body = PersonCreate,
    responses(
        (status = 201, description = "Person created", body = PersonResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing add_person permission"),
        (status = 409, description = "Duplicate person or account already linked"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_person(
    State(state): State<AppState>,
    current_user: Protected<PersonResource>,
    Json(create): Json<PersonCreate>,
) -> Result<(StatusCode, Json<PersonResponse>)> {
    let account_status = create.initial_status();

    let mut pool_conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut repo = Persons::new(&mut pool_conn);
    let person = repo
        .create(&PersonCreateDBRequest {
            user_id: create.user_id,
            first_name: create.first_name,
            last_name: create.last_name,
            gender: create.gender.map(|g| g.as_str().to_string()),
            date_of_birth: create.date_of_birth,
            account_status: account_status.as_str().to_string(),
            created_by: current_user.user.id,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(PersonResponse::from(person))))
}

#[utoipa::path(
    get,
    path = "/persons/{person_id}",
    tag = "persons",
    summary = "Get person",
    params(("person_id" = uuid::Uuid, Path, description = "Person ID")),
    responses(
        (status = 200, description = "Person details", body = PersonResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing view_person permission"),
        (status = 404, description = "Person not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_person(
    State(state): State<AppState>,
    Path(person_id): Path<PersonId>,
    current_user: CurrentUser,
) -> Result<Json<PersonResponse>> {
    let person = load_person(&state, person_id).await?;

    // Owners can always read their own profile
    if person.user_id != Some(current_user.id) {
        let granted = if current_user.is_superuser {
            Vec::new()
        } else {
            let mut conn = state.db.acquire().await.map_err(DbError::from)?;
            Groups::new(&mut conn).effective_permissions(current_user.id).await?
        };
        if !has_permission(&current_user, &granted, "view_person") {
            return Err(Error::InsufficientPermissions {
                required: "view_person".to_string(),
            });
        }
    }

    Ok(Json(PersonResponse::from(person)))
}

#[utoipa::path(
    patch,
    path = "/persons/{person_id}",
    tag = "persons",
    summary = "Update person",
    request_body = PersonUpdate,
    params(("person_id" = uuid::Uuid, Path, description = "Person ID")),
    responses(
        (status = 200, description = "Person updated", body = PersonResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing modify_other_person permission"),
        (status = 404, description = "Person not found"),
        (status = 409, description = "Duplicate person"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_person(
    State(state): State<AppState>,
    Path(person_id): Path<PersonId>,
    current_user: CurrentUser,
    Json(update): Json<PersonUpdate>,
) -> Result<Json<PersonResponse>> {
    let person = load_person(&state, person_id).await?;
    authorize_person_change(&state, &current_user, &person, None, "modify_other_person").await?;

    let mut pool_conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut repo = Persons::new(&mut pool_conn);
    let person = repo
        .update(person_id, &PersonUpdateDBRequest {
            first_name: update.first_name,
            last_name: update.last_name,
            gender: update.gender.map(|g| g.as_str().to_string()),
            date_of_birth: update.date_of_birth,
            account_status: update.account_status.map(|s| s.as_str().to_string()),
            updated_by: current_user.id,
        })
        .await?;

    Ok(Json(PersonResponse::from(person)))
}

#[utoipa::path(
    delete,
    path = "/persons/{person_id}",
    tag = "persons",
    summary = "Delete person",
    params(("person_id" = uuid::Uuid, Path, description = "Person ID")),
    responses(
        (status = 204, description = "Person deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing delete_own_person or delete_other_person permission"),
        (status = 404, description = "Person not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_person(
    State(state): State<AppState>,
    Path(person_id): Path<PersonId>,
    current_user: CurrentUser,
) -> Result<StatusCode> {
    let person = load_person(&state, person_id).await?;
    authorize_person_change(&state, &current_user, &person, Some("delete_own_person"), "delete_other_person").await?;

    let mut pool_conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut repo = Persons::new(&mut pool_conn);
    if repo.delete(person_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound {
            resource: "Person".to_string(),
            id: person_id.to_string(),
        })
    }
}

#[utoipa::path(
    patch,
    path = "/persons/{person_id}/add-user",
    tag = "persons",
    summary = "Link account to person",
    request_body = LinkUserRequest,
    params(("person_id" = uuid::Uuid, Path, description = "Person ID")),
    responses(
        (status = 200, description = "Account linked", body = PersonResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing modify_other_person permission"),
        (status = 404, description = "Person or user not found"),
        (status = 409, description = "Account already linked to another person"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn link_user(
    State(state): State<AppState>,
    Path(person_id): Path<PersonId>,
    current_user: CurrentUser,
    Json(request): Json<LinkUserRequest>,
) -> Result<Json<PersonResponse>> {
    let person = load_person(&state, person_id).await?;
    authorize_person_change(&state, &current_user, &person, None, "modify_other_person").await?;

    let mut pool_conn = state.db.acquire().await.map_err(DbError::from)?;

    if Users::new(&mut pool_conn).get_by_id(request.user_guid).await?.is_none() {
        return Err(Error::NotFound {
            resource: "User".to_string(),
            id: request.user_guid.to_string(),
        });
    }

    let mut repo = Persons::new(&mut pool_conn);
    repo.link_user(person_id, request.user_guid, current_user.id).await?;
    let person = load_person(&state, person_id).await?;
    Ok(Json(PersonResponse::from(person)))
}

#[utoipa::path(
    patch,
    path = "/persons/{person_id}/remove-user",
    tag = "persons",
    summary = "Unlink account from person",
    params(("person_id" = uuid::Uuid, Path, description = "Person ID")),
    responses(
        (status = 200, description = "Account unlinked", body = PersonResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing modify_other_person permission"),
        (status = 404, description = "Person not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn unlink_user(
    State(state): State<AppState>,
    Path(person_id): Path<PersonId>,
    current_user: CurrentUser,
) -> Result<Json<PersonResponse>> {
    let person = load_person(&state, person_id).await?;
    authorize_person_change(&state, &current_user, &person, None, "modify_other_person").await?;

    let mut pool_conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut repo = Persons::new(&mut pool_conn);
    repo.unlink_user(person_id, current_user.id).await?;

    let person = load_person(&state, person_id).await?;
    Ok(Json(PersonResponse::from(person)))
}

#[utoipa::path(
    patch,
    path = "/persons/{person_id}/add-phone",
    tag = "persons",
    summary = "Attach phone number",
    request_body = AttachPhoneRequest,
    params(("person_id" = uuid::Uuid, Path, description = "Person ID")),
    responses(
        (status = 200, description = "Phone attached", body = PersonResponse),
        (status = 400, description = "Invalid phone number"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing modify_other_person permission"),
        (status = 404, description = "Person not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn add_phone(
    State(state): State<AppState>,
    Path(person_id): Path<PersonId>,
    current_user: CurrentUser,
    Json(request): Json<AttachPhoneRequest>,
) -> Result<Json<PersonResponse>> {
    let person = load_person(&state, person_id).await?;
    authorize_person_change(&state, &current_user, &person, None, "modify_other_person").await?;

    validation::validate_phone_number(&request.number)?;

    let mut pool_conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut repo = Persons::new(&mut pool_conn);
    repo.add_phone(person_id, &request.number, current_user.id).await?;

    let person = load_person(&state, person_id).await?;
    Ok(Json(PersonResponse::from(person)))
}

#[utoipa::path(
    patch,
    path = "/persons/{person_id}/remove-phone",
    tag = "persons",
    summary = "Detach phone number",
    request_body = DetachPhoneRequest,
    params(("person_id" = uuid::Uuid, Path, description = "Person ID")),
    responses(
        (status = 200, description = "Phone detached", body = PersonResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing modify_other_person permission"),
        (status = 404, description = "Person or phone record not found"),
        (status = 409, description = "Phone not attached to this person"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn remove_phone(
    State(state): State<AppState>,
    Path(person_id): Path<PersonId>,
    current_user: CurrentUser,
    Json(request): Json<DetachPhoneRequest>,
) -> Result<Json<PersonResponse>> {
    let person = load_person(&state, person_id).await?;
    authorize_person_change(&state, &current_user, &person, None, "modify_other_person").await?;

    let mut pool_conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut repo = Persons::new(&mut pool_conn);

    let Some(phone) = repo.find_phone_by_number(&request.number).await? else {
        return Err(Error::NotFound {
            resource: "Phone".to_string(),
            id: request.number,
        });
    };
    if !repo.remove_phone(person_id, phone.id).await? {
        return Err(Error::Conflict {
            message: "Phone is not attached to this person".to_string(),
        });
    }

    let person = load_person(&state, person_id).await?;
    Ok(Json(PersonResponse::from(person)))
}

#[utoipa::path(
    patch,
    path = "/persons/{person_id}/add-address",
    tag = "persons",
    summary = "Attach address",
    request_body = AttachAddressRequest,
    params(("person_id" = uuid::Uuid, Path, description = "Person ID")),
    responses(
        (status = 200, description = "Address attached", body = PersonResponse),
        (status = 400, description = "Blank address"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing modify_other_person permission"),
        (status = 404, description = "Person not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn add_address(
    State(state): State<AppState>,
    Path(person_id): Path<PersonId>,
    current_user: CurrentUser,
    Json(request): Json<AttachAddressRequest>,
) -> Result<Json<PersonResponse>> {
    let person = load_person(&state, person_id).await?;
    authorize_person_change(&state, &current_user, &person, None, "modify_other_person").await?;

    validation::validate_address(&request.address)?;

    let mut pool_conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut repo = Persons::new(&mut pool_conn);
    repo.add_address(person_id, &request.address, current_user.id).await?;

    let person = load_person(&state, person_id).await?;
    Ok(Json(PersonResponse::from(person)))
}

#[utoipa::path(
    patch,
    path = "/persons/{person_id}/remove-address",
    tag = "persons",
    summary = "Detach address",
    request_body = DetachAddressRequest,
    params(("person_id" = uuid::Uuid, Path, description = "Person ID")),
    responses(
        (status = 200, description = "Address detached", body = PersonResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing modify_other_person permission"),
        (status = 404, description = "Person or address record not found"),
        (status = 409, description = "Address not attached to this person"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn remove_address(
    State(state): State<AppState>,
    Path(person_id): Path<PersonId>,
    current_user: CurrentUser,
    Json(request): Json<DetachAddressRequest>,
) -> Result<Json<PersonResponse>> {
    let person = load_person(&state, person_id).await?;
    authorize_person_change(&state, &current_user, &person, None, "modify_other_person").await?;

    let mut pool_conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut repo = Persons::new(&mut pool_conn);

    let Some(record) = repo.find_address_by_value(&request.address).await? else {
        return Err(Error::NotFound {
            resource: "Address".to_string(),
            id: request.address,
        });
    };
    if !repo.remove_address(person_id, record.id).await? {
        return Err(Error::Conflict {
            message: "Address is not attached to this person".to_string(),
        });
    }

    let person = load_person(&state, person_id).await?;
    Ok(Json(PersonResponse::from(person)))
}

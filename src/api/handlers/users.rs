//! User CRUD orchestration.
//!
//! Create and update are multi-entity upserts: the user row, role and
//! department memberships, and field/address/setting child records all change
//! inside one transaction. Membership diffs and child actions are computed by
//! [`crate::reconcile`]; any error mid-way drops the transaction and rolls
//! everything back.

use std::collections::HashSet;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse},
};
use sqlx::PgConnection;

use crate::{
    AppState,
    api::handlers::auth::expired_session_cookie,
    api::models::{
        Envelope,
        auth::{ChangePasswordOutcome, ChangePasswordRequest, RegisterOutcome, RegisterRequest},
        users::{CurrentUser, GetUserQuery, Include, ListUsersQuery, UserCreate, UserResponse, UserUpdate},
    },
    auth::{
        password,
        permissions::{RequiresPermission, can_read_all_resources, can_read_own_resource, can_update_own_resource, operation, resource},
        session,
    },
    db::{
        handlers::{Addresses, AuditLog, Departments, Fields, PasswordHistory, Repository, Roles, Users, users::UserFilter},
        models::{
            audit::AuditEntryDBRequest,
            profile::{
                AddressCreateDBRequest, AddressUpdateDBRequest, FieldCreateDBRequest, FieldUpdateDBRequest, SettingCreateDBRequest,
                SettingUpdateDBRequest,
            },
            users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
        },
    },
    errors::Error,
    reconcile::{ChildAction, classify_child, reconcile_ids, value_is_present},
    types::{Operation, Permission, Resource, UserId},
};

/// Hash a password off the async runtime.
async fn hash_password_blocking(password: String) -> Result<String, Error> {
    tokio::task::spawn_blocking(move || password::hash_string(&password))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password hashing task: {e}"),
        })?
}

/// Verify a password off the async runtime.
async fn verify_password_blocking(password: String, hash: String) -> Result<bool, Error> {
    tokio::task::spawn_blocking(move || password::verify_string(&password, &hash))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password verification task: {e}"),
        })?
}

/// Resolve the requested role ids, or the configured default role when the
/// request names none. Unknown ids are rejected before anything is written.
async fn resolve_role_ids(tx: &mut PgConnection, state: &AppState, requested: Option<&Vec<UserId>>) -> Result<Vec<UserId>, Error> {
    let mut roles = Roles::new(tx);
    match requested {
        Some(ids) if !ids.is_empty() => {
            let wanted: HashSet<_> = ids.iter().copied().collect();
            let known = roles.existing_ids(ids).await?;
            if known != wanted {
                return Err(Error::BadRequest {
                    message: "Unknown role id in request".to_string(),
                });
            }
            Ok(ids.clone())
        }
        _ => {
            let default = roles
                .find_by_slug(&state.config.defaults.role_slug)
                .await
                .map_err(|_| Error::Internal {
                    operation: format!("resolve default role '{}'", state.config.defaults.role_slug),
                })?;
            Ok(vec![default.id])
        }
    }
}

/// Department counterpart of [`resolve_role_ids`].
async fn resolve_department_ids(
    tx: &mut PgConnection,
    state: &AppState,
    requested: Option<&Vec<UserId>>,
) -> Result<Vec<UserId>, Error> {
    let mut departments = Departments::new(tx);
    match requested {
        Some(ids) if !ids.is_empty() => {
            let wanted: HashSet<_> = ids.iter().copied().collect();
            let known = departments.existing_ids(ids).await?;
            if known != wanted {
                return Err(Error::BadRequest {
                    message: "Unknown department id in request".to_string(),
                });
            }
            Ok(ids.clone())
        }
        _ => {
            let default = departments
                .find_by_slug(&state.config.defaults.department_slug)
                .await
                .map_err(|_| Error::Internal {
                    operation: format!("resolve default department '{}'", state.config.defaults.department_slug),
                })?;
            Ok(vec![default.id])
        }
    }
}

/// Create a user plus memberships and present-valued children, all inside one
/// transaction. Returns the created user.
pub(crate) async fn perform_create(state: &AppState, request: UserCreate, activated: bool) -> Result<UserDBResponse, Error> {
    let email = request.email.to_lowercase();
    let password_hash = hash_password_blocking(request.password.clone()).await?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    if Users::new(&mut tx).get_user_by_email(&email).await?.is_some() {
        return Err(Error::Conflict {
            message: format!("{email} | user already exists"),
        });
    }

    let role_ids = resolve_role_ids(&mut tx, state, request.roles.as_ref()).await?;
    let department_ids = resolve_department_ids(&mut tx, state, request.departments.as_ref()).await?;

    let created = Users::new(&mut tx)
        .create(&UserCreateDBRequest {
            first_name: request.first_name.clone(),
            last_name: request.last_name.clone(),
            email,
            password_hash,
            activated,
            is_admin: false,
            role_ids,
            department_ids,
        })
        .await?;

    // Children: on create only present-valued inputs matter; ids are ignored
    if let Some(inputs) = &request.fields {
        let mut repo = Fields::new(&mut tx);
        for input in inputs {
            if value_is_present(&input.value) {
                let name = input.name.clone().ok_or_else(|| Error::BadRequest {
                    message: "Field name is required".to_string(),
                })?;
                repo.create(&FieldCreateDBRequest {
                    user_id: created.id,
                    name,
                    value: input.value.clone(),
                })
                .await?;
            }
        }
    }

    if let Some(inputs) = &request.addresses {
        let mut repo = Addresses::new(&mut tx);
        for input in inputs {
            if value_is_present(&input.value) {
                let label = input.label.clone().ok_or_else(|| Error::BadRequest {
                    message: "Address label is required".to_string(),
                })?;
                repo.create(&AddressCreateDBRequest {
                    user_id: created.id,
                    label,
                    value: input.value.clone(),
                })
                .await?;
            }
        }
    }

    if let Some(inputs) = &request.settings {
        let mut repo = crate::db::handlers::Settings::new(&mut tx);
        for input in inputs {
            if value_is_present(&input.value) {
                let name = input.name.clone().ok_or_else(|| Error::BadRequest {
                    message: "Setting name is required".to_string(),
                })?;
                repo.create(&SettingCreateDBRequest {
                    related_id: created.id,
                    name,
                    value: input.value.clone(),
                })
                .await?;
            }
        }
    }

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(created)
}

/// Update a user's scalars, reconcile memberships, apply child actions and
/// record audit/history, all inside one transaction. Returns the final state.
pub(crate) async fn perform_update(state: &AppState, user_id: UserId, update: &UserUpdate) -> Result<UserDBResponse, Error> {
    let password_hash = match &update.password {
        Some(password) => Some(hash_password_blocking(password.clone()).await?),
        None => None,
    };
    let email = update.email.as_ref().map(|e| e.to_lowercase());

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    // Duplicate-email guard runs before any mutation
    if let Some(email) = &email {
        if Users::new(&mut tx).email_taken_by_other(email, user_id).await? {
            return Err(Error::Conflict {
                message: format!("{email} | user already exists"),
            });
        }
    }

    let existing = Users::new(&mut tx)
        .get_by_id(user_id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "User".to_string(),
            id: user_id.to_string(),
        })?;

    // Pre-update snapshot for the audit log. When the activation state is
    // about to flip the snapshot records the incoming value, and the old
    // password hash is included only when the password is changing.
    let mut snapshot = serde_json::json!({
        "id": existing.id,
        "first_name": existing.first_name,
        "last_name": existing.last_name,
        "email": existing.email,
        "activated": existing.activated,
    });
    if let Some(activated) = update.activated {
        if activated != existing.activated {
            snapshot["activated"] = serde_json::json!(activated);
        }
    }
    if password_hash.is_some() {
        snapshot["password_hash"] = serde_json::json!(existing.password_hash);
    }

    AuditLog::new(&mut tx)
        .record(&AuditEntryDBRequest {
            user_id,
            action: "user.updated".to_string(),
            old_data: snapshot,
        })
        .await?;

    if password_hash.is_some() {
        PasswordHistory::new(&mut tx).add(user_id, &existing.password_hash).await?;
    }

    Users::new(&mut tx)
        .update(
            user_id,
            &UserUpdateDBRequest {
                first_name: update.first_name.clone(),
                last_name: update.last_name.clone(),
                email,
                password_hash,
                activated: update.activated,
            },
        )
        .await?;

    if let Some(desired) = &update.roles {
        let mut roles = Roles::new(&mut tx);
        let desired_set: HashSet<_> = desired.iter().copied().collect();
        let known = roles.existing_ids(desired).await?;
        if known != desired_set {
            return Err(Error::BadRequest {
                message: "Unknown role id in request".to_string(),
            });
        }
        let current = roles.ids_for_user(user_id).await?;
        let diff = reconcile_ids(&current, &desired_set);
        for id in &diff.to_attach {
            roles.attach(user_id, *id).await?;
        }
        for id in &diff.to_detach {
            roles.detach(user_id, *id).await?;
        }
    }

    if let Some(desired) = &update.departments {
        let mut departments = Departments::new(&mut tx);
        let desired_set: HashSet<_> = desired.iter().copied().collect();
        let known = departments.existing_ids(desired).await?;
        if known != desired_set {
            return Err(Error::BadRequest {
                message: "Unknown department id in request".to_string(),
            });
        }
        let current = departments.ids_for_user(user_id).await?;
        let diff = reconcile_ids(&current, &desired_set);
        for id in &diff.to_attach {
            departments.attach(user_id, *id).await?;
        }
        for id in &diff.to_detach {
            departments.detach(user_id, *id).await?;
        }
    }

    if let Some(inputs) = &update.fields {
        let mut repo = Fields::new(&mut tx);
        let owned = repo.ids_for_user(user_id).await?;
        for input in inputs {
            match classify_child(input.id, &input.value) {
                ChildAction::Create => {
                    let name = input.name.clone().ok_or_else(|| Error::BadRequest {
                        message: "Field name is required".to_string(),
                    })?;
                    repo.create(&FieldCreateDBRequest {
                        user_id,
                        name,
                        value: input.value.clone(),
                    })
                    .await?;
                }
                ChildAction::Update(id) => {
                    if !owned.contains(&id) {
                        return Err(Error::NotFound {
                            resource: "Field".to_string(),
                            id: id.to_string(),
                        });
                    }
                    repo.update(
                        id,
                        &FieldUpdateDBRequest {
                            name: input.name.clone(),
                            value: Some(input.value.clone()),
                        },
                    )
                    .await?;
                }
                ChildAction::Delete(id) => {
                    if !owned.contains(&id) {
                        return Err(Error::NotFound {
                            resource: "Field".to_string(),
                            id: id.to_string(),
                        });
                    }
                    repo.delete(id).await?;
                }
                ChildAction::Noop => {}
            }
        }
    }

    if let Some(inputs) = &update.addresses {
        let mut repo = Addresses::new(&mut tx);
        let owned = repo.ids_for_user(user_id).await?;
        for input in inputs {
            match classify_child(input.id, &input.value) {
                ChildAction::Create => {
                    let label = input.label.clone().ok_or_else(|| Error::BadRequest {
                        message: "Address label is required".to_string(),
                    })?;
                    repo.create(&AddressCreateDBRequest {
                        user_id,
                        label,
                        value: input.value.clone(),
                    })
                    .await?;
                }
                ChildAction::Update(id) => {
                    if !owned.contains(&id) {
                        return Err(Error::NotFound {
                            resource: "Address".to_string(),
                            id: id.to_string(),
                        });
                    }
                    repo.update(
                        id,
                        &AddressUpdateDBRequest {
                            label: input.label.clone(),
                            value: Some(input.value.clone()),
                        },
                    )
                    .await?;
                }
                ChildAction::Delete(id) => {
                    if !owned.contains(&id) {
                        return Err(Error::NotFound {
                            resource: "Address".to_string(),
                            id: id.to_string(),
                        });
                    }
                    repo.delete(id).await?;
                }
                ChildAction::Noop => {}
            }
        }
    }

    if let Some(inputs) = &update.settings {
        let mut repo = crate::db::handlers::Settings::new(&mut tx);
        let owned = repo.ids_for_user(user_id).await?;
        for input in inputs {
            match classify_child(input.id, &input.value) {
                ChildAction::Create => {
                    let name = input.name.clone().ok_or_else(|| Error::BadRequest {
                        message: "Setting name is required".to_string(),
                    })?;
                    repo.create(&SettingCreateDBRequest {
                        related_id: user_id,
                        name,
                        value: input.value.clone(),
                    })
                    .await?;
                }
                ChildAction::Update(id) => {
                    if !owned.contains(&id) {
                        return Err(Error::NotFound {
                            resource: "Setting".to_string(),
                            id: id.to_string(),
                        });
                    }
                    repo.update(
                        id,
                        &SettingUpdateDBRequest {
                            name: input.name.clone(),
                            value: Some(input.value.clone()),
                        },
                    )
                    .await?;
                }
                ChildAction::Delete(id) => {
                    if !owned.contains(&id) {
                        return Err(Error::NotFound {
                            resource: "Setting".to_string(),
                            id: id.to_string(),
                        });
                    }
                    repo.delete(id).await?;
                }
                ChildAction::Noop => {}
            }
        }
    }

    // Final state with memberships applied
    let updated = Users::new(&mut tx)
        .get_by_id(user_id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "User".to_string(),
            id: user_id.to_string(),
        })?;

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(updated)
}

/// Attach requested child collections to a user response.
async fn attach_includes(conn: &mut PgConnection, user: &mut UserResponse, include: Include) -> Result<(), Error> {
    if include.fields {
        let fields = Fields::new(&mut *conn).list(&user.id).await?;
        user.fields = Some(fields.into_iter().map(Into::into).collect());
    }
    if include.addresses {
        let addresses = Addresses::new(&mut *conn).list(&user.id).await?;
        user.addresses = Some(addresses.into_iter().map(Into::into).collect());
    }
    if include.settings {
        let settings = crate::db::handlers::Settings::new(&mut *conn).list(&user.id).await?;
        user.settings = Some(settings.into_iter().map(Into::into).collect());
    }
    Ok(())
}

/// List users
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "User list", body = Envelope<Vec<UserResponse>>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Insufficient permissions"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    _: RequiresPermission<resource::Users, operation::ReadAll>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<Envelope<Vec<UserResponse>>>, Error> {
    let (skip, limit) = query.pagination.params();
    let include = Include::parse(query.include.as_deref());

    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let filter = UserFilter {
        skip,
        limit,
        search: query.search.clone(),
    };
    let users = Users::new(&mut pool_conn).list(&filter).await?;

    let mut responses = Vec::with_capacity(users.len());
    for user in users {
        let mut response = UserResponse::from(user);
        attach_includes(&mut pool_conn, &mut response, include).await?;
        responses.push(response);
    }

    Ok(Json(Envelope::new(responses)))
}

/// Get a single user
#[utoipa::path(
    get,
    path = "/users/{user_id}",
    tag = "users",
    params(
        ("user_id" = uuid::Uuid, Path, description = "User ID"),
        GetUserQuery,
    ),
    responses(
        (status = 200, description = "User details", body = Envelope<UserResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Insufficient permissions"),
        (status = 404, description = "User not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_user(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(user_id): Path<UserId>,
    Query(query): Query<GetUserQuery>,
) -> Result<Json<Envelope<UserResponse>>, Error> {
    if !can_read_all_resources(&current_user, Resource::Users) && !can_read_own_resource(&current_user, Resource::Users, user_id) {
        return Err(Error::InsufficientPermissions {
            required: Permission::Any(vec![
                Permission::Allow(Resource::Users, Operation::ReadAll),
                Permission::Allow(Resource::Users, Operation::ReadOwn),
            ]),
            action: Operation::ReadAll,
            resource: "users".to_string(),
        });
    }

    let include = Include::parse(query.include.as_deref());
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let user = Users::new(&mut pool_conn)
        .get_by_id(user_id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "User".to_string(),
            id: user_id.to_string(),
        })?;

    let mut response = UserResponse::from(user);
    attach_includes(&mut pool_conn, &mut response, include).await?;

    Ok(Json(Envelope::new(response)))
}

/// Create a user (admin)
#[utoipa::path(
    post,
    path = "/users",
    tag = "users",
    request_body = UserCreate,
    responses(
        (status = 201, description = "User created", body = Envelope<String>),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Insufficient permissions"),
        (status = 409, description = "Email already registered"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_user(
    State(state): State<AppState>,
    _: RequiresPermission<resource::Users, operation::CreateAll>,
    Json(request): Json<UserCreate>,
) -> Result<impl IntoResponse, Error> {
    request.validate(&state.config.auth.password)?;

    // Per-request override of the configured verification behavior
    let check_email = request.check_email.unwrap_or(state.config.auth.verify_email);
    perform_create(&state, request, !check_email).await?;

    Ok((StatusCode::CREATED, Json(Envelope::new("User created"))))
}

/// Public registration
#[utoipa::path(
    post,
    path = "/users/register",
    tag = "users",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account registered", body = Envelope<RegisterOutcome>),
        (status = 400, description = "Invalid request"),
        (status = 409, description = "Email already registered"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn register(State(state): State<AppState>, Json(request): Json<RegisterRequest>) -> Result<impl IntoResponse, Error> {
    request.validate(&state.config.auth.password)?;

    let check_email = state.config.auth.verify_email;
    let create = UserCreate {
        first_name: request.first_name,
        last_name: request.last_name,
        email: request.email,
        password: request.password,
        check_email: None,
        // Registration always gets the configured defaults
        roles: None,
        departments: None,
        fields: None,
        addresses: None,
        settings: None,
    };
    perform_create(&state, create, !check_email).await?;

    // No session token is issued here; the caller logs in separately
    Ok((StatusCode::CREATED, Json(Envelope::new(RegisterOutcome { check_email }))))
}

/// Update a user
#[utoipa::path(
    put,
    path = "/users/{user_id}",
    tag = "users",
    request_body = UserUpdate,
    params(("user_id" = uuid::Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Updated user", body = Envelope<UserResponse>),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Insufficient permissions"),
        (status = 404, description = "User not found"),
        (status = 409, description = "Email belongs to another user"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn update_user(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(user_id): Path<UserId>,
    Json(update): Json<UserUpdate>,
) -> Result<Json<Envelope<UserResponse>>, Error> {
    let forbidden = || Error::InsufficientPermissions {
        required: Permission::Any(vec![
            Permission::Allow(Resource::Users, Operation::UpdateAll),
            Permission::Allow(Resource::Users, Operation::UpdateOwn),
        ]),
        action: Operation::UpdateAll,
        resource: "users".to_string(),
    };

    if !current_user.is_admin {
        if !can_update_own_resource(&current_user, Resource::Users, user_id) {
            return Err(forbidden());
        }
        // Self-service updates cover scalar attributes and children only
        if update.roles.is_some() || update.departments.is_some() || update.activated.is_some() {
            return Err(forbidden());
        }
    }

    update.validate(&state.config.auth.password)?;

    let updated = perform_update(&state, user_id, &update).await?;
    Ok(Json(Envelope::new(UserResponse::from(updated))))
}

/// Delete a user (admin)
#[utoipa::path(
    delete,
    path = "/users/{user_id}",
    tag = "users",
    params(("user_id" = uuid::Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User deleted", body = Envelope<String>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Insufficient permissions"),
        (status = 404, description = "User not found"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn delete_user(
    State(state): State<AppState>,
    _: RequiresPermission<resource::Users, operation::DeleteAll>,
    Path(user_id): Path<UserId>,
) -> Result<Json<Envelope<&'static str>>, Error> {
    let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let deleted = Users::new(&mut pool_conn).delete(user_id).await?;
    if !deleted {
        return Err(Error::NotFound {
            resource: "User".to_string(),
            id: user_id.to_string(),
        });
    }

    Ok(Json(Envelope::new("User deleted")))
}

/// Compound password change: authenticate, check history, update, end session
#[utoipa::path(
    post,
    path = "/users/change-password",
    tag = "users",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = Envelope<ChangePasswordOutcome>),
        (status = 400, description = "Invalid request or password reuse"),
        (status = 401, description = "Invalid credentials"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn change_password(
    State(state): State<AppState>,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, Error> {
    request.validate(&state.config.auth.password)?;

    // Authenticate with email + current password
    let (user, history) = {
        let mut pool_conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let user = Users::new(&mut pool_conn)
            .get_user_by_email(&request.email)
            .await?
            .ok_or_else(|| Error::Unauthenticated {
                message: Some("Invalid email or password".to_string()),
            })?;
        let history = PasswordHistory::new(&mut pool_conn).hashes_for_user(user.id).await?;
        (user, history)
    };

    let is_valid = verify_password_blocking(request.current_password.clone(), user.password_hash.clone()).await?;
    if !is_valid {
        return Err(Error::Unauthenticated {
            message: Some("Invalid email or password".to_string()),
        });
    }

    // Successful authentication opens a session; it is closed again by the
    // expired cookie sent with the response
    let current = CurrentUser::from(&user);
    let _token = session::create_session_token(&current, &state.config)?;

    // Reject reuse of any previous password before anything is written
    let mut known_hashes = history;
    known_hashes.push(user.password_hash.clone());
    for hash in known_hashes {
        if verify_password_blocking(request.new_password.clone(), hash).await? {
            return Err(Error::BadRequest {
                message: "New password must not match a previously used password".to_string(),
            });
        }
    }

    let update = UserUpdate {
        password: Some(request.new_password.clone()),
        activated: Some(true),
        ..Default::default()
    };
    let updated = perform_update(&state, user.id, &update).await?;

    Ok((
        AppendHeaders([(SET_COOKIE, expired_session_cookie(&state.config))]),
        Json(Envelope::new(ChangePasswordOutcome { user_id: updated.id })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::profile::{AddressInput, FieldInput, SettingInput};
    use crate::test_utils::create_test_state_with_pool;
    use serde_json::json;
    use sqlx::PgPool;
    use uuid::Uuid;

    fn create_request(email: &str) -> UserCreate {
        UserCreate {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: email.to_string(),
            password: "correct-horse".to_string(),
            check_email: None,
            roles: None,
            departments: None,
            fields: None,
            addresses: None,
            settings: None,
        }
    }

    async fn count_for_user(pool: &PgPool, sql: &str, user_id: UserId) -> i64 {
        sqlx::query_scalar::<_, i64>(sql).bind(user_id).fetch_one(pool).await.unwrap()
    }

    async fn fetch_user(pool: &PgPool, user_id: UserId) -> UserDBResponse {
        let mut conn = pool.acquire().await.unwrap();
        Users::new(&mut conn).get_by_id(user_id).await.unwrap().unwrap()
    }

    #[sqlx::test]
    async fn test_create_activation_split(pool: PgPool) {
        let state = create_test_state_with_pool(pool);

        let active = perform_create(&state, create_request("active@example.com"), true).await.unwrap();
        assert!(active.activated);
        assert!(active.activated_at.is_some());

        let pending = perform_create(&state, create_request("pending@example.com"), false)
            .await
            .unwrap();
        assert!(!pending.activated);
        assert!(pending.activated_at.is_none());

        // Unspecified memberships fall back to the seeded defaults
        assert_eq!(active.roles.len(), 1);
        assert_eq!(active.roles[0].slug, "user");
        assert_eq!(active.departments.len(), 1);
        assert_eq!(active.departments[0].slug, "users");
    }

    #[sqlx::test]
    async fn test_create_duplicate_email_conflicts(pool: PgPool) {
        let state = create_test_state_with_pool(pool);

        perform_create(&state, create_request("dup@example.com"), true).await.unwrap();
        let err = perform_create(&state, create_request("DUP@example.com"), true)
            .await
            .unwrap_err();

        match err {
            Error::Conflict { message } => assert_eq!(message, "dup@example.com | user already exists"),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[sqlx::test]
    async fn test_update_to_taken_email_persists_nothing(pool: PgPool) {
        let state = create_test_state_with_pool(pool.clone());

        let first = perform_create(&state, create_request("first@example.com"), true).await.unwrap();
        let second = perform_create(&state, create_request("second@example.com"), true)
            .await
            .unwrap();

        let update = UserUpdate {
            email: Some(first.email.clone()),
            first_name: Some("Changed".to_string()),
            ..Default::default()
        };
        let err = perform_update(&state, second.id, &update).await.unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));

        // Nothing was written: scalars untouched, no audit entry
        let unchanged = fetch_user(&pool, second.id).await;
        assert_eq!(unchanged.email, "second@example.com");
        assert_eq!(unchanged.first_name, "Ada");
        let audits = count_for_user(&pool, "SELECT COUNT(*) FROM audit_log WHERE user_id = $1", second.id).await;
        assert_eq!(audits, 0);
    }

    #[sqlx::test]
    async fn test_unknown_child_id_rolls_everything_back(pool: PgPool) {
        let state = create_test_state_with_pool(pool.clone());

        let user = perform_create(&state, create_request("rollback@example.com"), true).await.unwrap();

        // Scalar change plus a field update targeting a record the user does
        // not own; the whole transaction must be discarded
        let update = UserUpdate {
            first_name: Some("Changed".to_string()),
            fields: Some(vec![FieldInput {
                id: Some(Uuid::new_v4()),
                name: Some("bio".to_string()),
                value: json!("text"),
            }]),
            ..Default::default()
        };
        let err = perform_update(&state, user.id, &update).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));

        let unchanged = fetch_user(&pool, user.id).await;
        assert_eq!(unchanged.first_name, "Ada");
        let audits = count_for_user(&pool, "SELECT COUNT(*) FROM audit_log WHERE user_id = $1", user.id).await;
        assert_eq!(audits, 0);
        let fields = count_for_user(&pool, "SELECT COUNT(*) FROM user_fields WHERE user_id = $1", user.id).await;
        assert_eq!(fields, 0);
    }

    #[sqlx::test]
    async fn test_update_applies_scalars_children_and_audit(pool: PgPool) {
        let state = create_test_state_with_pool(pool.clone());

        let user = perform_create(&state, create_request("upsert@example.com"), true).await.unwrap();

        let update = UserUpdate {
            first_name: Some("Grace".to_string()),
            fields: Some(vec![FieldInput {
                id: None,
                name: Some("bio".to_string()),
                value: json!("navy"),
            }]),
            ..Default::default()
        };
        let updated = perform_update(&state, user.id, &update).await.unwrap();
        assert_eq!(updated.first_name, "Grace");

        let fields = count_for_user(&pool, "SELECT COUNT(*) FROM user_fields WHERE user_id = $1", user.id).await;
        assert_eq!(fields, 1);
        let audits = count_for_user(&pool, "SELECT COUNT(*) FROM audit_log WHERE user_id = $1", user.id).await;
        assert_eq!(audits, 1);
    }

    #[sqlx::test]
    async fn test_create_skips_absent_valued_children(pool: PgPool) {
        let state = create_test_state_with_pool(pool.clone());

        let mut request = create_request("children@example.com");
        request.fields = Some(vec![
            FieldInput {
                id: None,
                name: Some("bio".to_string()),
                value: json!("present"),
            },
            FieldInput {
                id: None,
                name: Some("ignored".to_string()),
                value: json!(""),
            },
        ]);
        request.addresses = Some(vec![AddressInput {
            id: None,
            label: Some("home".to_string()),
            value: json!(""),
        }]);
        request.settings = Some(vec![SettingInput {
            id: None,
            name: Some("locale".to_string()),
            value: json!("en"),
        }]);

        let user = perform_create(&state, request, true).await.unwrap();

        let fields = count_for_user(&pool, "SELECT COUNT(*) FROM user_fields WHERE user_id = $1", user.id).await;
        assert_eq!(fields, 1);
        let addresses = count_for_user(&pool, "SELECT COUNT(*) FROM user_addresses WHERE user_id = $1", user.id).await;
        assert_eq!(addresses, 0);
        let settings = count_for_user(&pool, "SELECT COUNT(*) FROM settings WHERE related_id = $1", user.id).await;
        assert_eq!(settings, 1);
    }
}

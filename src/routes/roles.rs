use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use uuid::Uuid;

use crate::{
    dto::roles::{AssignRoleRequest, CreateRoleRequest, RoleList},
    error::AppResult,
    middleware::auth::AuthUser,
    models::{Role, User},
    response::ApiResponse,
    services::role_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_roles).post(create_role))
        .route("/{id}", get(get_role).delete(delete_role))
}

/// Role membership, nested under `/users`.
pub fn user_router() -> Router<AppState> {
    Router::new()
        .route("/{user_id}/roles", post(assign_role))
        .route("/{user_id}/roles/{role}", delete(revoke_role))
}

#[utoipa::path(
    get,
    path = "/api/roles",
    responses(
        (status = 200, description = "List roles", body = ApiResponse<RoleList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Roles"
)]
pub async fn list_roles(
    State(state): State<AppState>,
    _user: AuthUser,
) -> AppResult<Json<ApiResponse<RoleList>>> {
    let resp = role_service::list_roles(&state).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/roles",
    request_body = CreateRoleRequest,
    responses(
        (status = 201, description = "Create role (admin only)", body = ApiResponse<Role>),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Role already exists")
    ),
    security(("bearer_auth" = [])),
    tag = "Roles"
)]
pub async fn create_role(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateRoleRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Role>>)> {
    let resp = role_service::create_role(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    get,
    path = "/api/roles/{id}",
    params(("id" = Uuid, Path, description = "Role ID")),
    responses(
        (status = 200, description = "Get role", body = ApiResponse<Role>),
        (status = 404, description = "Role not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Roles"
)]
pub async fn get_role(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Role>>> {
    let resp = role_service::get_role(&state, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/roles/{id}",
    params(("id" = Uuid, Path, description = "Role ID")),
    responses(
        (status = 200, description = "Role deleted"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Role not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Roles"
)]
pub async fn delete_role(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = role_service::delete_role(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/users/{user_id}/roles",
    params(("user_id" = Uuid, Path, description = "User ID")),
    request_body = AssignRoleRequest,
    responses(
        (status = 200, description = "Assign role to user (admin only)", body = ApiResponse<User>),
        (status = 404, description = "User or role not found"),
        (status = 409, description = "Role already assigned")
    ),
    security(("bearer_auth" = [])),
    tag = "Roles"
)]
pub async fn assign_role(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<AssignRoleRequest>,
) -> AppResult<Json<ApiResponse<User>>> {
    let resp = role_service::assign_role(&state, &user, user_id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/users/{user_id}/roles/{role}",
    params(
        ("user_id" = Uuid, Path, description = "User ID"),
        ("role" = String, Path, description = "Role name")
    ),
    responses(
        (status = 200, description = "Revoke role from user (admin only)", body = ApiResponse<User>),
        (status = 404, description = "User does not hold the role")
    ),
    security(("bearer_auth" = [])),
    tag = "Roles"
)]
pub async fn revoke_role(
    State(state): State<AppState>,
    user: AuthUser,
    Path((user_id, role)): Path<(Uuid, String)>,
) -> AppResult<Json<ApiResponse<User>>> {
    let resp = role_service::revoke_role(&state, &user, user_id, &role).await?;
    Ok(Json(resp))
}

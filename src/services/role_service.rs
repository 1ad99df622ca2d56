use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::OnConflict;
use uuid::Uuid;

use crate::{
    audit,
    dto::roles::{AssignRoleRequest, CreateRoleRequest, RoleList},
    entity::{
        roles::{ActiveModel as RoleActive, Column as RoleCol, Entity as Roles, Model as RoleModel},
        user_roles::{ActiveModel as UserRoleActive, Column as UserRoleCol, Entity as UserRoles},
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Role, User},
    response::{ApiResponse, Meta},
    state::AppState,
};

/// Role names are stored upper-case and trimmed.
pub fn normalize_role_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("role name must not be empty".into()));
    }
    Ok(name.to_ascii_uppercase())
}

/// Loads the role names held by a user, sorted by name.
pub async fn roles_for_user<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> AppResult<Vec<String>> {
    let role_ids: Vec<Uuid> = UserRoles::find()
        .filter(UserRoleCol::UserId.eq(user_id))
        .all(conn)
        .await?
        .into_iter()
        .map(|link| link.role_id)
        .collect();

    if role_ids.is_empty() {
        return Ok(Vec::new());
    }

    let names = Roles::find()
        .filter(RoleCol::Id.is_in(role_ids))
        .order_by_asc(RoleCol::Name)
        .all(conn)
        .await?
        .into_iter()
        .map(|role| role.name)
        .collect();
    Ok(names)
}

pub async fn find_role_by_name<C: ConnectionTrait>(conn: &C, name: &str) -> AppResult<Option<RoleModel>> {
    let role = Roles::find()
        .filter(RoleCol::Name.eq(name))
        .one(conn)
        .await?;
    Ok(role)
}

/// Returns the named role, inserting it first if it does not exist yet.
/// Concurrent callers race on `ON CONFLICT DO NOTHING`, then read the winner.
pub async fn ensure_role_exists<C: ConnectionTrait>(conn: &C, name: &str) -> AppResult<RoleModel> {
    if let Some(role) = find_role_by_name(conn, name).await? {
        return Ok(role);
    }
    Roles::insert(RoleActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        created_at: NotSet,
    })
    .on_conflict(OnConflict::column(RoleCol::Name).do_nothing().to_owned())
    .exec_without_returning(conn)
    .await?;

    find_role_by_name(conn, name)
        .await?
        .ok_or_else(|| AppError::not_found("Role", "name", name))
}

/// A second link for the same (user, role) pair is a Conflict.
pub async fn link_role<C: ConnectionTrait>(conn: &C, user_id: Uuid, role_id: Uuid) -> AppResult<()> {
    UserRoleActive {
        user_id: Set(user_id),
        role_id: Set(role_id),
    }
    .insert(conn)
    .await
    .map_err(|err| {
        AppError::from_constraint(err, format!("User {user_id} already has role {role_id}"))
    })?;
    Ok(())
}

pub async fn create_role(
    state: &AppState,
    user: &AuthUser,
    payload: CreateRoleRequest,
) -> AppResult<ApiResponse<Role>> {
    ensure_admin(user)?;
    let name = normalize_role_name(&payload.name)?;

    if find_role_by_name(&state.orm, &name).await?.is_some() {
        return Err(AppError::Conflict(format!("Role {name} already exists")));
    }

    let role = RoleActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.clone()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await
    .map_err(|err| AppError::from_constraint(err, format!("Role {name} already exists")))?;

    audit::record(
        state,
        Some(user.user_id),
        "role_create",
        "roles",
        serde_json::json!({ "role_id": role.id, "name": role.name }),
    )
    .await;

    Ok(ApiResponse::success("Role created", role.into(), Some(Meta::empty())))
}

pub async fn list_roles(state: &AppState) -> AppResult<ApiResponse<RoleList>> {
    let items: Vec<Role> = Roles::find()
        .order_by_asc(RoleCol::Name)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Role::from)
        .collect();
    let total = items.len() as i64;
    Ok(ApiResponse::success(
        "Roles",
        RoleList { items },
        Some(Meta::new(1, total, total)),
    ))
}

pub async fn get_role(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Role>> {
    let role = Roles::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Role", "id", id))?;
    Ok(ApiResponse::success("Role", role.into(), None))
}

pub async fn delete_role(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let txn = state.orm.begin().await?;

    UserRoles::delete_many()
        .filter(UserRoleCol::RoleId.eq(id))
        .exec(&txn)
        .await?;
    let result = Roles::delete_by_id(id).exec(&txn).await?;
    if result.rows_affected == 0 {
        return Err(AppError::not_found("Role", "id", id));
    }

    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "role_delete",
        "roles",
        serde_json::json!({ "role_id": id }),
    )
    .await;

    Ok(ApiResponse::message("Role deleted"))
}

pub async fn assign_role(
    state: &AppState,
    admin: &AuthUser,
    user_id: Uuid,
    payload: AssignRoleRequest,
) -> AppResult<ApiResponse<User>> {
    ensure_admin(admin)?;
    let name = normalize_role_name(&payload.role)?;

    let target = Users::find_by_id(user_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("User", "id", user_id))?;
    let role = find_role_by_name(&state.orm, &name)
        .await?
        .ok_or_else(|| AppError::not_found("Role", "name", &name))?;

    let existing = UserRoles::find_by_id((user_id, role.id))
        .one(&state.orm)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict(format!(
            "User {user_id} already has role {name}"
        )));
    }

    link_role(&state.orm, user_id, role.id).await?;

    audit::record(
        state,
        Some(admin.user_id),
        "role_assign",
        "user_roles",
        serde_json::json!({ "user_id": user_id, "role": name }),
    )
    .await;

    let roles = roles_for_user(&state.orm, user_id).await?;
    Ok(ApiResponse::success(
        "Role assigned",
        User::from_entity(target, roles),
        Some(Meta::empty()),
    ))
}

pub async fn revoke_role(
    state: &AppState,
    admin: &AuthUser,
    user_id: Uuid,
    role_name: &str,
) -> AppResult<ApiResponse<User>> {
    ensure_admin(admin)?;
    let name = normalize_role_name(role_name)?;

    let target = Users::find_by_id(user_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("User", "id", user_id))?;
    let role = find_role_by_name(&state.orm, &name)
        .await?
        .ok_or_else(|| AppError::not_found("Role", "name", &name))?;

    let result = UserRoles::delete_by_id((user_id, role.id))
        .exec(&state.orm)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::not_found("UserRole", "role", &name));
    }

    audit::record(
        state,
        Some(admin.user_id),
        "role_revoke",
        "user_roles",
        serde_json::json!({ "user_id": user_id, "role": name }),
    )
    .await;

    let roles = roles_for_user(&state.orm, user_id).await?;
    Ok(ApiResponse::success(
        "Role revoked",
        User::from_entity(target, roles),
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::normalize_role_name;

    #[test]
    fn role_names_are_trimmed_and_upper_cased() {
        assert_eq!(normalize_role_name("  manager ").unwrap(), "MANAGER");
    }

    #[test]
    fn blank_role_name_is_rejected() {
        assert!(normalize_role_name("   ").is_err());
    }
}

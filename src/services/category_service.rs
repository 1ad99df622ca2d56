use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use sea_orm::ActiveValue::NotSet;
use uuid::Uuid;

use crate::{
    audit,
    dto::categories::{CategoryList, CreateCategoryRequest, UpdateCategoryRequest},
    entity::{
        categories::{ActiveModel, Column, Entity as Categories},
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Category,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

fn clean_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("category name must not be empty".into()));
    }
    Ok(name.to_string())
}

async fn name_taken(state: &AppState, name: &str, except: Option<Uuid>) -> AppResult<bool> {
    let mut condition = Condition::all().add(Column::Name.eq(name));
    if let Some(id) = except {
        condition = condition.add(Column::Id.ne(id));
    }
    let count = Categories::find().filter(condition).count(&state.orm).await?;
    Ok(count > 0)
}

pub async fn create_category(
    state: &AppState,
    user: &AuthUser,
    payload: CreateCategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    ensure_admin(user)?;
    let name = clean_name(&payload.name)?;
    if name_taken(state, &name, None).await? {
        return Err(AppError::Conflict(format!("Category {name} already exists")));
    }

    let category = ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.clone()),
        description: Set(payload.description),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await
    .map_err(|err| AppError::from_constraint(err, format!("Category {name} already exists")))?;

    audit::record(
        state,
        Some(user.user_id),
        "category_create",
        "categories",
        serde_json::json!({ "category_id": category.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Category created",
        category.into(),
        Some(Meta::empty()),
    ))
}

pub async fn list_categories(
    state: &AppState,
    pagination: Pagination,
) -> AppResult<ApiResponse<CategoryList>> {
    let (page, limit, offset) = pagination.normalize();
    let finder = Categories::find().order_by_asc(Column::Name);
    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Category::from)
        .collect();

    Ok(ApiResponse::success(
        "Categories",
        CategoryList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn get_category(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Category>> {
    let category = Categories::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Category", "id", id))?;
    Ok(ApiResponse::success("Category", category.into(), None))
}

pub async fn update_category(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateCategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    ensure_admin(user)?;
    let existing = Categories::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Category", "id", id))?;

    let mut active: ActiveModel = existing.into();
    if let Some(name) = payload.name {
        let name = clean_name(&name)?;
        if name_taken(state, &name, Some(id)).await? {
            return Err(AppError::Conflict(format!("Category {name} already exists")));
        }
        active.name = Set(name);
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }

    let category = active.update(&state.orm).await.map_err(|err| {
        AppError::from_constraint(err, format!("Category {id} conflicts with an existing category"))
    })?;
    Ok(ApiResponse::success(
        "Category updated",
        category.into(),
        Some(Meta::empty()),
    ))
}

pub async fn delete_category(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;

    let in_use = Products::find()
        .filter(ProdCol::CategoryId.eq(id))
        .count(&state.orm)
        .await?;
    if in_use > 0 {
        return Err(AppError::Conflict(format!(
            "Category {id} still has {in_use} product(s)"
        )));
    }

    let result = Categories::delete_by_id(id)
        .exec(&state.orm)
        .await
        .map_err(|err| AppError::from_constraint(err, format!("Category {id} still has products")))?;
    if result.rows_affected == 0 {
        return Err(AppError::not_found("Category", "id", id));
    }

    audit::record(
        state,
        Some(user.user_id),
        "category_delete",
        "categories",
        serde_json::json!({ "category_id": id }),
    )
    .await;

    Ok(ApiResponse::message("Category deleted"))
}

use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use uuid::Uuid;

use crate::{
    audit,
    dto::products::{CreateProductRequest, ProductList, UpdateProductRequest},
    entity::{
        categories::Entity as Categories,
        products::{ActiveModel, Column, Entity as Products, Model as ProductModel},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Product,
    response::{ApiResponse, Meta},
    routes::params::{ProductQuery, ProductSortBy, SortOrder},
    state::AppState,
};

fn validate_price_and_stock(price: Option<i64>, stock: Option<i32>) -> AppResult<()> {
    if price.is_some_and(|p| p < 0) {
        return Err(AppError::BadRequest("price must not be negative".into()));
    }
    if stock.is_some_and(|s| s < 0) {
        return Err(AppError::BadRequest("stock must not be negative".into()));
    }
    Ok(())
}

async fn ensure_category(state: &AppState, category_id: Uuid) -> AppResult<()> {
    Categories::find_by_id(category_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Category", "id", category_id))?;
    Ok(())
}

/// Loads a product or fails with `Product not found with id`.
pub async fn find_product<C: sea_orm::ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> AppResult<ProductModel> {
    Products::find_by_id(id)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::not_found("Product", "id", id))
}

pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all();

    if let Some(search) = query.q.as_ref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(Column::Name).ilike(pattern.clone()))
                .add(Expr::col(Column::Description).ilike(pattern)),
        );
    }

    if let Some(category_id) = query.category_id {
        condition = condition.add(Column::CategoryId.eq(category_id));
    }

    if let Some(min_price) = query.min_price {
        condition = condition.add(Column::Price.gte(min_price));
    }

    if let Some(max_price) = query.max_price {
        condition = condition.add(Column::Price.lte(max_price));
    }

    let sort_by = query.sort_by.unwrap_or(ProductSortBy::CreatedAt);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let sort_col = match sort_by {
        ProductSortBy::CreatedAt => Column::CreatedAt,
        ProductSortBy::Price => Column::Price,
        ProductSortBy::Name => Column::Name,
    };

    let mut finder = Products::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(sort_col),
        SortOrder::Desc => finder.order_by_desc(sort_col),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Product::from)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Products", ProductList { items }, Some(meta)))
}

pub async fn get_product(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Product>> {
    let product = find_product(&state.orm, id).await?;
    Ok(ApiResponse::success("Product", product.into(), None))
}

pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    validate_price_and_stock(Some(payload.price), Some(payload.stock))?;
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("product name must not be empty".into()));
    }
    ensure_category(state, payload.category_id).await?;

    let name = payload.name;
    let product = ActiveModel {
        id: Set(Uuid::new_v4()),
        category_id: Set(payload.category_id),
        name: Set(name.clone()),
        description: Set(payload.description),
        price: Set(payload.price),
        stock: Set(payload.stock),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await
    .map_err(|err| AppError::from_constraint(err, format!("Product {name} already exists")))?;

    audit::record(
        state,
        Some(user.user_id),
        "product_create",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Product created",
        product.into(),
        Some(Meta::empty()),
    ))
}

pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    validate_price_and_stock(payload.price, payload.stock)?;
    let existing = find_product(&state.orm, id).await?;

    let mut active: ActiveModel = existing.into();
    if let Some(category_id) = payload.category_id {
        ensure_category(state, category_id).await?;
        active.category_id = Set(category_id);
    }
    if let Some(name) = payload.name {
        active.name = Set(name);
    }
    if let Some(description) = payload.description {
        active.description = Set(Some(description));
    }
    if let Some(price) = payload.price {
        active.price = Set(price);
    }
    if let Some(stock) = payload.stock {
        active.stock = Set(stock);
    }

    let product = active.update(&state.orm).await.map_err(|err| {
        AppError::from_constraint(err, format!("Product {id} conflicts with an existing product"))
    })?;

    audit::record(
        state,
        Some(user.user_id),
        "product_update",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Updated",
        product.into(),
        Some(Meta::empty()),
    ))
}

pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let result = Products::delete_by_id(id)
        .exec(&state.orm)
        .await
        .map_err(|err| {
            AppError::from_constraint(err, format!("Product {id} is referenced by carts or orders"))
        })?;

    if result.rows_affected == 0 {
        return Err(AppError::not_found("Product", "id", id));
    }

    audit::record(
        state,
        Some(user.user_id),
        "product_delete",
        "products",
        serde_json::json!({ "product_id": id }),
    )
    .await;

    Ok(ApiResponse::message("Deleted"))
}

#[cfg(test)]
mod tests {
    use super::validate_price_and_stock;

    #[test]
    fn negative_price_or_stock_is_rejected() {
        assert!(validate_price_and_stock(Some(-1), Some(0)).is_err());
        assert!(validate_price_and_stock(Some(0), Some(-5)).is_err());
        assert!(validate_price_and_stock(None, None).is_ok());
        assert!(validate_price_and_stock(Some(1999), Some(3)).is_ok());
    }
}

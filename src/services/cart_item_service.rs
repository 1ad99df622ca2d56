use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseTransaction, EntityTrait, ModelTrait,
    PaginatorTrait, QueryFilter, QuerySelect, Set, TransactionTrait,
};
use sea_orm::sea_query::LockType;
use uuid::Uuid;

use crate::{
    audit,
    dto::cart::{CartList, UpdateCartItemRequest},
    entity::{
        cart_items::{
            ActiveModel as CartItemActive, Column as CartItemCol, Entity as CartItems,
            Model as CartItemModel,
        },
        products::Entity as Products,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::CartItem,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::cart_service::{cart_lines, ensure_stock, find_active_cart, require_active_cart},
    state::AppState,
    validation::{ValidTotalPrice, line_total},
};

/// A line of the caller's ACTIVE cart, locked for update.
async fn find_owned_item(
    txn: &DatabaseTransaction,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<CartItemModel> {
    let not_found = || AppError::not_found("CartItem", "id", id);
    let cart = find_active_cart(txn, user.user_id, true)
        .await?
        .ok_or_else(not_found)?;

    CartItems::find()
        .filter(
            Condition::all()
                .add(CartItemCol::Id.eq(id))
                .add(CartItemCol::CartId.eq(cart.id)),
        )
        .lock(LockType::Update)
        .one(txn)
        .await?
        .ok_or_else(not_found)
}

async fn set_quantity(
    txn: &DatabaseTransaction,
    item: CartItemModel,
    quantity: i32,
) -> AppResult<CartItemModel> {
    let product = Products::find_by_id(item.product_id)
        .one(txn)
        .await?
        .ok_or_else(|| AppError::not_found("Product", "id", item.product_id))?;
    ensure_stock(product.id, product.stock, quantity)?;

    let total = line_total(quantity, item.unit_price)?;
    let mut active: CartItemActive = item.into();
    active.quantity = Set(quantity);
    active.total_price = Set(total);
    active.updated_at = Set(Utc::now().into());
    Ok(active.update(txn).await?)
}

pub async fn list_cart_items(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<CartList>> {
    let (page, limit, offset) = pagination.normalize();
    let cart = require_active_cart(&state.orm, user.user_id, false).await?;

    let total = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .count(&state.orm)
        .await? as i64;
    let items = cart_lines(state, cart.id, Some(limit), offset).await?;

    Ok(ApiResponse::success(
        "OK",
        CartList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn get_cart_item(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<CartItem>> {
    let cart = find_active_cart(&state.orm, user.user_id, false).await?;
    let item = match cart {
        Some(cart) => {
            CartItems::find()
                .filter(
                    Condition::all()
                        .add(CartItemCol::Id.eq(id))
                        .add(CartItemCol::CartId.eq(cart.id)),
                )
                .one(&state.orm)
                .await?
        }
        None => None,
    }
    .ok_or_else(|| AppError::not_found("CartItem", "id", id))?;

    Ok(ApiResponse::success("OK", item.into(), None))
}

pub async fn update_cart_item(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateCartItemRequest,
) -> AppResult<ApiResponse<CartItem>> {
    payload.validate_total_price()?;

    let txn = state.orm.begin().await?;
    let item = find_owned_item(&txn, user, id).await?;
    if payload.unit_price != item.unit_price {
        return Err(AppError::InvalidTotalPrice {
            expected: line_total(payload.quantity, item.unit_price)?,
            actual: payload.total_price,
        });
    }

    let item = set_quantity(&txn, item, payload.quantity).await?;
    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "cart_item_update",
        "cart_items",
        serde_json::json!({ "cart_item_id": item.id, "quantity": item.quantity }),
    )
    .await;

    Ok(ApiResponse::success("Updated", item.into(), Some(Meta::empty())))
}

pub async fn increase_quantity(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<CartItem>> {
    let txn = state.orm.begin().await?;
    let item = find_owned_item(&txn, user, id).await?;
    let quantity = item
        .quantity
        .checked_add(1)
        .ok_or_else(|| AppError::BadRequest("quantity overflows".into()))?;
    let item = set_quantity(&txn, item, quantity).await?;
    txn.commit().await?;

    Ok(ApiResponse::success("Updated", item.into(), Some(Meta::empty())))
}

/// Drops the line entirely once its quantity would reach zero.
pub async fn decrease_quantity(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<CartItem>> {
    let txn = state.orm.begin().await?;
    let item = find_owned_item(&txn, user, id).await?;

    if item.quantity <= 1 {
        item.delete(&txn).await?;
        txn.commit().await?;
        return Ok(ApiResponse::message("Removed from cart"));
    }

    let quantity = item.quantity - 1;
    let item = set_quantity(&txn, item, quantity).await?;
    txn.commit().await?;

    Ok(ApiResponse::success("Updated", item.into(), Some(Meta::empty())))
}

pub async fn remove_cart_item(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let txn = state.orm.begin().await?;
    let item = find_owned_item(&txn, user, id).await?;
    let product_id = item.product_id;
    item.delete(&txn).await?;
    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "cart_item_remove",
        "cart_items",
        serde_json::json!({ "cart_item_id": id, "product_id": product_id }),
    )
    .await;

    Ok(ApiResponse::message("Removed from cart"))
}

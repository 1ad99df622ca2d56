use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, TransactionTrait,
};
use sea_orm::sea_query::LockType;
use sea_orm::ActiveValue::Set;
use uuid::Uuid;

use crate::{
    audit,
    dto::{
        orders::{OrderList, OrderWithItems, UpdateOrderStatusRequest},
        products::{InventoryAdjustRequest, ProductList},
    },
    entity::{
        orders::Entity as Orders,
        products::{ActiveModel as ProductActive, Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Order, Product},
    response::{ApiResponse, Meta},
    routes::params::{LowStockQuery, OrderListQuery},
    services::order_service::{apply_status_transition, order_filter, order_items, paged_orders},
    state::AppState,
};

const DEFAULT_LOW_STOCK_THRESHOLD: i32 = 5;

fn adjusted_stock(current: i32, delta: i32) -> AppResult<i32> {
    if delta == 0 {
        return Err(AppError::BadRequest("delta must not be 0".into()));
    }
    match current.checked_add(delta) {
        Some(stock) if stock >= 0 => Ok(stock),
        _ => Err(AppError::BadRequest("stock cannot be negative".into())),
    }
}

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    let condition = order_filter(None, query.status);
    let (items, meta) = paged_orders(state, condition, &query).await?;
    Ok(ApiResponse::success("Orders", OrderList { items }, Some(meta)))
}

pub async fn get_order_admin(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_admin(user)?;
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Order", "id", id))?;
    let items = order_items(&state.orm, order.id).await?;

    Ok(ApiResponse::success(
        "Order found",
        OrderWithItems {
            order: order.into(),
            items,
        },
        Some(Meta::empty()),
    ))
}

pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;

    let txn = state.orm.begin().await?;
    let existing = Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::not_found("Order", "id", id))?;

    let order = apply_status_transition(&txn, existing, payload.status).await?;
    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "order_status_update",
        "orders",
        serde_json::json!({ "order_id": order.id, "status": order.status }),
    )
    .await;

    Ok(ApiResponse::success(
        "Order updated",
        order.into(),
        Some(Meta::empty()),
    ))
}

pub async fn list_low_stock(
    state: &AppState,
    user: &AuthUser,
    query: LowStockQuery,
) -> AppResult<ApiResponse<ProductList>> {
    ensure_admin(user)?;
    let threshold = query.threshold.unwrap_or(DEFAULT_LOW_STOCK_THRESHOLD);
    let (page, limit, offset) = query.pagination.normalize();

    let finder = Products::find()
        .filter(ProdCol::Stock.lte(threshold))
        .order_by_asc(ProdCol::Stock)
        .order_by_desc(ProdCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Product::from)
        .collect();

    Ok(ApiResponse::success(
        "Low stock",
        ProductList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn adjust_inventory(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: InventoryAdjustRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;

    let txn = state.orm.begin().await?;
    let product = Products::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::not_found("Product", "id", id))?;

    let new_stock = adjusted_stock(product.stock, payload.delta)?;

    let mut active: ProductActive = product.into();
    active.stock = Set(new_stock);
    let updated = active.update(&txn).await?;

    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "inventory_adjust",
        "products",
        serde_json::json!({ "product_id": updated.id, "delta": payload.delta }),
    )
    .await;

    Ok(ApiResponse::success(
        "Inventory updated",
        updated.into(),
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::adjusted_stock;

    #[test]
    fn inventory_adjustment_never_goes_negative() {
        assert_eq!(adjusted_stock(3, 4).unwrap(), 7);
        assert_eq!(adjusted_stock(3, -3).unwrap(), 0);
        assert!(adjusted_stock(3, -4).is_err());
        assert!(adjusted_stock(3, 0).is_err());
        assert!(adjusted_stock(i32::MAX, 1).is_err());
    }
}

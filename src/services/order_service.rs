use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use sea_orm::sea_query::{Expr, LockType};
use uuid::Uuid;

use crate::{
    audit,
    dto::orders::{OrderList, OrderWithItems},
    entity::{
        order_items::{Column as OrderItemCol, Entity as OrderItems},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Order, OrderItem},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    state::AppState,
    status::OrderStatus,
};

pub(crate) fn build_invoice_number(order_id: Uuid) -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix = order_id.simple().to_string();
    format!("INV-{}-{}", date, &suffix[..8]).to_uppercase()
}

/// Condition for orders visible to `user_id`; `None` means every user.
pub(crate) fn order_filter(user_id: Option<Uuid>, status: Option<OrderStatus>) -> Condition {
    let mut condition = Condition::all();
    if let Some(user_id) = user_id {
        condition = condition.add(OrderCol::UserId.eq(user_id));
    }
    if let Some(status) = status {
        condition = condition.add(OrderCol::Status.eq(status));
    }
    condition
}

pub(crate) async fn paged_orders(
    state: &AppState,
    condition: Condition,
    query: &OrderListQuery,
) -> AppResult<(Vec<Order>, Meta)> {
    let (page, limit, offset) = query.pagination.normalize();

    let mut finder = Orders::find().filter(condition);
    finder = match query.sort_order.unwrap_or(SortOrder::Desc) {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;
    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Order::from)
        .collect();

    Ok((orders, Meta::new(page, limit, total)))
}

pub(crate) async fn order_items<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> AppResult<Vec<OrderItem>> {
    Ok(OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .order_by_asc(OrderItemCol::CreatedAt)
        .all(conn)
        .await?
        .into_iter()
        .map(OrderItem::from)
        .collect())
}

/// Puts every line of the order back on the shelf.
async fn restore_stock<C: ConnectionTrait>(conn: &C, order_id: Uuid) -> AppResult<()> {
    let lines = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .all(conn)
        .await?;

    for line in lines {
        Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).add(line.quantity))
            .filter(ProdCol::Id.eq(line.product_id))
            .exec(conn)
            .await?;
    }
    Ok(())
}

/// Moves an order along the lifecycle. The caller should hold a row lock on `order`.
pub(crate) async fn apply_status_transition<C: ConnectionTrait>(
    conn: &C,
    order: OrderModel,
    next: OrderStatus,
) -> AppResult<OrderModel> {
    if !order.status.can_transition_to(next) {
        return Err(AppError::Conflict(format!(
            "Order {} cannot move from {} to {}",
            order.id, order.status, next
        )));
    }

    if next.restores_stock() {
        restore_stock(conn, order.id).await?;
    }

    let previous = order.status;
    let mut active: OrderActive = order.into();
    active.status = Set(next);
    active.updated_at = Set(Utc::now().into());
    let order = active.update(conn).await?;

    tracing::info!(order_id = %order.id, from = %previous, to = %next, "order status changed");
    Ok(order)
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let condition = order_filter(Some(user.user_id), query.status);
    let (items, meta) = paged_orders(state, condition, &query).await?;
    Ok(ApiResponse::success("OK", OrderList { items }, Some(meta)))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Order", "id", id))?;

    let items = order_items(&state.orm, order.id).await?;

    Ok(ApiResponse::success(
        "OK",
        OrderWithItems {
            order: order.into(),
            items,
        },
        Some(Meta::empty()),
    ))
}

pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let txn = state.orm.begin().await?;

    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::not_found("Order", "id", id))?;

    let order = apply_status_transition(&txn, order, OrderStatus::Cancelled).await?;
    let items = order_items(&txn, order.id).await?;
    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "order_cancel",
        "orders",
        serde_json::json!({ "order_id": order.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Order cancelled",
        OrderWithItems {
            order: order.into(),
            items,
        },
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::build_invoice_number;
    use uuid::Uuid;

    #[test]
    fn invoice_number_carries_date_and_order_prefix() {
        let id = Uuid::parse_str("a1b2c3d4-0000-4000-8000-000000000000").unwrap();
        let invoice = build_invoice_number(id);
        let parts: Vec<&str> = invoice.split('-').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "INV");
        assert_eq!(parts[1].len(), 8);
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2], "A1B2C3D4");
    }
}

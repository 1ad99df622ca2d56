use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    audit,
    dto::{
        cart::{AddCartItemRequest, CartItemDto, CartWithItems, CompleteCartRequest},
        orders::OrderWithItems,
    },
    entity::{
        addresses::{Column as AddressCol, Entity as Addresses},
        cart_items::{ActiveModel as CartItemActive, Column as CartItemCol, Entity as CartItems},
        carts::{ActiveModel as CartActive, Column as CartCol, Entity as Carts, Model as CartModel},
        order_items::ActiveModel as OrderItemActive,
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders},
        products::{Column as ProdCol, Entity as Products, Model as ProductModel},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{CartItem, OrderItem, Product},
    response::{ApiResponse, Meta},
    services::{
        order_service::{apply_status_transition, build_invoice_number},
        product_service::find_product,
    },
    state::AppState,
    status::{CartStatus, OrderStatus},
    validation::{ValidTotalPrice, ensure_cart_total, line_total},
};

#[derive(FromRow)]
struct CartLineRow {
    item_id: Uuid,
    quantity: i32,
    unit_price: i64,
    total_price: i64,
    product_id: Uuid,
    category_id: Uuid,
    name: String,
    description: Option<String>,
    price: i64,
    stock: i32,
    created_at: DateTime<Utc>,
}

impl From<CartLineRow> for CartItemDto {
    fn from(row: CartLineRow) -> Self {
        CartItemDto {
            id: row.item_id,
            product: Product {
                id: row.product_id,
                category_id: row.category_id,
                name: row.name,
                description: row.description,
                price: row.price,
                stock: row.stock,
                created_at: row.created_at,
            },
            quantity: row.quantity,
            unit_price: row.unit_price,
            total_price: row.total_price,
        }
    }
}

/// Fails with `InsufficientStock` when `requested` exceeds what is on hand.
pub fn ensure_stock(product_id: Uuid, available: i32, requested: i32) -> AppResult<()> {
    if requested > available {
        return Err(AppError::InsufficientStock {
            product_id,
            requested,
            available,
        });
    }
    Ok(())
}

/// Cart lines joined with their products; `limit = None` returns every line.
pub(crate) async fn cart_lines(
    state: &AppState,
    cart_id: Uuid,
    limit: Option<i64>,
    offset: i64,
) -> AppResult<Vec<CartItemDto>> {
    let rows = sqlx::query_as::<_, CartLineRow>(
        r#"
        SELECT ci.id AS item_id, ci.quantity, ci.unit_price, ci.total_price,
               p.id AS product_id, p.category_id, p.name, p.description, p.price, p.stock,
               p.created_at
        FROM cart_items ci
        JOIN products p ON p.id = ci.product_id
        WHERE ci.cart_id = $1
        ORDER BY ci.created_at ASC, ci.id ASC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(cart_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(state.pool())
    .await?;

    Ok(rows.into_iter().map(CartItemDto::from).collect())
}

async fn cart_with_items(state: &AppState, cart: CartModel) -> AppResult<CartWithItems> {
    let items = cart_lines(state, cart.id, None, 0).await?;
    let total_price = items.iter().map(|item| item.total_price).sum();
    Ok(CartWithItems {
        cart: cart.into(),
        items,
        total_price,
    })
}

/// The caller's ACTIVE cart, optionally row-locked for the rest of the transaction.
pub(crate) async fn find_active_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    lock: bool,
) -> AppResult<Option<CartModel>> {
    let mut finder = Carts::find().filter(
        Condition::all()
            .add(CartCol::UserId.eq(user_id))
            .add(CartCol::Status.eq(CartStatus::Active)),
    );
    if lock {
        finder = finder.lock(LockType::Update);
    }
    Ok(finder.one(conn).await?)
}

pub(crate) async fn require_active_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    lock: bool,
) -> AppResult<CartModel> {
    find_active_cart(conn, user_id, lock)
        .await?
        .ok_or_else(|| AppError::not_found("Cart", "status", "ACTIVE"))
}

async fn get_or_create_active_cart(txn: &DatabaseTransaction, user_id: Uuid) -> AppResult<CartModel> {
    if let Some(cart) = find_active_cart(txn, user_id, true).await? {
        return Ok(cart);
    }

    let cart = CartActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        status: Set(CartStatus::Active),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(txn)
    .await
    .map_err(|err| AppError::from_constraint(err, "User already has an active cart"))?;

    tracing::info!(user_id = %user_id, cart_id = %cart.id, "cart created");
    Ok(cart)
}

async fn transition_cart(
    txn: &DatabaseTransaction,
    cart: CartModel,
    next: CartStatus,
) -> AppResult<CartModel> {
    if !cart.status.can_transition_to(next) {
        return Err(AppError::Conflict(format!(
            "Cart {} cannot move from {:?} to {:?}",
            cart.id, cart.status, next
        )));
    }
    let mut active: CartActive = cart.into();
    active.status = Set(next);
    active.updated_at = Set(Utc::now().into());
    Ok(active.update(txn).await?)
}

/// Catalog price check for a client-priced line.
fn ensure_catalog_price(product: &ProductModel, quantity: i32, unit_price: i64, total_price: i64) -> AppResult<()> {
    if unit_price != product.price {
        return Err(AppError::InvalidTotalPrice {
            expected: line_total(quantity, product.price)?,
            actual: total_price,
        });
    }
    Ok(())
}

pub async fn add_cart_item_to_cart(
    state: &AppState,
    user: &AuthUser,
    item: AddCartItemRequest,
) -> AppResult<ApiResponse<CartItem>> {
    item.validate_total_price()?;

    let txn = state.orm.begin().await?;
    let product = find_product(&txn, item.product_id).await?;
    ensure_catalog_price(&product, item.quantity, item.unit_price, item.total_price)?;

    let cart = get_or_create_active_cart(&txn, user.user_id).await?;

    let existing = CartItems::find()
        .filter(
            Condition::all()
                .add(CartItemCol::CartId.eq(cart.id))
                .add(CartItemCol::ProductId.eq(product.id)),
        )
        .lock(LockType::Update)
        .one(&txn)
        .await?;

    let cart_item = match existing {
        Some(line) => {
            let quantity = line
                .quantity
                .checked_add(item.quantity)
                .ok_or_else(|| AppError::BadRequest("quantity overflows".into()))?;
            ensure_stock(product.id, product.stock, quantity)?;

            let mut active: CartItemActive = line.into();
            active.quantity = Set(quantity);
            active.unit_price = Set(product.price);
            active.total_price = Set(line_total(quantity, product.price)?);
            active.updated_at = Set(Utc::now().into());
            active.update(&txn).await?
        }
        None => {
            ensure_stock(product.id, product.stock, item.quantity)?;
            CartItemActive {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                product_id: Set(product.id),
                quantity: Set(item.quantity),
                unit_price: Set(product.price),
                total_price: Set(item.total_price),
                created_at: NotSet,
                updated_at: NotSet,
            }
            .insert(&txn)
            .await?
        }
    };

    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "cart_update",
        "cart_items",
        serde_json::json!({ "product_id": item.product_id, "quantity": cart_item.quantity }),
    )
    .await;

    Ok(ApiResponse::success("OK", cart_item.into(), None))
}

pub async fn get_active_cart(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<CartWithItems>> {
    let cart = require_active_cart(&state.orm, user.user_id, false).await?;
    let data = cart_with_items(state, cart).await?;
    Ok(ApiResponse::success("OK", data, Some(Meta::empty())))
}

pub async fn complete_cart(
    state: &AppState,
    user: &AuthUser,
    payload: CompleteCartRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let txn = state.orm.begin().await?;
    let cart = require_active_cart(&txn, user.user_id, true).await?;

    if let Some(address_id) = payload.address_id {
        Addresses::find()
            .filter(
                Condition::all()
                    .add(AddressCol::Id.eq(address_id))
                    .add(AddressCol::UserId.eq(user.user_id)),
            )
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::not_found("Address", "id", address_id))?;
    }

    let lines = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .order_by_asc(CartItemCol::CreatedAt)
        .lock(LockType::Update)
        .all(&txn)
        .await?;
    if lines.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".into()));
    }

    let total_amount = ensure_cart_total(
        lines.iter().map(|line| (line.quantity, line.unit_price)),
        payload.total_price,
    )?;

    let product_ids: Vec<Uuid> = lines.iter().map(|line| line.product_id).collect();
    let products: HashMap<Uuid, ProductModel> = Products::find()
        .filter(ProdCol::Id.is_in(product_ids))
        .lock(LockType::Update)
        .all(&txn)
        .await?
        .into_iter()
        .map(|product| (product.id, product))
        .collect();

    for line in &lines {
        let product = products
            .get(&line.product_id)
            .ok_or_else(|| AppError::not_found("Product", "id", line.product_id))?;
        ensure_stock(product.id, product.stock, line.quantity)?;
    }

    let order_id = Uuid::new_v4();
    let order = OrderActive {
        id: Set(order_id),
        user_id: Set(user.user_id),
        cart_id: Set(cart.id),
        address_id: Set(payload.address_id),
        status: Set(OrderStatus::Pending),
        total_amount: Set(total_amount),
        invoice_number: Set(build_invoice_number(order_id)),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut order_items: Vec<OrderItem> = Vec::with_capacity(lines.len());
    for line in &lines {
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(line.product_id),
            quantity: Set(line.quantity),
            unit_price: Set(line.unit_price),
            total_price: Set(line.total_price),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
        order_items.push(item.into());

        Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).sub(line.quantity))
            .filter(ProdCol::Id.eq(line.product_id))
            .exec(&txn)
            .await?;
    }

    let cart = transition_cart(&txn, cart, CartStatus::Completed).await?;
    txn.commit().await?;

    tracing::info!(
        user_id = %user.user_id,
        cart_id = %cart.id,
        order_id = %order.id,
        total = order.total_amount,
        "cart completed"
    );
    audit::record(
        state,
        Some(user.user_id),
        "cart_complete",
        "orders",
        serde_json::json!({ "order_id": order.id, "cart_id": cart.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Checkout success",
        OrderWithItems {
            order: order.into(),
            items: order_items,
        },
        Some(Meta::empty()),
    ))
}

pub async fn reopen_cart(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<CartWithItems>> {
    let txn = state.orm.begin().await?;

    if find_active_cart(&txn, user.user_id, true).await?.is_some() {
        return Err(AppError::Conflict("User already has an active cart".into()));
    }

    let cart = Carts::find()
        .filter(
            Condition::all()
                .add(CartCol::UserId.eq(user.user_id))
                .add(CartCol::Status.eq(CartStatus::Completed)),
        )
        .order_by_desc(CartCol::UpdatedAt)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::not_found("Cart", "status", "COMPLETED"))?;

    let order = Orders::find()
        .filter(OrderCol::CartId.eq(cart.id))
        .order_by_desc(OrderCol::CreatedAt)
        .lock(LockType::Update)
        .one(&txn)
        .await?;

    let cancelled_order = match order {
        Some(order) if order.status == OrderStatus::Pending => {
            let order = apply_status_transition(&txn, order, OrderStatus::Cancelled).await?;
            Some(order.id)
        }
        Some(order) if order.status == OrderStatus::Cancelled => None,
        Some(order) => {
            return Err(AppError::Conflict(format!(
                "Order {} is already {}, cart cannot be reopened",
                order.id, order.status
            )));
        }
        None => None,
    };

    let cart = transition_cart(&txn, cart, CartStatus::Active)
        .await
        .map_err(|err| match err {
            AppError::OrmError(db_err) => {
                AppError::from_constraint(db_err, "User already has an active cart")
            }
            other => other,
        })?;
    txn.commit().await?;

    tracing::info!(user_id = %user.user_id, cart_id = %cart.id, "cart reopened");
    audit::record(
        state,
        Some(user.user_id),
        "cart_reopen",
        "carts",
        serde_json::json!({ "cart_id": cart.id, "cancelled_order_id": cancelled_order }),
    )
    .await;

    let data = cart_with_items(state, cart).await?;
    Ok(ApiResponse::success("Cart reopened", data, Some(Meta::empty())))
}

pub async fn clear_cart(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let cart = require_active_cart(&state.orm, user.user_id, false).await?;
    let result = CartItems::delete_many()
        .filter(CartItemCol::CartId.eq(cart.id))
        .exec(&state.orm)
        .await?;

    audit::record(
        state,
        Some(user.user_id),
        "cart_clear",
        "cart_items",
        serde_json::json!({ "cart_id": cart.id, "removed": result.rows_affected }),
    )
    .await;

    Ok(ApiResponse::message("Cart cleared"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn product(price: i64, stock: i32) -> ProductModel {
        ProductModel {
            id: Uuid::new_v4(),
            category_id: Uuid::new_v4(),
            name: "Ferris Mug".into(),
            description: None,
            price,
            stock,
            created_at: Utc::now().with_timezone(&FixedOffset::east_opt(0).unwrap()),
        }
    }

    #[test]
    fn stock_check_allows_exact_quantity() {
        let id = Uuid::new_v4();
        assert!(ensure_stock(id, 5, 5).is_ok());
        match ensure_stock(id, 5, 6) {
            Err(AppError::InsufficientStock {
                product_id,
                requested,
                available,
            }) => {
                assert_eq!(product_id, id);
                assert_eq!(requested, 6);
                assert_eq!(available, 5);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn stale_client_price_is_an_invalid_total() {
        let mug = product(300, 10);
        assert!(ensure_catalog_price(&mug, 2, 300, 600).is_ok());
        match ensure_catalog_price(&mug, 2, 250, 500) {
            Err(AppError::InvalidTotalPrice { expected, actual }) => {
                assert_eq!(expected, 600);
                assert_eq!(actual, 500);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::{
        cart::{AddCartItemRequest, CartList, CartWithItems, CompleteCartRequest, UpdateCartItemRequest},
        orders::OrderWithItems,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::CartItem,
    response::ApiResponse,
    routes::params::Pagination,
    services::{cart_item_service, cart_service},
    state::AppState,
    validation::ValidJson,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart).delete(clear_cart))
        .route("/complete", post(complete_cart))
        .route("/reopen", post(reopen_cart))
        .route("/items", get(list_items).post(add_item))
        .route(
            "/items/{id}",
            get(get_item).put(update_item).delete(remove_item),
        )
        .route("/items/{id}/increase", post(increase_item))
        .route("/items/{id}/decrease", post(decrease_item))
}

#[utoipa::path(
    get,
    path = "/api/cart",
    responses(
        (status = 200, description = "Active cart with items and total", body = ApiResponse<CartWithItems>),
        (status = 404, description = "No active cart")
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<CartWithItems>>> {
    let resp = cart_service::get_active_cart(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/cart",
    responses(
        (status = 200, description = "All items removed from the active cart"),
        (status = 404, description = "No active cart")
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn clear_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = cart_service::clear_cart(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/cart/complete",
    request_body = CompleteCartRequest,
    responses(
        (status = 200, description = "Cart turned into a pending order", body = ApiResponse<OrderWithItems>),
        (status = 400, description = "Empty cart, total mismatch or insufficient stock"),
        (status = 404, description = "No active cart")
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn complete_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CompleteCartRequest>,
) -> AppResult<Json<ApiResponse<OrderWithItems>>> {
    let resp = cart_service::complete_cart(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/cart/reopen",
    responses(
        (status = 200, description = "Last completed cart is active again", body = ApiResponse<CartWithItems>),
        (status = 404, description = "No completed cart"),
        (status = 409, description = "Active cart exists or order already progressed")
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn reopen_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<CartWithItems>>> {
    let resp = cart_service::reopen_cart(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/cart/items",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20")
    ),
    responses(
        (status = 200, description = "List cart items for current user", body = ApiResponse<CartList>),
        (status = 404, description = "No active cart")
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn list_items(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<CartList>>> {
    let resp = cart_item_service::list_cart_items(&state, &user, pagination).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/cart/items",
    request_body = AddCartItemRequest,
    responses(
        (status = 200, description = "Item added or merged into the active cart", body = ApiResponse<CartItem>),
        (status = 400, description = "Invalid total price or insufficient stock"),
        (status = 404, description = "Product not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn add_item(
    State(state): State<AppState>,
    user: AuthUser,
    ValidJson(payload): ValidJson<AddCartItemRequest>,
) -> AppResult<Json<ApiResponse<CartItem>>> {
    let resp = cart_service::add_cart_item_to_cart(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/cart/items/{id}",
    params(("id" = Uuid, Path, description = "Cart item ID")),
    responses(
        (status = 200, description = "Get cart item", body = ApiResponse<CartItem>),
        (status = 404, description = "Cart item not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn get_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<CartItem>>> {
    let resp = cart_item_service::get_cart_item(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/cart/items/{id}",
    params(("id" = Uuid, Path, description = "Cart item ID")),
    request_body = UpdateCartItemRequest,
    responses(
        (status = 200, description = "Cart item updated", body = ApiResponse<CartItem>),
        (status = 400, description = "Invalid total price or insufficient stock"),
        (status = 404, description = "Cart item not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn update_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    ValidJson(payload): ValidJson<UpdateCartItemRequest>,
) -> AppResult<Json<ApiResponse<CartItem>>> {
    let resp = cart_item_service::update_cart_item(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/cart/items/{id}",
    params(("id" = Uuid, Path, description = "Cart item ID")),
    responses(
        (status = 200, description = "Cart item removed"),
        (status = 404, description = "Cart item not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn remove_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = cart_item_service::remove_cart_item(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/cart/items/{id}/increase",
    params(("id" = Uuid, Path, description = "Cart item ID")),
    responses(
        (status = 200, description = "Quantity increased by one", body = ApiResponse<CartItem>),
        (status = 400, description = "Insufficient stock"),
        (status = 404, description = "Cart item not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn increase_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<CartItem>>> {
    let resp = cart_item_service::increase_quantity(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/cart/items/{id}/decrease",
    params(("id" = Uuid, Path, description = "Cart item ID")),
    responses(
        (status = 200, description = "Quantity decreased by one; data is null once the line is removed", body = ApiResponse<CartItem>),
        (status = 404, description = "Cart item not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn decrease_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<CartItem>>> {
    let resp = cart_item_service::decrease_quantity(&state, &user, id).await?;
    Ok(Json(resp))
}

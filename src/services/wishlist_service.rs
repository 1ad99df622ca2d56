use uuid::Uuid;

use crate::{
    audit,
    dto::wishlist::{AddWishlistRequest, WishlistProductList, WishlistStatus},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Product, WishlistEntry},
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::product_service::find_product,
    state::AppState,
};

pub async fn list_wishlist(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<WishlistProductList>> {
    let (page, limit, offset) = pagination.normalize();
    let products = sqlx::query_as::<_, Product>(
        r#"
        SELECT p.id, p.category_id, p.name, p.description, p.price, p.stock, p.created_at
        FROM wishlist w
        JOIN products p ON p.id = w.product_id
        WHERE w.user_id = $1
        ORDER BY w.created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user.user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(state.pool())
    .await?;

    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM wishlist WHERE user_id = $1")
        .bind(user.user_id)
        .fetch_one(state.pool())
        .await?;

    let meta = Meta::new(page, limit, total.0);
    let data = WishlistProductList { items: products };
    Ok(ApiResponse::success("OK", data, Some(meta)))
}

/// Adding a product twice returns the existing entry.
pub async fn add_to_wishlist(
    state: &AppState,
    user: &AuthUser,
    payload: AddWishlistRequest,
) -> AppResult<ApiResponse<WishlistEntry>> {
    find_product(&state.orm, payload.product_id).await?;

    let inserted = sqlx::query_as::<_, WishlistEntry>(
        r#"
        INSERT INTO wishlist (id, user_id, product_id)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id, product_id) DO NOTHING
        RETURNING id, user_id, product_id, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user.user_id)
    .bind(payload.product_id)
    .fetch_optional(state.pool())
    .await?;

    let entry = match inserted {
        Some(entry) => {
            audit::record(
                state,
                Some(user.user_id),
                "wishlist_add",
                "wishlist",
                serde_json::json!({ "product_id": payload.product_id }),
            )
            .await;
            entry
        }
        None => {
            sqlx::query_as::<_, WishlistEntry>(
                "SELECT id, user_id, product_id, created_at FROM wishlist WHERE user_id = $1 AND product_id = $2",
            )
            .bind(user.user_id)
            .bind(payload.product_id)
            .fetch_one(state.pool())
            .await?
        }
    };

    Ok(ApiResponse::success(
        "Added to wishlist",
        entry,
        Some(Meta::empty()),
    ))
}

pub async fn remove_from_wishlist(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = sqlx::query("DELETE FROM wishlist WHERE user_id = $1 AND product_id = $2")
        .bind(user.user_id)
        .bind(product_id)
        .execute(state.pool())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Wishlist", "product_id", product_id));
    }

    audit::record(
        state,
        Some(user.user_id),
        "wishlist_remove",
        "wishlist",
        serde_json::json!({ "product_id": product_id }),
    )
    .await;

    Ok(ApiResponse::message("Removed from wishlist"))
}

pub async fn is_in_wishlist(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<WishlistStatus>> {
    let (in_wishlist,): (bool,) = sqlx::query_as(
        "SELECT EXISTS (SELECT 1 FROM wishlist WHERE user_id = $1 AND product_id = $2)",
    )
    .bind(user.user_id)
    .bind(product_id)
    .fetch_one(state.pool())
    .await?;

    Ok(ApiResponse::success(
        "OK",
        WishlistStatus {
            product_id,
            in_wishlist,
        },
        None,
    ))
}

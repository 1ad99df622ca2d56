use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
};
use uuid::Uuid;

use crate::{
    dto::reviews::{AddReviewRequest, ProductReviews, UpdateReviewRequest},
    error::AppResult,
    middleware::auth::AuthUser,
    models::Review,
    response::ApiResponse,
    services::review_service,
    state::AppState,
};

/// Reviews addressed through their product, merged into the products router.
pub fn product_router() -> Router<AppState> {
    Router::new().route("/{id}/reviews", get(list_product_reviews).post(add_review))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}", put(update_review).delete(delete_review))
        .route("/{id}/like", post(like_review))
}

#[utoipa::path(
    get,
    path = "/api/products/{id}/reviews",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "The caller's review and everyone else's", body = ApiResponse<ProductReviews>),
        (status = 404, description = "Product not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Reviews"
)]
pub async fn list_product_reviews(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ProductReviews>>> {
    let resp = review_service::get_reviews_for_product(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/products/{id}/reviews",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = AddReviewRequest,
    responses(
        (status = 201, description = "Review added", body = ApiResponse<Review>),
        (status = 400, description = "Rating out of range"),
        (status = 404, description = "Product not found"),
        (status = 409, description = "Product already reviewed by this user")
    ),
    security(("bearer_auth" = [])),
    tag = "Reviews"
)]
pub async fn add_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddReviewRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Review>>)> {
    let resp = review_service::add_review(&state, &user, id, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    put,
    path = "/api/reviews/{id}",
    params(("id" = Uuid, Path, description = "Review ID")),
    request_body = UpdateReviewRequest,
    responses(
        (status = 200, description = "Review updated", body = ApiResponse<Review>),
        (status = 404, description = "Review not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Reviews"
)]
pub async fn update_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateReviewRequest>,
) -> AppResult<Json<ApiResponse<Review>>> {
    let resp = review_service::update_review(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/reviews/{id}",
    params(("id" = Uuid, Path, description = "Review ID")),
    responses(
        (status = 200, description = "Review deleted"),
        (status = 404, description = "Review not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Reviews"
)]
pub async fn delete_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    let resp = review_service::delete_review(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/reviews/{id}/like",
    params(("id" = Uuid, Path, description = "Review ID")),
    responses(
        (status = 200, description = "Review liked; repeat likes are not counted", body = ApiResponse<Review>),
        (status = 400, description = "Cannot like your own review"),
        (status = 404, description = "Review not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Reviews"
)]
pub async fn like_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Review>>> {
    let resp = review_service::like_review(&state, &user, id).await?;
    Ok(Json(resp))
}

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseTransaction, EntityTrait,
    ModelTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType, OnConflict};
use uuid::Uuid;

use crate::{
    audit,
    dto::reviews::{AddReviewRequest, ProductReviews, UpdateReviewRequest},
    entity::{
        review_images::{
            ActiveModel as ImageActive, Column as ImageCol, Entity as ReviewImages,
        },
        review_likes::{ActiveModel as LikeActive, Column as LikeCol, Entity as ReviewLikes},
        reviews::{ActiveModel as ReviewActive, Column as ReviewCol, Entity as Reviews, Model as ReviewModel},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Review, ReviewImage},
    response::{ApiResponse, Meta},
    services::product_service::find_product,
    state::AppState,
};

fn validate_rating(rating: i16) -> AppResult<()> {
    if !(1..=5).contains(&rating) {
        return Err(AppError::BadRequest("rating must be between 1 and 5".into()));
    }
    Ok(())
}

fn validate_message(message: &str) -> AppResult<()> {
    if message.trim().is_empty() {
        return Err(AppError::BadRequest("review message must not be empty".into()));
    }
    Ok(())
}

/// Splits a product's reviews into the caller's own and everyone else's.
pub fn partition_reviews(caller_id: Uuid, reviews: Vec<Review>) -> ProductReviews {
    let review_count = reviews.len();
    let average_rating = if review_count == 0 {
        None
    } else {
        let sum: i64 = reviews.iter().map(|r| i64::from(r.rating)).sum();
        Some(sum as f64 / review_count as f64)
    };

    let (mine, other_reviews): (Vec<Review>, Vec<Review>) =
        reviews.into_iter().partition(|r| r.user_id == caller_id);

    ProductReviews {
        my_review: mine.into_iter().next(),
        other_reviews,
        review_count,
        average_rating,
    }
}

async fn insert_images(txn: &DatabaseTransaction, review_id: Uuid, urls: Vec<String>) -> AppResult<Vec<ReviewImage>> {
    let mut images = Vec::with_capacity(urls.len());
    for url in urls {
        if url.trim().is_empty() {
            return Err(AppError::BadRequest("image url must not be empty".into()));
        }
        let image = ImageActive {
            id: Set(Uuid::new_v4()),
            review_id: Set(review_id),
            url: Set(url),
            created_at: NotSet,
        }
        .insert(txn)
        .await?;
        images.push(image.into());
    }
    Ok(images)
}

async fn images_for<C: ConnectionTrait>(conn: &C, review_id: Uuid) -> AppResult<Vec<ReviewImage>> {
    Ok(ReviewImages::find()
        .filter(ImageCol::ReviewId.eq(review_id))
        .order_by_asc(ImageCol::CreatedAt)
        .all(conn)
        .await?
        .into_iter()
        .map(ReviewImage::from)
        .collect())
}

/// The caller's own review; anyone else's counts as missing.
async fn find_authored(
    txn: &DatabaseTransaction,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ReviewModel> {
    Reviews::find()
        .filter(
            Condition::all()
                .add(ReviewCol::Id.eq(id))
                .add(ReviewCol::UserId.eq(user.user_id)),
        )
        .lock(LockType::Update)
        .one(txn)
        .await?
        .ok_or_else(|| AppError::not_found("Review", "id", id))
}

pub async fn add_review(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    payload: AddReviewRequest,
) -> AppResult<ApiResponse<Review>> {
    validate_rating(payload.rating)?;
    validate_message(&payload.message)?;

    let txn = state.orm.begin().await?;
    find_product(&txn, product_id).await?;

    let duplicate = Reviews::find()
        .filter(
            Condition::all()
                .add(ReviewCol::UserId.eq(user.user_id))
                .add(ReviewCol::ProductId.eq(product_id)),
        )
        .one(&txn)
        .await?;
    if duplicate.is_some() {
        return Err(AppError::Conflict(format!(
            "User has already reviewed product {product_id}"
        )));
    }

    let review = ReviewActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        product_id: Set(product_id),
        rating: Set(payload.rating),
        message: Set(payload.message),
        likes: Set(0),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await
    .map_err(|err| {
        AppError::from_constraint(err, format!("User has already reviewed product {product_id}"))
    })?;

    let images = insert_images(&txn, review.id, payload.images).await?;
    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "review_add",
        "reviews",
        serde_json::json!({ "review_id": review.id, "product_id": product_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Review added",
        Review::from_entity(review, images),
        Some(Meta::empty()),
    ))
}

pub async fn update_review(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateReviewRequest,
) -> AppResult<ApiResponse<Review>> {
    let txn = state.orm.begin().await?;
    let existing = find_authored(&txn, user, id).await?;

    let mut active: ReviewActive = existing.into();
    if let Some(rating) = payload.rating {
        validate_rating(rating)?;
        active.rating = Set(rating);
    }
    if let Some(message) = payload.message {
        validate_message(&message)?;
        active.message = Set(message);
    }
    active.updated_at = Set(Utc::now().into());
    let review = active.update(&txn).await?;

    let images = match payload.images {
        Some(urls) => {
            ReviewImages::delete_many()
                .filter(ImageCol::ReviewId.eq(review.id))
                .exec(&txn)
                .await?;
            insert_images(&txn, review.id, urls).await?
        }
        None => images_for(&txn, review.id).await?,
    };
    txn.commit().await?;

    Ok(ApiResponse::success(
        "Review updated",
        Review::from_entity(review, images),
        Some(Meta::empty()),
    ))
}

pub async fn delete_review(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let txn = state.orm.begin().await?;
    let review = find_authored(&txn, user, id).await?;

    ReviewImages::delete_many()
        .filter(ImageCol::ReviewId.eq(review.id))
        .exec(&txn)
        .await?;
    review.delete(&txn).await?;
    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "review_delete",
        "reviews",
        serde_json::json!({ "review_id": id }),
    )
    .await;

    Ok(ApiResponse::message("Review deleted"))
}

/// A user likes a review at most once; repeating the like leaves the count as is.
pub async fn like_review(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Review>> {
    let txn = state.orm.begin().await?;
    let review = Reviews::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::not_found("Review", "id", id))?;
    if review.user_id == user.user_id {
        return Err(AppError::BadRequest("You cannot like your own review".into()));
    }

    let inserted = ReviewLikes::insert(LikeActive {
        review_id: Set(id),
        user_id: Set(user.user_id),
        created_at: NotSet,
    })
    .on_conflict(
        OnConflict::columns([LikeCol::ReviewId, LikeCol::UserId])
            .do_nothing()
            .to_owned(),
    )
    .exec_without_returning(&txn)
    .await?;

    let review = if inserted > 0 {
        Reviews::update_many()
            .col_expr(ReviewCol::Likes, Expr::col(ReviewCol::Likes).add(1))
            .filter(ReviewCol::Id.eq(id))
            .exec(&txn)
            .await?;
        Reviews::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::not_found("Review", "id", id))?
    } else {
        review
    };
    let images = images_for(&txn, review.id).await?;
    txn.commit().await?;

    tracing::debug!(review_id = %id, user_id = %user.user_id, likes = review.likes, "review liked");

    Ok(ApiResponse::success(
        "Liked",
        Review::from_entity(review, images),
        None,
    ))
}

pub async fn get_reviews_for_product(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<ProductReviews>> {
    find_product(&state.orm, product_id).await?;

    let reviews = Reviews::find()
        .filter(ReviewCol::ProductId.eq(product_id))
        .order_by_desc(ReviewCol::CreatedAt)
        .order_by_asc(ReviewCol::Id)
        .find_with_related(ReviewImages)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|(review, images)| {
            Review::from_entity(review, images.into_iter().map(ReviewImage::from).collect())
        })
        .collect();

    let data = partition_reviews(user.user_id, reviews);
    Ok(ApiResponse::success("Reviews", data, Some(Meta::empty())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(user_id: Uuid, rating: i16) -> Review {
        Review {
            id: Uuid::new_v4(),
            user_id,
            product_id: Uuid::nil(),
            rating,
            message: "solid".into(),
            likes: 0,
            images: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn callers_review_goes_into_its_own_bucket() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let result = partition_reviews(me, vec![review(other, 4), review(me, 2), review(other, 3)]);

        assert_eq!(result.my_review.as_ref().map(|r| r.user_id), Some(me));
        assert_eq!(result.other_reviews.len(), 2);
        assert!(result.other_reviews.iter().all(|r| r.user_id == other));
        assert_eq!(result.review_count, 3);
        assert_eq!(result.average_rating, Some(3.0));
    }

    #[test]
    fn no_reviews_has_no_average() {
        let result = partition_reviews(Uuid::new_v4(), Vec::new());
        assert!(result.my_review.is_none());
        assert!(result.other_reviews.is_empty());
        assert_eq!(result.review_count, 0);
        assert_eq!(result.average_rating, None);
    }

    #[test]
    fn rating_must_be_one_to_five() {
        assert!(validate_rating(0).is_err());
        assert!(validate_rating(6).is_err());
        assert!((1..=5).all(|r| validate_rating(r).is_ok()));
    }
}

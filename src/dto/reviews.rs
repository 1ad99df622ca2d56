use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Review;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddReviewRequest {
    pub rating: i16,
    pub message: String,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateReviewRequest {
    pub rating: Option<i16>,
    pub message: Option<String>,
    /// Replaces the whole image set when present.
    pub images: Option<Vec<String>>,
}

/// Reviews of one product, split into the caller's own review and everyone else's.
#[derive(Debug, Serialize, ToSchema)]
pub struct ProductReviews {
    pub my_review: Option<Review>,
    pub other_reviews: Vec<Review>,
    pub review_count: usize,
    pub average_rating: Option<f64>,
}

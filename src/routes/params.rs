use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Deserializer};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::status::OrderStatus;

/// Query strings hand every value over as text, and `#[serde(flatten)]` keeps
/// it that way, so numeric query fields are parsed here.
fn number_from_str<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

#[derive(Debug, Default, Clone, Deserialize, ToSchema)]
pub struct Pagination {
    #[serde(default, deserialize_with = "number_from_str")]
    pub page: Option<i64>,
    #[serde(default, deserialize_with = "number_from_str")]
    pub per_page: Option<i64>,
}

impl Pagination {
    /// Returns `(page, per_page, offset)` with page >= 1 and per_page in 1..=100.
    pub fn normalize(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(20).clamp(1, 100);
        let offset = (page - 1) * per_page;
        (page, per_page, offset)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProductSortBy {
    CreatedAt,
    Price,
    Name,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ProductQuery {
    #[serde(flatten)]
    pub pagination: Pagination,
    pub q: Option<String>,
    pub category_id: Option<Uuid>,
    #[serde(default, deserialize_with = "number_from_str")]
    pub min_price: Option<i64>,
    #[serde(default, deserialize_with = "number_from_str")]
    pub max_price: Option<i64>,
    pub sort_by: Option<ProductSortBy>,
    pub sort_order: Option<SortOrder>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct OrderListQuery {
    #[serde(flatten)]
    pub pagination: Pagination,
    pub status: Option<OrderStatus>,
    pub sort_order: Option<SortOrder>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct LowStockQuery {
    #[serde(flatten)]
    pub pagination: Pagination,
    #[serde(default, deserialize_with = "number_from_str")]
    pub threshold: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_first_page_of_twenty() {
        assert_eq!(Pagination::default().normalize(), (1, 20, 0));
    }

    #[test]
    fn clamps_page_and_page_size() {
        let p = Pagination {
            page: Some(0),
            per_page: Some(1000),
        };
        assert_eq!(p.normalize(), (1, 100, 0));

        let p = Pagination {
            page: Some(3),
            per_page: Some(10),
        };
        assert_eq!(p.normalize(), (3, 10, 20));
    }

    #[test]
    fn flattened_query_parses_numbers_from_text() {
        let query: ProductQuery =
            serde_json::from_value(serde_json::json!({
                "page": "2",
                "per_page": "5",
                "min_price": "100",
                "sort_by": "price"
            }))
            .unwrap();
        assert_eq!(query.pagination.normalize(), (2, 5, 5));
        assert_eq!(query.min_price, Some(100));
        assert!(query.max_price.is_none());

        let low: LowStockQuery = serde_json::from_value(serde_json::json!({ "threshold": "3" })).unwrap();
        assert_eq!(low.threshold, Some(3));
    }
}

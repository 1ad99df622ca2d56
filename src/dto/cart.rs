use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{Cart, Product},
    validation::{ValidTotalPrice, ensure_line_total},
};

/// A priced cart line as submitted by the client.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AddCartItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: i64,
    pub total_price: i64,
}

impl ValidTotalPrice for AddCartItemRequest {
    fn validate_total_price(&self) -> AppResult<()> {
        ensure_line_total(self.quantity, self.unit_price, self.total_price)
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateCartItemRequest {
    pub quantity: i32,
    pub unit_price: i64,
    pub total_price: i64,
}

impl ValidTotalPrice for UpdateCartItemRequest {
    fn validate_total_price(&self) -> AppResult<()> {
        ensure_line_total(self.quantity, self.unit_price, self.total_price)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CompleteCartRequest {
    /// Total the client expects to pay, in minor units.
    pub total_price: i64,
    pub address_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartItemDto {
    pub id: Uuid,
    pub product: Product,
    pub quantity: i32,
    pub unit_price: i64,
    pub total_price: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartList {
    pub items: Vec<CartItemDto>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartWithItems {
    pub cart: Cart,
    pub items: Vec<CartItemDto>,
    pub total_price: i64,
}

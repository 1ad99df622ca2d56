//! Lifecycle states for carts and orders.
//!
//! Both enums are stored as upper-case text columns and serialized the same
//! way over the API.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CartStatus {
    #[sea_orm(string_value = "ACTIVE")]
    Active,
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
}

impl CartStatus {
    pub fn can_transition_to(self, next: CartStatus) -> bool {
        matches!(
            (self, next),
            (CartStatus::Active, CartStatus::Completed) | (CartStatus::Completed, CartStatus::Active)
        )
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "PROCESSING")]
    Processing,
    #[sea_orm(string_value = "SHIPPED")]
    Shipped,
    #[sea_orm(string_value = "DELIVERED")]
    Delivered,
    #[sea_orm(string_value = "CANCELLED")]
    Cancelled,
    #[sea_orm(string_value = "RETURNED")]
    Returned,
    #[sea_orm(string_value = "FAILED")]
    Failed,
}

impl OrderStatus {
    /// Forward path is PENDING -> PROCESSING -> SHIPPED -> DELIVERED.
    /// CANCELLED and FAILED exit before delivery, RETURNED only after it.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match self {
            Pending => matches!(next, Processing | Cancelled | Failed),
            Processing => matches!(next, Shipped | Cancelled | Failed),
            Shipped => matches!(next, Delivered | Failed),
            Delivered => matches!(next, Returned),
            Cancelled | Returned | Failed => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Cancelled | OrderStatus::Returned | OrderStatus::Failed
        )
    }

    /// Entering one of these states puts the ordered quantities back in stock.
    pub fn restores_stock(self) -> bool {
        self.is_terminal()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Returned => "RETURNED",
            OrderStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::Iterable;

    #[test]
    fn forward_path_is_allowed() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Delivered));
        assert!(OrderStatus::Delivered.can_transition_to(OrderStatus::Returned));
    }

    #[test]
    fn skipping_or_going_backwards_is_rejected() {
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Shipped));
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Processing));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Returned));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for from in OrderStatus::iter().filter(|s| s.is_terminal()) {
            for to in OrderStatus::iter() {
                assert!(!from.can_transition_to(to), "{from} -> {to} should be rejected");
            }
        }
    }

    #[test]
    fn no_self_transitions() {
        for status in OrderStatus::iter() {
            assert!(!status.can_transition_to(status));
        }
        assert!(!CartStatus::Active.can_transition_to(CartStatus::Active));
    }

    #[test]
    fn cart_toggles_between_active_and_completed() {
        assert!(CartStatus::Active.can_transition_to(CartStatus::Completed));
        assert!(CartStatus::Completed.can_transition_to(CartStatus::Active));
    }

    #[test]
    fn statuses_serialize_upper_case() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::Processing).unwrap(),
            "\"PROCESSING\""
        );
        let parsed: CartStatus = serde_json::from_str("\"COMPLETED\"").unwrap();
        assert_eq!(parsed, CartStatus::Completed);
    }
}

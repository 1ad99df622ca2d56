//! Total-price consistency checks.
//!
//! Payloads carrying priced cart lines implement [`ValidTotalPrice`]; handlers
//! receive them through [`ValidJson`], so an inconsistent payload is rejected
//! before any service code runs.

use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
};
use serde::de::DeserializeOwned;

use crate::error::{AppError, AppResult};

pub trait ValidTotalPrice {
    fn validate_total_price(&self) -> AppResult<()>;
}

/// `quantity * unit_price`, rejecting non-positive quantities, negative prices and overflow.
pub fn line_total(quantity: i32, unit_price: i64) -> AppResult<i64> {
    if quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }
    if unit_price < 0 {
        return Err(AppError::BadRequest(
            "unit_price must not be negative".to_string(),
        ));
    }
    unit_price
        .checked_mul(i64::from(quantity))
        .ok_or_else(|| AppError::BadRequest("line total overflows".to_string()))
}

pub fn ensure_line_total(quantity: i32, unit_price: i64, total_price: i64) -> AppResult<()> {
    let expected = line_total(quantity, unit_price)?;
    if expected != total_price {
        return Err(AppError::InvalidTotalPrice {
            expected,
            actual: total_price,
        });
    }
    Ok(())
}

/// Sum of `(quantity, unit_price)` lines.
pub fn cart_total<I>(lines: I) -> AppResult<i64>
where
    I: IntoIterator<Item = (i32, i64)>,
{
    lines.into_iter().try_fold(0_i64, |acc, (quantity, unit_price)| {
        acc.checked_add(line_total(quantity, unit_price)?)
            .ok_or_else(|| AppError::BadRequest("cart total overflows".to_string()))
    })
}

pub fn ensure_cart_total<I>(lines: I, claimed: i64) -> AppResult<i64>
where
    I: IntoIterator<Item = (i32, i64)>,
{
    let expected = cart_total(lines)?;
    if expected != claimed {
        return Err(AppError::InvalidTotalPrice {
            expected,
            actual: claimed,
        });
    }
    Ok(expected)
}

/// JSON body extractor that runs [`ValidTotalPrice`] after deserializing.
#[derive(Debug, Clone)]
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + ValidTotalPrice,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| AppError::BadRequest(rejection.body_text()))?;
        value.validate_total_price()?;
        Ok(ValidJson(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_total_multiplies_quantity_and_unit_price() {
        assert_eq!(line_total(3, 250).unwrap(), 750);
    }

    #[test]
    fn mismatched_line_total_is_rejected() {
        match ensure_line_total(2, 300, 500) {
            Err(AppError::InvalidTotalPrice { expected, actual }) => {
                assert_eq!(expected, 600);
                assert_eq!(actual, 500);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn zero_quantity_is_rejected() {
        assert!(matches!(line_total(0, 100), Err(AppError::BadRequest(_))));
        assert!(matches!(line_total(-1, 100), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn overflow_is_reported_not_wrapped() {
        assert!(matches!(line_total(2, i64::MAX), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn cart_total_example_from_two_products() {
        // ProductA: 2 x 3.00, ProductB: 1 x 5.00
        let lines = [(2, 300), (1, 500)];
        assert_eq!(ensure_cart_total(lines, 1100).unwrap(), 1100);

        match ensure_cart_total(lines, 1000) {
            Err(AppError::InvalidTotalPrice { expected, actual }) => {
                assert_eq!(expected, 1100);
                assert_eq!(actual, 1000);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn empty_cart_totals_zero() {
        assert_eq!(cart_total(std::iter::empty()).unwrap(), 0);
    }
}

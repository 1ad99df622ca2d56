use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use sea_orm::ActiveValue::NotSet;
use uuid::Uuid;

use crate::{
    audit,
    dto::addresses::{AddressList, CreateAddressRequest, UpdateAddressRequest},
    entity::addresses::{ActiveModel, Column, Entity as Addresses, Model as AddressModel},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Address,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

fn required(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{field} must not be empty")));
    }
    Ok(())
}

async fn find_owned(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<AddressModel> {
    Addresses::find()
        .filter(
            Condition::all()
                .add(Column::Id.eq(id))
                .add(Column::UserId.eq(user.user_id)),
        )
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("Address", "id", id))
}

pub async fn add_address(
    state: &AppState,
    user: &AuthUser,
    payload: CreateAddressRequest,
) -> AppResult<ApiResponse<Address>> {
    required("street", &payload.street)?;
    required("city", &payload.city)?;
    required("postal_code", &payload.postal_code)?;
    required("country", &payload.country)?;

    let address = ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        street: Set(payload.street),
        city: Set(payload.city),
        state: Set(payload.state),
        postal_code: Set(payload.postal_code),
        country: Set(payload.country),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        state,
        Some(user.user_id),
        "address_add",
        "addresses",
        serde_json::json!({ "address_id": address.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Address added",
        address.into(),
        Some(Meta::empty()),
    ))
}

pub async fn list_addresses(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<AddressList>> {
    let (page, limit, offset) = pagination.normalize();
    let finder = Addresses::find()
        .filter(Column::UserId.eq(user.user_id))
        .order_by_desc(Column::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Address::from)
        .collect();

    Ok(ApiResponse::success(
        "OK",
        AddressList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn get_address(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Address>> {
    let address = find_owned(state, user, id).await?;
    Ok(ApiResponse::success("Address", address.into(), None))
}

pub async fn update_address(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateAddressRequest,
) -> AppResult<ApiResponse<Address>> {
    let existing = find_owned(state, user, id).await?;

    let mut active: ActiveModel = existing.into();
    if let Some(street) = payload.street {
        required("street", &street)?;
        active.street = Set(street);
    }
    if let Some(city) = payload.city {
        required("city", &city)?;
        active.city = Set(city);
    }
    if let Some(region) = payload.state {
        active.state = Set(Some(region));
    }
    if let Some(postal_code) = payload.postal_code {
        required("postal_code", &postal_code)?;
        active.postal_code = Set(postal_code);
    }
    if let Some(country) = payload.country {
        required("country", &country)?;
        active.country = Set(country);
    }

    let address = active.update(&state.orm).await?;
    Ok(ApiResponse::success(
        "Address updated",
        address.into(),
        Some(Meta::empty()),
    ))
}

pub async fn delete_address(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = Addresses::delete_many()
        .filter(
            Condition::all()
                .add(Column::Id.eq(id))
                .add(Column::UserId.eq(user.user_id)),
        )
        .exec(&state.orm)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::not_found("Address", "id", id));
    }

    audit::record(
        state,
        Some(user.user_id),
        "address_delete",
        "addresses",
        serde_json::json!({ "address_id": id }),
    )
    .await;

    Ok(ApiResponse::message("Address deleted"))
}

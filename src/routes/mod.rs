use axum::Router;

use crate::state::AppState;

pub mod addresses;
pub mod admin;
pub mod auth;
pub mod cart;
pub mod categories;
pub mod doc;
pub mod health;
pub mod orders;
pub mod params;
pub mod products;
pub mod reviews;
pub mod roles;
pub mod wishlist;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/roles", roles::router())
        .nest("/users", roles::user_router())
        .nest("/addresses", addresses::router())
        .nest("/categories", categories::router())
        .nest("/products", products::router())
        .nest("/reviews", reviews::router())
        .nest("/cart", cart::router())
        .nest("/orders", orders::router())
        .nest("/wishlist", wishlist::router())
        .nest("/admin", admin::router())
}

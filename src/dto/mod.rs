pub mod addresses;
pub mod auth;
pub mod cart;
pub mod categories;
pub mod orders;
pub mod products;
pub mod reviews;
pub mod roles;
pub mod wishlist;

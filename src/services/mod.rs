pub mod address_service;
pub mod admin_service;
pub mod auth_service;
pub mod cart_item_service;
pub mod cart_service;
pub mod category_service;
pub mod order_service;
pub mod product_service;
pub mod review_service;
pub mod role_service;
pub mod wishlist_service;

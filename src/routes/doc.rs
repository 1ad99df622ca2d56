use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        addresses::{AddressList, CreateAddressRequest, UpdateAddressRequest},
        auth::{LoginRequest, LoginResponse, RegisterRequest},
        cart::{
            AddCartItemRequest, CartItemDto, CartList, CartWithItems, CompleteCartRequest,
            UpdateCartItemRequest,
        },
        categories::{CategoryList, CreateCategoryRequest, UpdateCategoryRequest},
        orders::{OrderList, OrderWithItems, UpdateOrderStatusRequest},
        products::{CreateProductRequest, InventoryAdjustRequest, ProductList, UpdateProductRequest},
        reviews::{AddReviewRequest, ProductReviews, UpdateReviewRequest},
        roles::{AssignRoleRequest, CreateRoleRequest, RoleList},
        wishlist::{AddWishlistRequest, WishlistProductList, WishlistStatus},
    },
    error::ErrorBody,
    models::{
        Address, Cart, CartItem, Category, Order, OrderItem, Product, Review, ReviewImage, Role,
        User, WishlistEntry,
    },
    response::{ApiResponse, Meta},
    routes::{
        addresses, admin, auth, cart, categories, health, orders, params, products, reviews,
        roles, wishlist,
    },
    status::{CartStatus, OrderStatus},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register,
        auth::login,
        auth::me,
        roles::list_roles,
        roles::create_role,
        roles::get_role,
        roles::delete_role,
        roles::assign_role,
        roles::revoke_role,
        addresses::list_addresses,
        addresses::add_address,
        addresses::get_address,
        addresses::update_address,
        addresses::delete_address,
        categories::list_categories,
        categories::create_category,
        categories::get_category,
        categories::update_category,
        categories::delete_category,
        products::list_products,
        products::create_product,
        products::get_product,
        products::update_product,
        products::delete_product,
        reviews::list_product_reviews,
        reviews::add_review,
        reviews::update_review,
        reviews::delete_review,
        reviews::like_review,
        cart::get_cart,
        cart::clear_cart,
        cart::complete_cart,
        cart::reopen_cart,
        cart::list_items,
        cart::add_item,
        cart::get_item,
        cart::update_item,
        cart::remove_item,
        cart::increase_item,
        cart::decrease_item,
        orders::list_orders,
        orders::get_order,
        orders::cancel_order,
        wishlist::list_wishlist,
        wishlist::add_to_wishlist,
        wishlist::is_in_wishlist,
        wishlist::remove_from_wishlist,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::update_order_status,
        admin::list_low_stock,
        admin::adjust_inventory
    ),
    components(
        schemas(
            User,
            Role,
            Address,
            Category,
            Product,
            Cart,
            CartItem,
            Order,
            OrderItem,
            Review,
            ReviewImage,
            WishlistEntry,
            CartStatus,
            OrderStatus,
            ErrorBody,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            CreateRoleRequest,
            AssignRoleRequest,
            RoleList,
            CreateAddressRequest,
            UpdateAddressRequest,
            AddressList,
            CreateCategoryRequest,
            UpdateCategoryRequest,
            CategoryList,
            CreateProductRequest,
            UpdateProductRequest,
            InventoryAdjustRequest,
            ProductList,
            AddCartItemRequest,
            UpdateCartItemRequest,
            CompleteCartRequest,
            CartItemDto,
            CartList,
            CartWithItems,
            UpdateOrderStatusRequest,
            OrderList,
            OrderWithItems,
            AddReviewRequest,
            UpdateReviewRequest,
            ProductReviews,
            AddWishlistRequest,
            WishlistProductList,
            WishlistStatus,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            params::LowStockQuery,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<CartWithItems>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Roles", description = "Role management endpoints"),
        (name = "Addresses", description = "Shipping address endpoints"),
        (name = "Categories", description = "Category endpoints"),
        (name = "Products", description = "Product endpoints"),
        (name = "Reviews", description = "Product review endpoints"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Orders", description = "Order endpoints"),
        (name = "Wishlist", description = "Wishlist endpoints"),
        (name = "Admin", description = "Admin endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}

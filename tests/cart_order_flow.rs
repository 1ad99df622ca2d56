use axum::{
    extract::FromRequestParts,
    http::{Request, header},
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, Set, Statement};
use storefront_api::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    dto::{
        addresses::CreateAddressRequest,
        cart::{AddCartItemRequest, CompleteCartRequest},
        categories::CreateCategoryRequest,
        orders::UpdateOrderStatusRequest,
        products::{CreateProductRequest, UpdateProductRequest},
        reviews::{AddReviewRequest, UpdateReviewRequest},
        roles::{AssignRoleRequest, CreateRoleRequest},
        wishlist::AddWishlistRequest,
    },
    entity::{
        categories::ActiveModel as CategoryActive,
        products::{ActiveModel as ProductActive, Entity as Products, Model as ProductModel},
        users::ActiveModel as UserActive,
    },
    error::AppError,
    middleware::auth::{AuthUser, ROLE_ADMIN, ROLE_USER},
    routes::params::Pagination,
    services::{
        address_service, admin_service, auth_service, cart_item_service, cart_service,
        category_service, order_service, product_service, review_service, role_service,
        wishlist_service,
    },
    state::AppState,
    status::{CartStatus, OrderStatus},
};
use uuid::Uuid;

// Integration flow: cart -> complete -> reopen -> complete, admin/user status moves,
// wishlist and reviews. Runs as one test because every step shares the same tables.
#[tokio::test]
async fn cart_order_wishlist_review_flow() -> anyhow::Result<()> {
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let state = setup_state(&database_url).await?;

    let shopper = AuthUser {
        user_id: create_user(&state, "shopper@example.com").await?,
        roles: vec![ROLE_USER.into()],
    };
    let other = AuthUser {
        user_id: create_user(&state, "other@example.com").await?,
        roles: vec![ROLE_USER.into()],
    };
    let admin = AuthUser {
        user_id: create_user(&state, "admin@example.com").await?,
        roles: vec![ROLE_ADMIN.into()],
    };

    let category_id = create_category(&state, "Kitchen").await?;
    let mug = create_product(&state, category_id, "Ferris Mug", 300, 10).await?;
    let hoodie = create_product(&state, category_id, "Axum Hoodie", 500, 5).await?;

    cart_lifecycle(&state, &shopper, &admin, &mug, &hoodie).await?;
    wishlist_is_idempotent(&state, &shopper, &mug).await?;
    reviews_are_unique_per_user(&state, &shopper, &other, &mug).await?;
    missing_ids_report_resource_field_and_value(&state, &shopper).await?;
    catalog_names_and_category_usage_conflict(&state, &admin, category_id, &mug, &hoodie).await?;
    addresses_are_scoped_to_owner(&state, &shopper, &other).await?;
    role_assignment_rules(&state, &admin, &shopper, &other).await?;
    revoked_admin_is_forbidden_on_next_request(&state, &admin).await?;

    Ok(())
}

async fn cart_lifecycle(
    state: &AppState,
    shopper: &AuthUser,
    admin: &AuthUser,
    mug: &ProductModel,
    hoodie: &ProductModel,
) -> anyhow::Result<()> {
    match cart_service::get_active_cart(state, shopper).await {
        Err(AppError::NotFound { resource, field, value }) => {
            assert_eq!((resource, field, value.as_str()), ("Cart", "status", "ACTIVE"));
        }
        _ => panic!("expected no active cart yet"),
    }

    // Stale client price is rejected.
    let stale = cart_service::add_cart_item_to_cart(state, shopper, line(mug.id, 2, 250)).await;
    assert!(matches!(
        stale,
        Err(AppError::InvalidTotalPrice { expected: 600, actual: 500 })
    ));

    // Two adds of the same product merge into one line.
    cart_service::add_cart_item_to_cart(state, shopper, line(mug.id, 1, 300)).await?;
    let merged = cart_service::add_cart_item_to_cart(state, shopper, line(mug.id, 1, 300))
        .await?
        .data
        .expect("cart item");
    assert_eq!(merged.quantity, 2);
    assert_eq!(merged.total_price, 600);

    cart_service::add_cart_item_to_cart(state, shopper, line(hoodie.id, 1, 500)).await?;

    let too_many = cart_service::add_cart_item_to_cart(state, shopper, line(hoodie.id, 5, 500)).await;
    assert!(matches!(
        too_many,
        Err(AppError::InsufficientStock { requested: 6, available: 5, .. })
    ));

    let cart = cart_service::get_active_cart(state, shopper)
        .await?
        .data
        .expect("active cart");
    assert_eq!(cart.cart.status, CartStatus::Active);
    assert_eq!(cart.items.len(), 2);
    assert_eq!(cart.total_price, 1100);

    // Items [(mug, 2, 3.00), (hoodie, 1, 5.00)] total 11.00; claiming 10.00 fails.
    let wrong_total = cart_service::complete_cart(state, shopper, complete(1000)).await;
    assert!(matches!(
        wrong_total,
        Err(AppError::InvalidTotalPrice { expected: 1100, actual: 1000 })
    ));

    let first = cart_service::complete_cart(state, shopper, complete(1100))
        .await?
        .data
        .expect("order");
    assert_eq!(first.order.status, OrderStatus::Pending);
    assert_eq!(first.order.total_amount, 1100);
    assert_eq!(first.items.len(), 2);
    assert!(first.order.invoice_number.starts_with("INV-"));
    assert_eq!(stock_of(state, mug.id).await?, 8);
    assert_eq!(stock_of(state, hoodie.id).await?, 4);
    assert!(cart_service::get_active_cart(state, shopper).await.is_err());

    // Reopen restores the cart, its items and the stock, and cancels the order.
    let reopened = cart_service::reopen_cart(state, shopper)
        .await?
        .data
        .expect("reopened cart");
    assert_eq!(reopened.cart.id, cart.cart.id);
    assert_eq!(reopened.cart.status, CartStatus::Active);
    assert_eq!(reopened.items.len(), 2);
    assert_eq!(reopened.total_price, 1100);
    assert_eq!(stock_of(state, mug.id).await?, 10);
    assert_eq!(stock_of(state, hoodie.id).await?, 5);

    let cancelled = order_service::get_order(state, shopper, first.order.id)
        .await?
        .data
        .expect("order");
    assert_eq!(cancelled.order.status, OrderStatus::Cancelled);

    assert!(matches!(
        cart_service::reopen_cart(state, shopper).await,
        Err(AppError::Conflict(_))
    ));

    // Line-level edits on the reopened cart.
    let mug_line = reopened
        .items
        .iter()
        .find(|item| item.product.id == mug.id)
        .expect("mug line")
        .id;
    let bumped = cart_item_service::increase_quantity(state, shopper, mug_line)
        .await?
        .data
        .expect("line");
    assert_eq!((bumped.quantity, bumped.total_price), (3, 900));
    let lowered = cart_item_service::decrease_quantity(state, shopper, mug_line)
        .await?
        .data
        .expect("line");
    assert_eq!((lowered.quantity, lowered.total_price), (2, 600));

    // Second checkout walks the admin lifecycle.
    let second = cart_service::complete_cart(state, shopper, complete(1100))
        .await?
        .data
        .expect("order");
    let processing = admin_service::update_order_status(
        state,
        admin,
        second.order.id,
        UpdateOrderStatusRequest {
            status: OrderStatus::Processing,
        },
    )
    .await?
    .data
    .expect("order");
    assert_eq!(processing.status, OrderStatus::Processing);

    let backwards = admin_service::update_order_status(
        state,
        admin,
        second.order.id,
        UpdateOrderStatusRequest {
            status: OrderStatus::Pending,
        },
    )
    .await;
    assert!(matches!(backwards, Err(AppError::Conflict(_))));

    assert!(matches!(
        admin_service::update_order_status(
            state,
            shopper,
            second.order.id,
            UpdateOrderStatusRequest {
                status: OrderStatus::Shipped,
            },
        )
        .await,
        Err(AppError::Forbidden)
    ));

    assert_eq!(stock_of(state, mug.id).await?, 8);
    order_service::cancel_order(state, shopper, second.order.id).await?;
    assert_eq!(stock_of(state, mug.id).await?, 10);
    assert!(matches!(
        order_service::cancel_order(state, shopper, second.order.id).await,
        Err(AppError::Conflict(_))
    ));

    Ok(())
}

async fn wishlist_is_idempotent(
    state: &AppState,
    shopper: &AuthUser,
    mug: &ProductModel,
) -> anyhow::Result<()> {
    let first = wishlist_service::add_to_wishlist(
        state,
        shopper,
        AddWishlistRequest { product_id: mug.id },
    )
    .await?
    .data
    .expect("entry");
    let second = wishlist_service::add_to_wishlist(
        state,
        shopper,
        AddWishlistRequest { product_id: mug.id },
    )
    .await?
    .data
    .expect("entry");
    assert_eq!(first.id, second.id);

    let listed = wishlist_service::list_wishlist(state, shopper, Pagination::default()).await?;
    assert_eq!(listed.meta.and_then(|m| m.total), Some(1));

    let status = wishlist_service::is_in_wishlist(state, shopper, mug.id)
        .await?
        .data
        .expect("status");
    assert!(status.in_wishlist);

    wishlist_service::remove_from_wishlist(state, shopper, mug.id).await?;
    assert!(matches!(
        wishlist_service::remove_from_wishlist(state, shopper, mug.id).await,
        Err(AppError::NotFound { resource: "Wishlist", .. })
    ));
    Ok(())
}

async fn reviews_are_unique_per_user(
    state: &AppState,
    shopper: &AuthUser,
    other: &AuthUser,
    mug: &ProductModel,
) -> anyhow::Result<()> {
    let review = review_service::add_review(
        state,
        shopper,
        mug.id,
        AddReviewRequest {
            rating: 5,
            message: "Best mug".into(),
            images: vec!["https://img.example.com/mug.png".into()],
        },
    )
    .await?
    .data
    .expect("review");
    assert_eq!(review.images.len(), 1);

    let duplicate = review_service::add_review(
        state,
        shopper,
        mug.id,
        AddReviewRequest {
            rating: 1,
            message: "Changed my mind".into(),
            images: Vec::new(),
        },
    )
    .await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));

    let hijack = review_service::update_review(
        state,
        other,
        review.id,
        UpdateReviewRequest {
            rating: Some(1),
            ..Default::default()
        },
    )
    .await;
    assert!(matches!(hijack, Err(AppError::NotFound { resource: "Review", .. })));

    review_service::add_review(
        state,
        other,
        mug.id,
        AddReviewRequest {
            rating: 3,
            message: "Fine".into(),
            images: Vec::new(),
        },
    )
    .await?;

    let liked = review_service::like_review(state, other, review.id)
        .await?
        .data
        .expect("review");
    assert_eq!(liked.likes, 1);

    // A second like from the same user does not count twice.
    let again = review_service::like_review(state, other, review.id)
        .await?
        .data
        .expect("review");
    assert_eq!(again.likes, 1);

    let own = review_service::like_review(state, shopper, review.id).await;
    assert!(matches!(own, Err(AppError::BadRequest(_))));

    let buckets = review_service::get_reviews_for_product(state, shopper, mug.id)
        .await?
        .data
        .expect("reviews");
    assert_eq!(buckets.my_review.map(|r| r.id), Some(review.id));
    assert_eq!(buckets.other_reviews.len(), 1);
    assert_eq!(buckets.review_count, 2);
    assert_eq!(buckets.average_rating, Some(4.0));
    Ok(())
}

async fn missing_ids_report_resource_field_and_value(
    state: &AppState,
    shopper: &AuthUser,
) -> anyhow::Result<()> {
    let missing = Uuid::new_v4();

    match product_service::get_product(state, missing).await {
        Err(AppError::NotFound { resource, field, value }) => {
            assert_eq!(resource, "Product");
            assert_eq!(field, "id");
            assert_eq!(value, missing.to_string());
        }
        _ => panic!("expected Product not found"),
    }

    let err = cart_item_service::get_cart_item(state, shopper, missing)
        .await
        .err()
        .expect("missing cart item");
    assert_eq!(
        err.to_string(),
        format!("CartItem not found with id: '{missing}'")
    );
    Ok(())
}

async fn catalog_names_and_category_usage_conflict(
    state: &AppState,
    admin: &AuthUser,
    category_id: Uuid,
    mug: &ProductModel,
    hoodie: &ProductModel,
) -> anyhow::Result<()> {
    let duplicate_category = category_service::create_category(
        state,
        admin,
        CreateCategoryRequest {
            name: "Kitchen".into(),
            description: None,
        },
    )
    .await;
    assert!(matches!(duplicate_category, Err(AppError::Conflict(_))));

    let in_use = category_service::delete_category(state, admin, category_id).await;
    assert!(matches!(in_use, Err(AppError::Conflict(_))));

    let duplicate_product = product_service::create_product(
        state,
        admin,
        CreateProductRequest {
            category_id,
            name: mug.name.clone(),
            description: None,
            price: 100,
            stock: 1,
        },
    )
    .await;
    assert!(matches!(duplicate_product, Err(AppError::Conflict(_))));

    let rename = product_service::update_product(
        state,
        admin,
        hoodie.id,
        UpdateProductRequest {
            name: Some(mug.name.clone()),
            ..Default::default()
        },
    )
    .await;
    assert!(matches!(rename, Err(AppError::Conflict(_))));
    Ok(())
}

async fn addresses_are_scoped_to_owner(
    state: &AppState,
    shopper: &AuthUser,
    other: &AuthUser,
) -> anyhow::Result<()> {
    let address = address_service::add_address(
        state,
        shopper,
        CreateAddressRequest {
            street: "1 Crab Lane".into(),
            city: "Portland".into(),
            state: None,
            postal_code: "97201".into(),
            country: "US".into(),
        },
    )
    .await?
    .data
    .expect("address");

    let own = address_service::get_address(state, shopper, address.id)
        .await?
        .data
        .expect("address");
    assert_eq!(own.city, "Portland");

    match address_service::get_address(state, other, address.id).await {
        Err(AppError::NotFound { resource, field, value }) => {
            assert_eq!((resource, field), ("Address", "id"));
            assert_eq!(value, address.id.to_string());
        }
        _ => panic!("another user's address must not be visible"),
    }
    Ok(())
}

async fn role_assignment_rules(
    state: &AppState,
    admin: &AuthUser,
    shopper: &AuthUser,
    other: &AuthUser,
) -> anyhow::Result<()> {
    let role = role_service::create_role(
        state,
        admin,
        CreateRoleRequest {
            name: " manager ".into(),
        },
    )
    .await?
    .data
    .expect("role");
    assert_eq!(role.name, "MANAGER");

    let duplicate = role_service::create_role(
        state,
        admin,
        CreateRoleRequest {
            name: "MANAGER".into(),
        },
    )
    .await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));

    let assign = || AssignRoleRequest {
        role: "manager".into(),
    };
    let user = role_service::assign_role(state, admin, shopper.user_id, assign())
        .await?
        .data
        .expect("user");
    assert!(user.roles.iter().any(|r| r == "MANAGER"));

    let twice = role_service::assign_role(state, admin, shopper.user_id, assign()).await;
    assert!(matches!(twice, Err(AppError::Conflict(_))));

    // Without the pre-check the unique key still surfaces as Conflict, not a 500.
    let raced = role_service::link_role(&state.orm, shopper.user_id, role.id).await;
    assert!(matches!(raced, Err(AppError::Conflict(_))));
    let existing = role_service::ensure_role_exists(&state.orm, "MANAGER").await?;
    assert_eq!(existing.id, role.id);

    let not_held = role_service::revoke_role(state, admin, other.user_id, "manager").await;
    assert!(matches!(not_held, Err(AppError::NotFound { .. })));

    let forbidden = role_service::create_role(
        state,
        shopper,
        CreateRoleRequest {
            name: "auditor".into(),
        },
    )
    .await;
    assert!(matches!(forbidden, Err(AppError::Forbidden)));
    Ok(())
}

// Roles are read from `user_roles` per request, so the token's role claim
// cannot outlive a revocation.
async fn revoked_admin_is_forbidden_on_next_request(
    state: &AppState,
    admin: &AuthUser,
) -> anyhow::Result<()> {
    let staff_id = create_user(state, "staff@example.com").await?;
    let admin_role = role_service::ensure_role_exists(&state.orm, ROLE_ADMIN).await?;
    role_service::link_role(&state.orm, staff_id, admin_role.id).await?;

    let token = auth_service::issue_token(&state.config, staff_id, vec![ROLE_ADMIN.into()])?;
    let staff = authenticate(state, &token).await?;
    assert!(staff.has_role(ROLE_ADMIN));
    category_service::create_category(
        state,
        &staff,
        CreateCategoryRequest {
            name: "Garden".into(),
            description: None,
        },
    )
    .await?;

    role_service::revoke_role(state, admin, staff_id, ROLE_ADMIN).await?;

    let staff = authenticate(state, &token).await?;
    assert!(!staff.has_role(ROLE_ADMIN));
    let denied = category_service::create_category(
        state,
        &staff,
        CreateCategoryRequest {
            name: "Toys".into(),
            description: None,
        },
    )
    .await;
    assert!(matches!(denied, Err(AppError::Forbidden)));
    Ok(())
}

async fn authenticate(state: &AppState, token: &str) -> anyhow::Result<AuthUser> {
    let request = Request::builder()
        .uri("/api/categories")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(())?;
    let (mut parts, _) = request.into_parts();
    Ok(AuthUser::from_request_parts(&mut parts, state).await?)
}

fn line(product_id: Uuid, quantity: i32, unit_price: i64) -> AddCartItemRequest {
    AddCartItemRequest {
        product_id,
        quantity,
        unit_price,
        total_price: i64::from(quantity) * unit_price,
    }
}

fn complete(total_price: i64) -> CompleteCartRequest {
    CompleteCartRequest {
        total_price,
        address_id: None,
    }
}

async fn stock_of(state: &AppState, product_id: Uuid) -> anyhow::Result<i32> {
    let product = Products::find_by_id(product_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| anyhow::anyhow!("product {product_id} vanished"))?;
    Ok(product.stock)
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;

    // Clean tables between runs
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE review_likes, review_images, reviews, wishlist, order_items, orders, cart_items, carts, \
         addresses, user_roles, roles, audit_logs, products, categories, users CASCADE",
    ))
    .await?;

    let config = AppConfig {
        database_url: database_url.to_string(),
        host: "127.0.0.1".into(),
        port: 0,
        jwt_secret: "integration-secret".into(),
        jwt_ttl_hours: 1,
    };
    Ok(AppState::new(orm, config))
}

async fn create_user(state: &AppState, email: &str) -> anyhow::Result<Uuid> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        password_hash: Set("dummy".into()),
        first_name: Set(None),
        last_name: Set(None),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(user.id)
}

async fn create_category(state: &AppState, name: &str) -> anyhow::Result<Uuid> {
    let category = CategoryActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        description: Set(None),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(category.id)
}

async fn create_product(
    state: &AppState,
    category_id: Uuid,
    name: &str,
    price: i64,
    stock: i32,
) -> anyhow::Result<ProductModel> {
    Ok(ProductActive {
        id: Set(Uuid::new_v4()),
        category_id: Set(category_id),
        name: Set(name.to_string()),
        description: Set(Some("A product for testing".into())),
        price: Set(price),
        stock: Set(stock),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?)
}

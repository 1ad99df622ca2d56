use argon2::{
    Argon2, PasswordHasher,
    password_hash::{rand_core::OsRng, SaltString},
};
use storefront_api::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    middleware::auth::{ROLE_ADMIN, ROLE_USER},
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;
    let pool = orm.get_postgres_connection_pool();

    let admin_role = ensure_role(pool, ROLE_ADMIN).await?;
    let user_role = ensure_role(pool, ROLE_USER).await?;

    let admin_id = ensure_user(pool, "admin@example.com", "admin12345", "Ada", "Admin").await?;
    link_role(pool, admin_id, admin_role).await?;
    link_role(pool, admin_id, user_role).await?;

    let user_id = ensure_user(pool, "user@example.com", "user12345", "Uma", "User").await?;
    link_role(pool, user_id, user_role).await?;

    seed_catalog(pool).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_role(pool: &sqlx::PgPool, name: &str) -> anyhow::Result<Uuid> {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO roles (id, name)
        VALUES ($1, $2)
        ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .fetch_one(pool)
    .await?;

    println!("Ensured role {name}");
    Ok(id)
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    email: &str,
    password: &str,
    first_name: &str,
    last_name: &str,
) -> anyhow::Result<Uuid> {
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();

    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, password_hash, first_name, last_name)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE SET first_name = EXCLUDED.first_name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .bind(first_name)
    .bind(last_name)
    .fetch_one(pool)
    .await?;

    println!("Ensured user {email}");
    Ok(id)
}

async fn link_role(pool: &sqlx::PgPool, user_id: Uuid, role_id: Uuid) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(role_id)
    .execute(pool)
    .await?;
    Ok(())
}

async fn seed_catalog(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let categories = [
        ("Apparel", "Things to wear"),
        ("Kitchen", "Mugs and friends"),
        ("Books", "Reading material"),
    ];
    for (name, description) in categories {
        sqlx::query(
            r#"
            INSERT INTO categories (id, name, description)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(description)
        .execute(pool)
        .await?;
    }

    let products = [
        ("Apparel", "Axum Hoodie", "Warm hoodie for Rustaceans", 5500_i64, 50_i32),
        ("Kitchen", "Ferris Mug", "Coffee tastes better with Ferris", 1200, 100),
        ("Apparel", "Rust Sticker Pack", "Decorate your laptop", 500, 200),
        ("Books", "E-book: Async Rust", "Learn async Rust patterns", 2500, 75),
    ];
    for (category, name, description, price, stock) in products {
        sqlx::query(
            r#"
            INSERT INTO products (id, category_id, name, description, price, stock)
            SELECT $1, c.id, $3, $4, $5, $6 FROM categories c WHERE c.name = $2
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(category)
        .bind(name)
        .bind(description)
        .bind(price)
        .bind(stock)
        .execute(pool)
        .await?;
    }

    println!("Seeded categories and products");
    Ok(())
}

use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use password_hash::rand_core::OsRng;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait};
use sea_orm::ActiveValue::NotSet;
use uuid::Uuid;

use crate::{
    audit,
    config::AppConfig,
    dto::auth::{Claims, LoginRequest, LoginResponse, RegisterRequest},
    entity::users::{ActiveModel as UserActive, Column as UserCol, Entity as Users},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ROLE_USER},
    models::User,
    response::{ApiResponse, Meta},
    services::role_service::{ensure_role_exists, link_role, roles_for_user},
    state::AppState,
};

const MIN_PASSWORD_LEN: usize = 8;

fn validate_registration(payload: &RegisterRequest) -> AppResult<()> {
    let email = payload.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::BadRequest("a valid email is required".into()));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(password: &str, password_hash: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub fn issue_token(config: &AppConfig, user_id: Uuid, roles: Vec<String>) -> AppResult<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(config.jwt_ttl_hours))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user_id.to_string(),
        roles,
        exp: expiration.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

pub async fn register_user(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<User>> {
    validate_registration(&payload)?;
    let RegisterRequest {
        email,
        password,
        first_name,
        last_name,
    } = payload;
    let email = email.trim().to_lowercase();

    let exist = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .one(&state.orm)
        .await?;
    if exist.is_some() {
        return Err(AppError::Conflict("Email is already taken".to_string()));
    }

    let password_hash = hash_password(&password)?;

    let txn = state.orm.begin().await?;
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email),
        password_hash: Set(password_hash),
        first_name: Set(first_name),
        last_name: Set(last_name),
        created_at: NotSet,
    }
    .insert(&txn)
    .await
    .map_err(|err| AppError::from_constraint(err, "Email is already taken"))?;

    let role = ensure_role_exists(&txn, ROLE_USER).await?;
    link_role(&txn, user.id, role.id).await?;
    txn.commit().await?;

    audit::record(
        state,
        Some(user.id),
        "user_register",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    tracing::info!(user_id = %user.id, "user registered");
    Ok(ApiResponse::success(
        "User created",
        User::from_entity(user, vec![role.name]),
        None,
    ))
}

pub async fn login_user(
    state: &AppState,
    payload: LoginRequest,
) -> AppResult<ApiResponse<LoginResponse>> {
    let LoginRequest { email, password } = payload;
    let email = email.trim().to_lowercase();

    let user = Users::find()
        .filter(UserCol::Email.eq(email.as_str()))
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid email or password".into()))?;

    if !verify_password(&password, &user.password_hash)? {
        return Err(AppError::Unauthorized("Invalid email or password".into()));
    }

    let roles = roles_for_user(&state.orm, user.id).await?;
    let token = issue_token(&state.config, user.id, roles)?;

    let resp = LoginResponse {
        token: format!("Bearer {}", token),
    };

    audit::record(
        state,
        Some(user.id),
        "user_login",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success("Logged in", resp, Some(Meta::empty())))
}

pub async fn current_user(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<User>> {
    let model = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::not_found("User", "id", user.user_id))?;
    let roles = roles_for_user(&state.orm, model.id).await?;
    Ok(ApiResponse::success("Current user", User::from_entity(model, roles), None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::auth::decode_token;

    fn config() -> AppConfig {
        AppConfig {
            database_url: "postgres://unused".into(),
            host: "127.0.0.1".into(),
            port: 3000,
            jwt_secret: "unit-test-secret".into(),
            jwt_ttl_hours: 1,
        }
    }

    #[test]
    fn issued_token_decodes_to_same_identity() {
        let config = config();
        let id = Uuid::new_v4();
        let token = issue_token(&config, id, vec!["ADMIN".into(), "USER".into()]).unwrap();

        let user = decode_token(&config.jwt_secret, &token).unwrap();
        assert_eq!(user.user_id, id);
        assert_eq!(user.roles, vec!["ADMIN".to_string(), "USER".to_string()]);
    }

    #[test]
    fn password_hash_verifies_only_the_original() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("battery staple", &hash).unwrap());
    }

    #[test]
    fn registration_requires_email_and_long_password() {
        let short = RegisterRequest {
            email: "a@b.c".into(),
            password: "short".into(),
            first_name: None,
            last_name: None,
        };
        assert!(validate_registration(&short).is_err());

        let no_at = RegisterRequest {
            email: "nobody".into(),
            password: "long enough".into(),
            first_name: None,
            last_name: None,
        };
        assert!(validate_registration(&no_at).is_err());
    }
}

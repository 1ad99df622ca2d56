use axum::{extract::FromRequestParts, http::header};
use jsonwebtoken::{DecodingKey, Validation, decode};
use sea_orm::{ConnectionTrait, EntityTrait};
use uuid::Uuid;

use crate::{
    dto::auth::Claims,
    entity::users::Entity as Users,
    error::{AppError, AppResult},
    services::role_service::roles_for_user,
    state::AppState,
};

pub const ROLE_ADMIN: &str = "ADMIN";
pub const ROLE_USER: &str = "USER";

/// Identity of the caller, resolved once per request from the bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub roles: Vec<String>,
}

impl AuthUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }

    /// Builds the caller from the stored `user_roles`, so a revoked role stops
    /// working on the next request instead of when the token expires.
    pub async fn load<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> AppResult<Self> {
        if Users::find_by_id(user_id).one(conn).await?.is_none() {
            return Err(AppError::Unauthorized("User no longer exists".into()));
        }
        let roles = roles_for_user(conn, user_id).await?;
        Ok(Self { user_id, roles })
    }
}

pub fn ensure_role(user: &AuthUser, role: &str) -> Result<(), AppError> {
    if !user.has_role(role) {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

pub fn ensure_admin(user: &AuthUser) -> Result<(), AppError> {
    ensure_role(user, ROLE_ADMIN)
}

/// Extracts the raw token from an `Authorization: Bearer <token>` value.
pub fn bearer_token(header_value: &str) -> Result<&str, AppError> {
    let token = header_value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid Authorization scheme".into()))?
        .trim();
    if token.is_empty() {
        return Err(AppError::Unauthorized("Missing bearer token".into()));
    }
    Ok(token)
}

pub fn decode_token(secret: &str, token: &str) -> Result<AuthUser, AppError> {
    let decoded = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;

    let user_id = Uuid::parse_str(&decoded.claims.sub)
        .map_err(|_| AppError::Unauthorized("Invalid user id in token".into()))?;

    Ok(AuthUser {
        user_id,
        roles: decoded.claims.roles,
    })
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;

        let auth_str = auth_header
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid Authorization header".into()))?;

        let token = bearer_token(auth_str)?;
        let claimed = decode_token(&state.config.jwt_secret, token)?;
        AuthUser::load(&state.orm, claimed.user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{EncodingKey, Header, encode};

    const SECRET: &str = "test-secret";

    fn token_with_exp(sub: &str, exp: i64) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            roles: vec![ROLE_USER.to_string()],
            exp: exp as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn valid_token_resolves_user_and_roles() {
        let id = Uuid::new_v4();
        let exp = (Utc::now() + Duration::hours(1)).timestamp();
        let user = decode_token(SECRET, &token_with_exp(&id.to_string(), exp)).unwrap();
        assert_eq!(user.user_id, id);
        assert!(user.has_role("user"));
        assert!(!user.has_role(ROLE_ADMIN));
    }

    #[test]
    fn expired_token_is_unauthorized() {
        let exp = (Utc::now() - Duration::hours(2)).timestamp();
        let token = token_with_exp(&Uuid::new_v4().to_string(), exp);
        assert!(matches!(
            decode_token(SECRET, &token),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn wrong_secret_is_unauthorized() {
        let exp = (Utc::now() + Duration::hours(1)).timestamp();
        let token = token_with_exp(&Uuid::new_v4().to_string(), exp);
        assert!(matches!(
            decode_token("other-secret", &token),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn non_uuid_subject_is_unauthorized() {
        let exp = (Utc::now() + Duration::hours(1)).timestamp();
        let token = token_with_exp("not-a-uuid", exp);
        assert!(matches!(
            decode_token(SECRET, &token),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn bearer_scheme_is_required() {
        assert_eq!(bearer_token("Bearer abc.def").unwrap(), "abc.def");
        assert!(bearer_token("Basic abc").is_err());
        assert!(bearer_token("Bearer   ").is_err());
    }

    #[test]
    fn admin_check_uses_roles() {
        let user = AuthUser {
            user_id: Uuid::nil(),
            roles: vec![ROLE_USER.into()],
        };
        assert!(matches!(ensure_admin(&user), Err(AppError::Forbidden)));

        let admin = AuthUser {
            user_id: Uuid::nil(),
            roles: vec![ROLE_USER.into(), ROLE_ADMIN.into()],
        };
        assert!(ensure_admin(&admin).is_ok());
    }
}

use std::time::Duration;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};

use crate::{config::JwtConfig, error::ApiError, state::AppState, store::User};

/// Signed token payload: the public identity claim plus the standard
/// registered claims. Signature, expiry, issuer and audience are all
/// checked on decode, so a token fabricated outside the service fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub email: String,
    pub iat: usize,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
}

/// Caller identity attached to the request by the auth guard. Exactly the
/// subset of user fields considered public.
#[derive(Debug, Clone, Serialize)]
pub struct Identity {
    pub id: i64,
    pub username: String,
    pub email: String,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            username: claims.username,
            email: claims.email,
        }
    }
}

#[derive(Clone)]
pub struct TokenKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

impl TokenKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::from_secs((cfg.ttl_minutes as u64) * 60),
        }
    }

    pub fn sign(&self, user: &User) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = Claims {
            sub: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user.id, "token signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(user_id = %data.claims.sub, "token verified");
        Ok(data.claims)
    }
}

impl FromRef<AppState> for TokenKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::from_config(&state.config.jwt)
    }
}

/// Auth guard: extracts `Authorization: Bearer <token>` and decodes it.
/// The identity is taken from the claims as-is; the store is not consulted
/// here, handlers that need the full user record look it up themselves.
#[derive(Debug)]
pub struct AuthUser(pub Identity);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    TokenKeys: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = TokenKeys::from_ref(state);
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("Token no proporcionado"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthorized("Token no proporcionado"))?;

        let claims = match keys.verify(token) {
            Ok(c) => c,
            Err(_) => {
                warn!("invalid or expired token");
                return Err(ApiError::unauthorized("Token inválido o expirado"));
            }
        };

        Ok(AuthUser(claims.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys(secret: &str, issuer: &str, audience: &str) -> TokenKeys {
        TokenKeys::from_config(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl_minutes: 5,
        })
    }

    fn make_user() -> User {
        User {
            id: 1754000000000,
            username: "alice".into(),
            email: "alice@example.com".into(),
            password_hash: "hash".into(),
            incomes: Vec::new(),
            expenses: Vec::new(),
        }
    }

    #[test]
    fn sign_and_verify_roundtrip() {
        let keys = make_keys("dev-secret", "test-issuer", "test-aud");
        let token = keys.sign(&make_user()).expect("sign");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.sub, 1754000000000);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.email, "alice@example.com");
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
    }

    #[test]
    fn verify_rejects_garbage() {
        let keys = make_keys("dev-secret", "iss", "aud");
        assert!(keys.verify("not-a-token").is_err());
        assert!(keys.verify("").is_err());
        // Valid base64 sections but no signature anyone holds.
        assert!(keys.verify("eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOjF9.AAAA").is_err());
    }

    #[test]
    fn verify_rejects_tampered_token() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let token = keys.sign(&make_user()).expect("sign");
        let mut tampered = token.clone();
        // Flip a character in the payload section.
        let dot = tampered.find('.').expect("jwt has sections") + 1;
        let original = tampered.as_bytes()[dot];
        let replacement = if original == b'A' { 'B' } else { 'A' };
        tampered.replace_range(dot..dot + 1, &replacement.to_string());
        assert!(keys.verify(&tampered).is_err());
    }

    #[test]
    fn verify_rejects_foreign_secret() {
        let signer = make_keys("secret-one", "iss", "aud");
        let verifier = make_keys("secret-two", "iss", "aud");
        let token = signer.sign(&make_user()).expect("sign");
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn verify_rejects_wrong_issuer_or_audience() {
        let good = make_keys("same-secret", "good-iss", "good-aud");
        let bad = make_keys("same-secret", "bad-iss", "bad-aud");
        let token = good.sign(&make_user()).expect("sign");
        assert!(bad.verify(&token).is_err());
    }

    #[test]
    fn verify_rejects_claims_missing_the_username() {
        let keys = make_keys("dev-secret", "iss", "aud");

        #[derive(Serialize)]
        struct BareClaims {
            sub: i64,
            iat: usize,
            exp: usize,
            iss: String,
            aud: String,
        }
        let now = OffsetDateTime::now_utc().unix_timestamp() as usize;
        let bare = BareClaims {
            sub: 1,
            iat: now,
            exp: now + 300,
            iss: "iss".into(),
            aud: "aud".into(),
        };
        // Correctly signed, but not the shape the guard expects.
        let token = encode(&Header::default(), &bare, &keys.encoding).expect("encode");
        assert!(keys.verify(&token).is_err());
    }

    #[tokio::test]
    async fn guard_attaches_identity_from_a_bearer_token() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let token = keys.sign(&make_user()).expect("sign");

        let (mut parts, _) = axum::http::Request::builder()
            .header(axum::http::header::AUTHORIZATION, format!("Bearer {token}"))
            .body(())
            .expect("request")
            .into_parts();
        let AuthUser(identity) = AuthUser::from_request_parts(&mut parts, &keys)
            .await
            .expect("guard accepts");
        assert_eq!(identity.id, 1754000000000);
        assert_eq!(identity.username, "alice");
        assert_eq!(identity.email, "alice@example.com");
    }

    #[tokio::test]
    async fn guard_rejects_missing_header_and_bad_tokens() {
        let keys = make_keys("dev-secret", "iss", "aud");

        let (mut parts, _) = axum::http::Request::builder()
            .body(())
            .expect("request")
            .into_parts();
        let err = AuthUser::from_request_parts(&mut parts, &keys)
            .await
            .expect_err("no header");
        assert_eq!(err.status(), axum::http::StatusCode::UNAUTHORIZED);

        for header in ["Basic abc", "Bearer not-a-token"] {
            let (mut parts, _) = axum::http::Request::builder()
                .header(axum::http::header::AUTHORIZATION, header)
                .body(())
                .expect("request")
                .into_parts();
            let err = AuthUser::from_request_parts(&mut parts, &keys)
                .await
                .expect_err("bad credential");
            assert_eq!(err.status(), axum::http::StatusCode::UNAUTHORIZED);
        }
    }
}

use axum::{
    extract::{FromRef, State},
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, ChangePasswordRequest, LoginRequest, MessageResponse, PublicUser,
            RegisterRequest, RegisterResponse,
        },
        jwt::{AuthUser, Identity, TokenKeys},
        password::{check_strength, hash_password, verify_password},
    },
    error::ApiError,
    state::AppState,
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(get_me))
        .route("/cambiar-password", post(change_password))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if payload.username.is_empty() || payload.email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("Faltan campos obligatorios"));
    }

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::bad_request("Email inválido"));
    }

    check_strength(&payload.password)?;

    let hash = hash_password(&payload.password).map_err(ApiError::internal)?;
    let user = state
        .store
        .create_user(&payload.username, &payload.email, &hash)
        .await?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok(Json(RegisterResponse {
        message: "Usuario registrado correctamente".into(),
        user: PublicUser {
            id: user.id,
            username: user.username,
            email: user.email,
        },
    }))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    if payload.username.is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("Faltan campos obligatorios"));
    }

    // Unknown username and wrong password answer the same way.
    let user = match state.store.find_by_username(&payload.username).await {
        Some(u) => u,
        None => {
            warn!(username = %payload.username, "login unknown username");
            return Err(ApiError::unauthorized("Credenciales inválidas"));
        }
    };

    let ok = verify_password(&payload.password, &user.password_hash)
        .map_err(ApiError::internal)?;
    if !ok {
        warn!(username = %payload.username, user_id = %user.id, "login invalid password");
        return Err(ApiError::unauthorized("Credenciales inválidas"));
    }

    let keys = TokenKeys::from_ref(&state);
    let token = keys.sign(&user).map_err(ApiError::internal)?;

    info!(user_id = %user.id, username = %user.username, "user logged in");
    Ok(Json(AuthResponse {
        token,
        user: PublicUser {
            id: user.id,
            username: user.username,
            email: user.email,
        },
    }))
}

#[instrument(skip_all)]
pub async fn get_me(AuthUser(identity): AuthUser) -> Json<Identity> {
    Json(identity)
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if payload.current_password.is_empty()
        || payload.new_password.is_empty()
        || payload.confirm_password.is_empty()
    {
        return Err(ApiError::bad_request("Faltan campos obligatorios"));
    }

    if payload.new_password != payload.confirm_password {
        return Err(ApiError::bad_request("Las nuevas contraseñas no coinciden"));
    }

    check_strength(&payload.new_password)?;

    let new_hash = hash_password(&payload.new_password).map_err(ApiError::internal)?;
    state
        .store
        .transact(identity.id, |user| {
            let ok = verify_password(&payload.current_password, &user.password_hash)
                .map_err(ApiError::internal)?;
            if !ok {
                return Err(ApiError::unauthorized("La contraseña actual no es correcta"));
            }
            user.password_hash = new_hash;
            Ok(())
        })
        .await?;

    info!(user_id = %identity.id, "password changed");
    Ok(Json(MessageResponse {
        message: "Contraseña actualizada correctamente".into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, JwtConfig};
    use crate::mailer::NoopMailer;
    use crate::store::UserStore;
    use axum::http::StatusCode;
    use std::sync::Arc;

    async fn make_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = UserStore::load(dir.path().join("data.json")).await;
        let config = Arc::new(AppConfig {
            base_path: "/finanzas".into(),
            data_file: dir
                .path()
                .join("data.json")
                .to_string_lossy()
                .into_owned(),
            recovery_ttl_minutes: 15,
            jwt: JwtConfig {
                secret: "test-secret".into(),
                issuer: "test".into(),
                audience: "test".into(),
                ttl_minutes: 5,
            },
            smtp: None,
        });
        (AppState::from_parts(store, config, Arc::new(NoopMailer)), dir)
    }

    fn register_body(username: &str, email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn register_then_login_roundtrip() {
        let (state, _dir) = make_state().await;
        register(
            State(state.clone()),
            Json(register_body("alice", "alice@example.com", "Secret123")),
        )
        .await
        .expect("register");

        let err = login(
            State(state.clone()),
            Json(LoginRequest {
                username: "alice".into(),
                password: "wrong".into(),
            }),
        )
        .await
        .expect_err("wrong password");
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let Json(response) = login(
            State(state.clone()),
            Json(LoginRequest {
                username: "alice".into(),
                password: "Secret123".into(),
            }),
        )
        .await
        .expect("login");
        assert_eq!(response.user.username, "alice");

        let keys = TokenKeys::from_ref(&state);
        let claims = keys.verify(&response.token).expect("token decodes");
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.email, "alice@example.com");
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let (state, _dir) = make_state().await;
        register(
            State(state.clone()),
            Json(register_body("alice", "a@example.com", "Secret123")),
        )
        .await
        .expect("first register");

        let err = register(
            State(state.clone()),
            Json(register_body("alice", "b@example.com", "Secret456")),
        )
        .await
        .expect_err("duplicate username");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let user = state.store.find_by_username("alice").await.expect("still one");
        assert_eq!(user.email, "a@example.com");
    }

    #[tokio::test]
    async fn register_validates_input() {
        let (state, _dir) = make_state().await;
        let err = register(
            State(state.clone()),
            Json(register_body("", "a@example.com", "Secret123")),
        )
        .await
        .expect_err("missing username");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = register(
            State(state.clone()),
            Json(register_body("alice", "not-an-email", "Secret123")),
        )
        .await
        .expect_err("bad email");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = register(
            State(state.clone()),
            Json(register_body("alice", "a@example.com", "weak")),
        )
        .await
        .expect_err("weak password");
        assert!(matches!(err, ApiError::WeakPassword(_)));
    }

    #[tokio::test]
    async fn change_password_happy_path_and_rejections() {
        let (state, _dir) = make_state().await;
        let Json(registered) = register(
            State(state.clone()),
            Json(register_body("bob", "bob@example.com", "Secret123")),
        )
        .await
        .expect("register");
        let identity = Identity {
            id: registered.user.id,
            username: "bob".into(),
            email: "bob@example.com".into(),
        };

        let err = change_password(
            State(state.clone()),
            AuthUser(identity.clone()),
            Json(ChangePasswordRequest {
                current_password: "Secret123".into(),
                new_password: "NewPass12".into(),
                confirm_password: "Mismatch12".into(),
            }),
        )
        .await
        .expect_err("confirm mismatch");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = change_password(
            State(state.clone()),
            AuthUser(identity.clone()),
            Json(ChangePasswordRequest {
                current_password: "wrong".into(),
                new_password: "NewPass12".into(),
                confirm_password: "NewPass12".into(),
            }),
        )
        .await
        .expect_err("wrong current password");
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        change_password(
            State(state.clone()),
            AuthUser(identity.clone()),
            Json(ChangePasswordRequest {
                current_password: "Secret123".into(),
                new_password: "NewPass12".into(),
                confirm_password: "NewPass12".into(),
            }),
        )
        .await
        .expect("change password");

        let user = state.store.find_by_id(identity.id).await.expect("bob");
        assert!(verify_password("NewPass12", &user.password_hash).expect("verify"));
        assert!(!verify_password("Secret123", &user.password_hash).expect("verify"));
    }

    #[tokio::test]
    async fn change_password_for_vanished_user_is_not_found() {
        let (state, _dir) = make_state().await;
        let identity = Identity {
            id: 9999,
            username: "ghost".into(),
            email: "ghost@example.com".into(),
        };
        let err = change_password(
            State(state.clone()),
            AuthUser(identity),
            Json(ChangePasswordRequest {
                current_password: "Secret123".into(),
                new_password: "NewPass12".into(),
                confirm_password: "NewPass12".into(),
            }),
        )
        .await
        .expect_err("no such user");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use rand::{seq::SliceRandom, Rng};
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{RecoverRequest, RecoverResponse, RecoveryConfirmRequest, RecoveryConfirmResponse},
        password::{check_strength, hash_password, verify_password},
    },
    error::ApiError,
    state::AppState,
};

const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";

/// Temporary password: 4 uppercase, 2 lowercase and 2 digits, each drawn
/// uniformly from its alphabet, then shuffled so there is no positional
/// pattern.
pub fn generate_temp_password() -> String {
    let mut rng = rand::thread_rng();
    let mut chars: Vec<u8> = Vec::with_capacity(8);
    for _ in 0..4 {
        chars.push(UPPER[rng.gen_range(0..UPPER.len())]);
    }
    for _ in 0..2 {
        chars.push(LOWER[rng.gen_range(0..LOWER.len())]);
    }
    for _ in 0..2 {
        chars.push(DIGITS[rng.gen_range(0..DIGITS.len())]);
    }
    chars.shuffle(&mut rng);
    String::from_utf8(chars).unwrap_or_default()
}

/// One pending recovery, held server-side. The user's live password is
/// untouched until the session is confirmed; an unconsumed session dies
/// with its expiry.
#[derive(Debug, Clone)]
pub struct RecoverySession {
    pub user_id: i64,
    pub username: String,
    pub temp_hash: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Clone, Default)]
pub struct RecoverySessions {
    inner: Arc<Mutex<HashMap<Uuid, RecoverySession>>>,
}

impl RecoverySessions {
    /// Store a session, replacing any previous one for the same user.
    pub async fn insert(&self, session: RecoverySession) -> Uuid {
        let token = Uuid::new_v4();
        let mut map = self.inner.lock().await;
        map.retain(|_, s| s.user_id != session.user_id);
        map.insert(token, session);
        token
    }

    /// Look up a live session. Expired sessions are purged on every access.
    pub async fn get(&self, token: &Uuid) -> Option<RecoverySession> {
        let now = OffsetDateTime::now_utc();
        let mut map = self.inner.lock().await;
        map.retain(|_, s| s.expires_at > now);
        map.get(token).cloned()
    }

    pub async fn remove(&self, token: &Uuid) {
        let mut map = self.inner.lock().await;
        map.remove(token);
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/recuperar-password", post(request_recovery))
        .route("/cambiar-password-recuperacion", post(confirm_recovery))
}

#[instrument(skip(state, payload))]
pub async fn request_recovery(
    State(state): State<AppState>,
    Json(mut payload): Json<RecoverRequest>,
) -> Result<Json<RecoverResponse>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();
    if payload.email.is_empty() {
        return Err(ApiError::bad_request("Faltan campos obligatorios"));
    }

    let user = state
        .store
        .find_by_email(&payload.email)
        .await
        .ok_or_else(|| ApiError::not_found("No existe una cuenta con ese email"))?;

    let temp_password = generate_temp_password();
    let temp_hash = hash_password(&temp_password).map_err(ApiError::internal)?;
    let ttl = state.config.recovery_ttl_minutes;
    let token = state
        .recovery
        .insert(RecoverySession {
            user_id: user.id,
            username: user.username.clone(),
            temp_hash,
            expires_at: OffsetDateTime::now_utc() + Duration::minutes(ttl),
        })
        .await;

    let body = format!(
        "Hola {},\n\nTu contraseña temporal es: {}\nCaduca en {} minutos. \
         Úsala para establecer una nueva contraseña.\n",
        user.username, temp_password, ttl,
    );
    // Best effort: a failed delivery is reported, never retried, and the
    // temporary password stays out of the response either way.
    let email_sent = match state
        .mailer
        .send(&user.email, "Recuperación de contraseña", &body)
        .await
    {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, user_id = %user.id, "recovery mail delivery failed");
            false
        }
    };

    info!(user_id = %user.id, email_sent, "recovery session created");
    Ok(Json(RecoverResponse {
        message: "Se ha enviado una contraseña temporal a tu email".into(),
        username: user.username,
        recovery_token: token,
        email_sent,
    }))
}

#[instrument(skip(state, payload))]
pub async fn confirm_recovery(
    State(state): State<AppState>,
    Json(payload): Json<RecoveryConfirmRequest>,
) -> Result<Json<RecoveryConfirmResponse>, ApiError> {
    if payload.recovery_token.is_empty()
        || payload.old_password.is_empty()
        || payload.new_password.is_empty()
    {
        return Err(ApiError::bad_request("Faltan campos obligatorios"));
    }

    let token = payload
        .recovery_token
        .parse::<Uuid>()
        .map_err(|_| ApiError::bad_request("Token de recuperación inválido"))?;

    let session = state
        .recovery
        .get(&token)
        .await
        .ok_or_else(|| ApiError::not_found("Token de recuperación inválido o expirado"))?;

    // A wrong guess does not consume the session.
    let ok = verify_password(&payload.old_password, &session.temp_hash)
        .map_err(ApiError::internal)?;
    if !ok {
        warn!(user_id = %session.user_id, "recovery confirm with wrong temporary password");
        return Err(ApiError::unauthorized("La contraseña temporal no es correcta"));
    }

    check_strength(&payload.new_password)?;

    let new_hash = hash_password(&payload.new_password).map_err(ApiError::internal)?;
    state
        .store
        .transact(session.user_id, |user| {
            user.password_hash = new_hash;
            Ok(())
        })
        .await?;
    state.recovery.remove(&token).await;

    info!(user_id = %session.user_id, "password recovered");
    Ok(Json(RecoveryConfirmResponse {
        message: "Contraseña actualizada correctamente".into(),
        username: session.username,
    }))
}

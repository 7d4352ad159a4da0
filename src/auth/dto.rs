use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request body for user registration. Fields default to empty so a
/// missing field and an empty one get the same 400.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Response returned after registration.
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user: PublicUser,
}

/// Response returned after login.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: PublicUser,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: i64,
    pub username: String,
    pub email: String,
}

/// Request body for the authenticated password change. Wire names are the
/// ones the web client sends.
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(default, rename = "passwordActual")]
    pub current_password: String,
    #[serde(default, rename = "passwordNueva")]
    pub new_password: String,
    #[serde(default, rename = "passwordConfirm")]
    pub confirm_password: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Request body for recovery phase 1.
#[derive(Debug, Deserialize)]
pub struct RecoverRequest {
    #[serde(default)]
    pub email: String,
}

/// Response for recovery phase 1. The temporary password itself only
/// travels by mail; the client carries the token to phase 2.
#[derive(Debug, Serialize)]
pub struct RecoverResponse {
    pub message: String,
    pub username: String,
    #[serde(rename = "recoveryToken")]
    pub recovery_token: Uuid,
    #[serde(rename = "emailSent")]
    pub email_sent: bool,
}

/// Request body for recovery phase 2.
#[derive(Debug, Deserialize)]
pub struct RecoveryConfirmRequest {
    #[serde(default, rename = "recoveryToken")]
    pub recovery_token: String,
    #[serde(default, rename = "oldPassword")]
    pub old_password: String,
    #[serde(default, rename = "newPassword")]
    pub new_password: String,
}

/// Response for recovery phase 2. No token: the client logs in again.
#[derive(Debug, Serialize)]
pub struct RecoveryConfirmResponse {
    pub message: String,
    pub username: String,
}

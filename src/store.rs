use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::error::ApiError;

/// A single income or expense line in a user's ledger.
///
/// Serialized field names match the wire format the web client speaks
/// (`descripcion`, `monto`, `fecha`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: i64,
    #[serde(rename = "descripcion")]
    pub description: String,
    #[serde(rename = "monto")]
    pub amount: f64,
    #[serde(rename = "fecha")]
    pub date: String,
}

/// User record as persisted in the datastore file. Only ever serialized to
/// disk; API responses go through the DTO types instead, so `password_hash`
/// never reaches a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    #[serde(rename = "ingresos", default)]
    pub incomes: Vec<Entry>,
    #[serde(rename = "egresos", default)]
    pub expenses: Vec<Entry>,
}

impl User {
    /// Next entry id: epoch millis, bumped past any id already present in
    /// either ledger so delete-by-id stays unambiguous.
    pub fn next_entry_id(&self) -> i64 {
        let mut id = now_millis();
        while self
            .incomes
            .iter()
            .chain(self.expenses.iter())
            .any(|e| e.id == id)
        {
            id += 1;
        }
        id
    }
}

fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[derive(Debug, Default, Deserialize)]
struct StoreFile {
    #[serde(default)]
    users: Vec<User>,
}

#[derive(Serialize)]
struct StoreFileRef<'a> {
    users: &'a [User],
}

/// Flat-file user store. The entire datastore lives in memory behind one
/// mutex; every mutation persists to disk before the lock is released, so
/// concurrent requests cannot interleave read-modify-write cycles.
#[derive(Clone)]
pub struct UserStore {
    path: Arc<PathBuf>,
    users: Arc<Mutex<Vec<User>>>,
}

impl UserStore {
    /// Load the datastore from `path`. A missing file is a fresh install; an
    /// unreadable or unparsable file is logged and treated as empty rather
    /// than refusing to boot.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let users = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<StoreFile>(&bytes) {
                Ok(file) => {
                    info!(path = %path.display(), users = file.users.len(), "datastore loaded");
                    file.users
                }
                Err(e) => {
                    error!(error = %e, path = %path.display(), "datastore unparsable, starting empty");
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no datastore yet, starting empty");
                Vec::new()
            }
            Err(e) => {
                error!(error = %e, path = %path.display(), "datastore unreadable, starting empty");
                Vec::new()
            }
        };
        Self {
            path: Arc::new(path),
            users: Arc::new(Mutex::new(users)),
        }
    }

    /// Create a user. Fails if the username is already taken (case-sensitive,
    /// the lookup key).
    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, ApiError> {
        let mut users = self.users.lock().await;
        if users.iter().any(|u| u.username == username) {
            return Err(ApiError::bad_request(
                "El nombre de usuario ya está registrado",
            ));
        }
        let mut id = now_millis();
        while users.iter().any(|u| u.id == id) {
            id += 1;
        }
        let user = User {
            id,
            username: username.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            incomes: Vec::new(),
            expenses: Vec::new(),
        };
        users.push(user.clone());
        if let Err(e) = self.persist(&users).await {
            users.pop();
            return Err(e);
        }
        Ok(user)
    }

    pub async fn find_by_username(&self, username: &str) -> Option<User> {
        let users = self.users.lock().await;
        users.iter().find(|u| u.username == username).cloned()
    }

    /// Linear scan, first match wins; email uniqueness is not enforced.
    pub async fn find_by_email(&self, email: &str) -> Option<User> {
        let users = self.users.lock().await;
        users.iter().find(|u| u.email == email).cloned()
    }

    pub async fn find_by_id(&self, id: i64) -> Option<User> {
        let users = self.users.lock().await;
        users.iter().find(|u| u.id == id).cloned()
    }

    /// Atomically mutate one user and persist. The closure runs under the
    /// store lock against a staged copy; if it fails, neither memory nor
    /// disk changes.
    pub async fn transact<T, F>(&self, user_id: i64, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&mut User) -> Result<T, ApiError>,
    {
        let mut users = self.users.lock().await;
        let idx = users
            .iter()
            .position(|u| u.id == user_id)
            .ok_or_else(|| ApiError::not_found("Usuario no encontrado"))?;
        let mut staged = users[idx].clone();
        let out = f(&mut staged)?;
        users[idx] = staged;
        self.persist(&users).await?;
        Ok(out)
    }

    async fn persist(&self, users: &[User]) -> Result<(), ApiError> {
        let bytes = serde_json::to_vec_pretty(&StoreFileRef { users })
            .map_err(ApiError::internal)?;
        // Write-then-rename so a crash mid-write never leaves a torn file.
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(ApiError::internal)?;
        tokio::fs::rename(&tmp, self.path.as_ref())
            .await
            .map_err(ApiError::internal)?;
        Ok(())
    }
}

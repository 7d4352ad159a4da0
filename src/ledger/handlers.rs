use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use time::{format_description::FormatItem, macros::format_description, OffsetDateTime};
use tracing::{info, instrument};

use crate::{
    auth::jwt::AuthUser,
    error::ApiError,
    ledger::dto::{
        DeleteResponse, LoadDataRequest, LoadDataResponse, NewEntryRequest, SavedDataResponse,
        TransactionsResponse,
    },
    state::AppState,
    store::Entry,
};

// Date format the web client parses for its month view: "7/12/2025, 21:14:34".
const ENTRY_DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[day padding:none]/[month padding:none]/[year], [hour]:[minute]:[second]");

fn entry_date_now() -> String {
    OffsetDateTime::now_utc()
        .format(&ENTRY_DATE_FORMAT)
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy)]
enum LedgerKind {
    Income,
    Expense,
}

impl LedgerKind {
    fn list(self, user: &mut crate::store::User) -> &mut Vec<Entry> {
        match self {
            Self::Income => &mut user.incomes,
            Self::Expense => &mut user.expenses,
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/transacciones", get(list_transactions))
        .route("/ingresos", post(create_income))
        .route("/ingresos/:id", delete(delete_income))
        .route("/egresos", post(create_expense))
        .route("/egresos/:id", delete(delete_expense))
        .route("/cargar-datos", post(load_data))
        .route("/obtener-datos-guardados", get(saved_data))
}

#[instrument(skip(state))]
pub async fn list_transactions(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<Json<TransactionsResponse>, ApiError> {
    let user = state
        .store
        .find_by_id(identity.id)
        .await
        .ok_or_else(|| ApiError::not_found("Usuario no encontrado"))?;

    let total_incomes: f64 = user.incomes.iter().map(|e| e.amount).sum();
    let total_expenses: f64 = user.expenses.iter().map(|e| e.amount).sum();
    Ok(Json(TransactionsResponse {
        balance: total_incomes - total_expenses,
        incomes: user.incomes,
        expenses: user.expenses,
        total_incomes,
        total_expenses,
    }))
}

async fn add_entry(
    state: AppState,
    user_id: i64,
    kind: LedgerKind,
    payload: NewEntryRequest,
) -> Result<Json<Entry>, ApiError> {
    if payload.description.trim().is_empty()
        || !payload.amount.is_finite()
        || payload.amount <= 0.0
    {
        return Err(ApiError::bad_request("Datos inválidos"));
    }

    let entry = state
        .store
        .transact(user_id, |user| {
            let entry = Entry {
                id: user.next_entry_id(),
                description: payload.description.clone(),
                amount: payload.amount,
                date: entry_date_now(),
            };
            kind.list(user).push(entry.clone());
            Ok(entry)
        })
        .await?;

    info!(user_id, kind = ?kind, entry_id = entry.id, "entry added");
    Ok(Json(entry))
}

async fn remove_entry(
    state: AppState,
    user_id: i64,
    kind: LedgerKind,
    entry_id: i64,
) -> Result<Json<DeleteResponse>, ApiError> {
    state
        .store
        .transact(user_id, |user| {
            // Filter semantics: deleting an absent id is still a success.
            kind.list(user).retain(|e| e.id != entry_id);
            Ok(())
        })
        .await?;

    info!(user_id, kind = ?kind, entry_id, "entry deleted");
    Ok(Json(DeleteResponse { success: true }))
}

#[instrument(skip(state, payload))]
pub async fn create_income(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Json(payload): Json<NewEntryRequest>,
) -> Result<Json<Entry>, ApiError> {
    add_entry(state, identity.id, LedgerKind::Income, payload).await
}

#[instrument(skip(state, payload))]
pub async fn create_expense(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Json(payload): Json<NewEntryRequest>,
) -> Result<Json<Entry>, ApiError> {
    add_entry(state, identity.id, LedgerKind::Expense, payload).await
}

#[instrument(skip(state))]
pub async fn delete_income(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<DeleteResponse>, ApiError> {
    remove_entry(state, identity.id, LedgerKind::Income, id).await
}

#[instrument(skip(state))]
pub async fn delete_expense(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<DeleteResponse>, ApiError> {
    remove_entry(state, identity.id, LedgerKind::Expense, id).await
}

#[instrument(skip(state, payload))]
pub async fn load_data(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Json(payload): Json<LoadDataRequest>,
) -> Result<Json<LoadDataResponse>, ApiError> {
    let (incomes, expenses) = match (payload.incomes, payload.expenses) {
        (Some(i), Some(e)) => (i, e),
        _ => return Err(ApiError::bad_request("Datos inválidos")),
    };

    let (incomes_count, expenses_count) = state
        .store
        .transact(identity.id, |user| {
            user.incomes = incomes;
            user.expenses = expenses;
            Ok((user.incomes.len(), user.expenses.len()))
        })
        .await?;

    info!(user_id = %identity.id, incomes_count, expenses_count, "ledgers replaced from upload");
    Ok(Json(LoadDataResponse {
        message: "Datos cargados correctamente".into(),
        incomes_count,
        expenses_count,
    }))
}

#[instrument(skip(state))]
pub async fn saved_data(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<Json<SavedDataResponse>, ApiError> {
    let user = state
        .store
        .find_by_id(identity.id)
        .await
        .ok_or_else(|| ApiError::not_found("Usuario no encontrado"))?;
    Ok(Json(SavedDataResponse {
        incomes: user.incomes,
        expenses: user.expenses,
    }))
}

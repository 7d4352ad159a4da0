use serde::{Deserialize, Serialize};

use crate::store::Entry;

/// Request body for creating an income or expense line.
#[derive(Debug, Deserialize)]
pub struct NewEntryRequest {
    #[serde(default, rename = "descripcion")]
    pub description: String,
    #[serde(default, rename = "monto")]
    pub amount: f64,
}

/// Aggregate view of both ledgers.
#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    #[serde(rename = "ingresos")]
    pub incomes: Vec<Entry>,
    #[serde(rename = "egresos")]
    pub expenses: Vec<Entry>,
    #[serde(rename = "totalIngresos")]
    pub total_incomes: f64,
    #[serde(rename = "totalEgresos")]
    pub total_expenses: f64,
    pub balance: f64,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
}

/// Bulk replacement of both ledgers; both lists must be present.
#[derive(Debug, Deserialize)]
pub struct LoadDataRequest {
    #[serde(rename = "ingresos")]
    pub incomes: Option<Vec<Entry>>,
    #[serde(rename = "egresos")]
    pub expenses: Option<Vec<Entry>>,
}

#[derive(Debug, Serialize)]
pub struct LoadDataResponse {
    pub message: String,
    #[serde(rename = "ingresosCount")]
    pub incomes_count: usize,
    #[serde(rename = "egresosCount")]
    pub expenses_count: usize,
}

/// Raw saved lists, as consumed by the client's month view and JSON export.
#[derive(Debug, Serialize)]
pub struct SavedDataResponse {
    #[serde(rename = "ingresos")]
    pub incomes: Vec<Entry>,
    #[serde(rename = "egresos")]
    pub expenses: Vec<Entry>,
}

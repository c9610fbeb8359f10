//! Customer query handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Datelike;
use serde::Deserialize;

use crate::{AppError, AppState, MAX_PAGE_LIMIT};
use banklink_core::models::{CustomerFilter, CustomerList, CustomerWithSummary};
use banklink_core::BankFilter;

/// Query parameters for listing customers
#[derive(Debug, Deserialize)]
pub struct CustomerQuery {
    pub name: Option<String>,
    pub email: Option<String>,
    pub mobile_no: Option<String>,
    pub tax_id: Option<String>,
    pub tin: Option<String>,
    pub rc: Option<String>,
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    10
}

/// GET /api/customers - List customers matching every given filter
pub async fn list_customers(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CustomerQuery>,
) -> Result<Json<CustomerList>, AppError> {
    let filter = CustomerFilter {
        name: params.name,
        email: params.email,
        mobile_no: params.mobile_no,
        tax_id: params.tax_id,
        tin: params.tin,
        rc: params.rc,
    };
    let limit = params.limit.clamp(1, MAX_PAGE_LIMIT);
    let offset = params.offset.max(0);

    Ok(Json(state.db.list_customers(&filter, offset, limit)?))
}

/// Query parameters for a single customer
#[derive(Debug, Deserialize)]
pub struct CustomerSummaryQuery {
    /// Defaults to the current year
    pub year: Option<i32>,
    /// Bank name or "all" (the default)
    pub bank: Option<String>,
}

/// GET /api/customers/:id - Customer with per-bank transaction summaries
pub async fn get_customer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(params): Query<CustomerSummaryQuery>,
) -> Result<Json<CustomerWithSummary>, AppError> {
    let year = params.year.unwrap_or_else(|| chrono::Utc::now().year());
    let filter = BankFilter::parse(params.bank.as_deref().unwrap_or("all"));

    // Ledger reads are blocking file IO and decompression
    let result = tokio::task::spawn_blocking(move || {
        banklink_core::customer_with_summary(
            &state.db,
            state.store.as_ref(),
            &state.storage.ledger_bucket,
            id,
            year,
            &filter,
        )
    })
    .await??;

    Ok(Json(result))
}

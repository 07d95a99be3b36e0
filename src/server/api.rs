use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use super::SharedState;
use crate::airtable::{Base, Field, TableSummary};
use crate::auth::ConnectionStatus;
use crate::error::ConnectorError;

/// GET /: service banner with stored-token presence.
pub(super) async fn index(State(state): State<SharedState>) -> Json<Value> {
    let status = state.manager().status();
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "airtable": status.airtable,
        "ebay": status.ebay,
    }))
}

/// GET /api/status: whether each provider can produce a valid token now.
/// May refresh expiring tokens.
pub(super) async fn live_status(State(state): State<SharedState>) -> Json<ConnectionStatus> {
    Json(state.manager().live_status().await)
}

pub(super) async fn airtable_bases(
    State(state): State<SharedState>,
) -> Result<Json<Vec<Base>>, ConnectorError> {
    Ok(Json(state.airtable.list_bases().await?))
}

pub(super) async fn airtable_tables(
    State(state): State<SharedState>,
    Path(base_id): Path<String>,
) -> Result<Json<Vec<TableSummary>>, ConnectorError> {
    let tables = state.airtable.base_schema(&base_id).await?;
    Ok(Json(tables.iter().map(|table| table.summary()).collect()))
}

pub(super) async fn airtable_fields(
    State(state): State<SharedState>,
    Path((base_id, table)): Path<(String, String)>,
) -> Result<Json<Vec<Field>>, ConnectorError> {
    Ok(Json(state.airtable.table_fields(&base_id, &table).await?))
}

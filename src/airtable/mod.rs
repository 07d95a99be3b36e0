//! Airtable Web API client for base, schema and record lookups.
//!
//! Every request takes its bearer token from [`TokenManager`], so an expiring
//! Airtable token is refreshed transparently before the call.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

use crate::auth::{AuthError, ProviderId, TokenManager};
use crate::error::ConnectorError;

pub const AIRTABLE_API_BASE: &str = "https://api.airtable.com/v0";

/// Field type reported for fields inferred from a sampled record.
pub const UNKNOWN_FIELD_TYPE: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Base {
    pub id: String,
    pub name: String,
    #[serde(
        default,
        rename = "permissionLevel",
        skip_serializing_if = "Option::is_none"
    )]
    pub permission_level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl Table {
    pub fn summary(&self) -> TableSummary {
        TableSummary {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }

    fn matches(&self, id_or_name: &str) -> bool {
        self.id == id_or_name || self.name == id_or_name
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
}

impl Field {
    fn inferred(name: String) -> Self {
        Self {
            id: name.clone(),
            name,
            field_type: UNKNOWN_FIELD_TYPE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(
        default,
        rename = "createdTime",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_time: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPage {
    #[serde(default)]
    pub records: Vec<Record>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<String>,
}

/// Optional filters for [`AirtableApi::records`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordQuery {
    pub filter_by_formula: Option<String>,
    pub max_records: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Deserialize)]
struct BasesResponse {
    #[serde(default)]
    bases: Vec<Base>,
}

#[derive(Deserialize)]
struct TablesResponse {
    #[serde(default)]
    tables: Vec<Table>,
}

pub struct AirtableApi {
    client: reqwest::Client,
    tokens: Arc<TokenManager>,
    base_url: String,
}

impl AirtableApi {
    pub fn new(client: reqwest::Client, tokens: Arc<TokenManager>) -> Self {
        Self {
            client,
            tokens,
            base_url: AIRTABLE_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Bases visible to the token. Empty when the metadata API is forbidden
    /// or unavailable for this account.
    pub async fn list_bases(&self) -> Result<Vec<Base>, ConnectorError> {
        let url = self.url(&["meta", "bases"])?;
        match self.get_json::<BasesResponse>(url).await {
            Ok(response) => Ok(response.bases),
            Err(err) if is_forbidden_or_missing(&err) => {
                debug!(error = %err, "base listing unavailable, returning none");
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    /// Tables of a base with their field metadata. Empty when the schema
    /// endpoint is forbidden or the base is not found.
    pub async fn base_schema(&self, base_id: &str) -> Result<Vec<Table>, ConnectorError> {
        let url = self.url(&["meta", "bases", base_id, "tables"])?;
        match self.get_json::<TablesResponse>(url).await {
            Ok(response) => Ok(response.tables),
            Err(err) if is_forbidden_or_missing(&err) => {
                debug!(error = %err, "schema unavailable, returning no tables");
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    /// Fields of one table, matched by id or name.
    ///
    /// Prefers schema metadata, even when it lists the table with no fields.
    /// When that is unavailable or the table is not listed, the field names
    /// of one sampled record are returned with type [`UNKNOWN_FIELD_TYPE`].
    pub async fn table_fields(
        &self,
        base_id: &str,
        table_id_or_name: &str,
    ) -> Result<Vec<Field>, ConnectorError> {
        match self.base_schema(base_id).await {
            Ok(tables) => {
                if let Some(table) = tables
                    .into_iter()
                    .find(|table| table.matches(table_id_or_name))
                {
                    return Ok(table.fields);
                }
            }
            Err(ConnectorError::Auth(err)) => return Err(err.into()),
            Err(err) => {
                warn!(error = %err, "schema lookup failed, inferring fields from a record");
            }
        }
        let names = self.sampled_field_names(base_id, table_id_or_name).await?;
        Ok(names.into_iter().map(Field::inferred).collect())
    }

    /// Field names present on the first record of a table.
    pub async fn sampled_field_names(
        &self,
        base_id: &str,
        table_id_or_name: &str,
    ) -> Result<Vec<String>, ConnectorError> {
        let page = self
            .records(
                base_id,
                table_id_or_name,
                &RecordQuery {
                    max_records: Some(1),
                    ..RecordQuery::default()
                },
            )
            .await?;
        Ok(page
            .records
            .into_iter()
            .next()
            .map(|record| record.fields.into_iter().map(|(name, _)| name).collect())
            .unwrap_or_default())
    }

    pub async fn records(
        &self,
        base_id: &str,
        table_id_or_name: &str,
        query: &RecordQuery,
    ) -> Result<RecordPage, ConnectorError> {
        if base_id.is_empty() || table_id_or_name.is_empty() {
            return Err(ConnectorError::InvalidArgument(
                "base id and table are required".to_string(),
            ));
        }
        let mut url = self.url(&[base_id, table_id_or_name])?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(formula) = query.filter_by_formula.as_deref() {
                pairs.append_pair("filterByFormula", formula);
            }
            if let Some(max) = query.max_records {
                pairs.append_pair("maxRecords", &max.to_string());
            }
            if let Some(size) = query.page_size {
                pairs.append_pair("pageSize", &size.to_string());
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        self.get_json(url).await
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ConnectorError> {
        let mut url = Url::parse(&self.base_url).map_err(AuthError::from)?;
        url.path_segments_mut()
            .map_err(|_| {
                ConnectorError::InvalidArgument(format!(
                    "Airtable base URL {} cannot take a path",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ConnectorError> {
        let token = self
            .tokens
            .valid_access_token(ProviderId::Airtable)
            .await
            .ok_or(AuthError::NotConnected(ProviderId::Airtable))?;

        let response = self.client.get(url).bearer_auth(token).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ConnectorError::api(status.as_u16(), error_message(&body, status)));
        }
        Ok(serde_json::from_str(&body)?)
    }
}

fn is_forbidden_or_missing(err: &ConnectorError) -> bool {
    matches!(err, ConnectorError::Api { status: 403 | 404, .. })
}

/// Airtable errors come as `{"error": {"type", "message"}}` or `{"error": "TYPE"}`.
fn error_message(body: &str, status: reqwest::StatusCode) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));
    match error {
        Some(Value::String(kind)) => kind.clone(),
        Some(Value::Object(obj)) => obj
            .get("message")
            .or_else(|| obj.get("type"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| status.to_string()),
        _ => status.to_string(),
    }
}

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::Url;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::{Crm, CrmError, CrmRecord, CrmResult};
use crate::config::{CrmConfig, CrmFields};

const PAGE_SIZE: &str = "100";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct ListResponse {
    records: Vec<AirtableRecord>,
    #[serde(default)]
    offset: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AirtableRecord {
    id: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

/// Airtable REST client for the properties table.
///
/// Retries are left to the caller's [`super::RetryPolicy`]; this type only
/// classifies failures: 429, 5xx and network errors are transient, other
/// 4xx are permanent.
pub struct AirtableCrm {
    client: Client,
    table_url: Url,
    token: String,
    fields: CrmFields,
}

impl AirtableCrm {
    pub fn new(config: &CrmConfig, token: String) -> CrmResult<Self> {
        let base_id = config
            .base_id
            .as_deref()
            .ok_or_else(|| CrmError::Misconfigured("crm.base_id is not set".into()))?;
        let table_url = table_url(&config.api_url, base_id, &config.table)?;
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .use_rustls_tls()
            .build()
            .map_err(|e| CrmError::Misconfigured(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            table_url,
            token,
            fields: config.fields.clone(),
        })
    }

    fn send(&self, request: RequestBuilder) -> CrmResult<Response> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .map_err(|e| CrmError::Transient(format!("airtable request failed: {e}")))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(classify_status(status, &body))
    }

    fn find_record_id(&self, unique_id: &str) -> CrmResult<String> {
        let formula = format!(
            "{{{}}}='{}'",
            self.fields.unique_id,
            unique_id.replace('\\', "\\\\").replace('\'', "\\'")
        );
        let request = self
            .client
            .get(self.table_url.clone())
            .query(&[("filterByFormula", formula.as_str()), ("maxRecords", "1")]);
        let page: ListResponse = self
            .send(request)?
            .json()
            .map_err(|e| CrmError::Permanent(format!("unexpected airtable response: {e}")))?;
        page.records
            .into_iter()
            .next()
            .map(|r| r.id)
            .ok_or_else(|| CrmError::RecordNotFound(unique_id.to_string()))
    }

    fn to_record(&self, raw: AirtableRecord) -> CrmRecord {
        CrmRecord {
            record_id: Some(raw.id),
            unique_id: field_text(&raw.fields, &self.fields.unique_id),
            status: field_text(&raw.fields, &self.fields.status),
            address: field_text(&raw.fields, &self.fields.address),
            area: field_text(&raw.fields, &self.fields.area),
            renovator: field_text(&raw.fields, &self.fields.renovator),
            technical_constructor: field_text(&raw.fields, &self.fields.technical_constructor),
        }
    }
}

impl Crm for AirtableCrm {
    fn name(&self) -> &str {
        "airtable"
    }

    fn list_records(&self) -> CrmResult<Vec<CrmRecord>> {
        let mut records = Vec::new();
        let mut offset: Option<String> = None;
        loop {
            let mut request = self
                .client
                .get(self.table_url.clone())
                .query(&[("pageSize", PAGE_SIZE)]);
            if let Some(ref token) = offset {
                request = request.query(&[("offset", token.as_str())]);
            }
            let page: ListResponse = self
                .send(request)?
                .json()
                .map_err(|e| CrmError::Permanent(format!("unexpected airtable response: {e}")))?;
            tracing::debug!(count = page.records.len(), "fetched airtable page");
            records.extend(page.records.into_iter().map(|r| self.to_record(r)));
            match page.offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        Ok(records)
    }

    fn update_status(&self, unique_id: &str, status: &str) -> CrmResult<()> {
        let record_id = self.find_record_id(unique_id)?;
        let mut url = self.table_url.clone();
        url.path_segments_mut()
            .map_err(|_| CrmError::Misconfigured("api_url cannot be a base".into()))?
            .push(&record_id);
        let mut fields = Map::new();
        fields.insert(self.fields.status.clone(), Value::String(status.to_string()));
        let request = self.client.patch(url).json(&json!({ "fields": fields }));
        self.send(request)?;
        tracing::info!(unique_id, record_id, status, "airtable status updated");
        Ok(())
    }
}

fn table_url(api_url: &str, base_id: &str, table: &str) -> CrmResult<Url> {
    let mut url = Url::parse(api_url)
        .map_err(|e| CrmError::Misconfigured(format!("invalid api_url '{api_url}': {e}")))?;
    url.path_segments_mut()
        .map_err(|_| CrmError::Misconfigured(format!("api_url '{api_url}' cannot be a base")))?
        .pop_if_empty()
        .extend(["v0", base_id, table]);
    Ok(url)
}

fn classify_status(status: StatusCode, body: &str) -> CrmError {
    let detail = format!("airtable returned {status}: {}", body.trim());
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        CrmError::Transient(detail)
    } else if status == StatusCode::NOT_FOUND {
        CrmError::Misconfigured(detail)
    } else {
        CrmError::Permanent(detail)
    }
}

/// Text of a field; lookups and multi-selects come back as arrays, in which
/// case the first textual element is used.
fn field_text(fields: &Map<String, Value>, name: &str) -> Option<String> {
    let text = match fields.get(name)? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().find_map(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })?,
        _ => return None,
    };
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_url_encodes_segments() {
        let url = table_url("https://api.airtable.com", "appABC", "Reno Pipeline").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.airtable.com/v0/appABC/Reno%20Pipeline"
        );
        let url = table_url("https://proxy.local/airtable/", "appABC", "Properties").unwrap();
        assert_eq!(
            url.as_str(),
            "https://proxy.local/airtable/v0/appABC/Properties"
        );
    }

    #[test]
    fn invalid_api_url_is_misconfigured() {
        assert!(matches!(
            table_url("not a url", "app", "t"),
            Err(CrmError::Misconfigured(_))
        ));
    }

    #[test]
    fn status_classification() {
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "").is_retryable());
        assert!(classify_status(StatusCode::BAD_GATEWAY, "").is_retryable());
        assert!(!classify_status(StatusCode::UNAUTHORIZED, "").is_retryable());
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, "{}"),
            CrmError::Misconfigured(_)
        ));
    }

    #[test]
    fn field_text_handles_airtable_shapes() {
        let fields: Map<String, Value> = serde_json::from_value(json!({
            "Unique ID": " SP-1 ",
            "Renovator": ["Obras Norte", "Other"],
            "Area": 28004,
            "Blank": "   ",
            "Checkbox": true
        }))
        .unwrap();
        assert_eq!(field_text(&fields, "Unique ID").as_deref(), Some("SP-1"));
        assert_eq!(field_text(&fields, "Renovator").as_deref(), Some("Obras Norte"));
        assert_eq!(field_text(&fields, "Area").as_deref(), Some("28004"));
        assert_eq!(field_text(&fields, "Blank"), None);
        assert_eq!(field_text(&fields, "Checkbox"), None);
        assert_eq!(field_text(&fields, "Missing"), None);
    }

    #[test]
    fn new_requires_base_id() {
        let config = CrmConfig::default();
        assert!(matches!(
            AirtableCrm::new(&config, "token".into()),
            Err(CrmError::Misconfigured(_))
        ));
    }
}

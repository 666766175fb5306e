//! Export of client records to a Google spreadsheet via a service account.

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::ClientRecord;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;

const SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const SHARE_HINT: &str = "Ensure the spreadsheet is shared with the service account email.";

pub(crate) const HEADER: [&str; 15] = [
    "ID",
    "Company Name",
    "Contact Person",
    "Phone",
    "Email",
    "Industry",
    "State",
    "Region",
    "Address",
    "Estimated Usage (L)",
    "Priority",
    "Status",
    "Notes",
    "Created At",
    "Updated At",
];

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// The fields of a service-account key file that signing needs.
#[derive(Deserialize, Debug, Clone)]
pub(crate) struct ServiceAccount {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl ServiceAccount {
    pub(crate) fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|_| {
            AppError::Config(
                "Invalid GOOGLE_SERVICE_ACCOUNT_KEY format. Must be valid JSON.".to_string(),
            )
        })
    }
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Signs the one-hour RS256 assertion exchanged for an access token.
pub(crate) fn sign_assertion(account: &ServiceAccount, issued_at: i64) -> Result<String> {
    let key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())?;
    let claims = Claims {
        iss: &account.client_email,
        scope: SCOPE,
        aud: &account.token_uri,
        iat: issued_at,
        exp: issued_at + 3600,
    };
    Ok(encode(&Header::new(Algorithm::RS256), &claims, &key)?)
}

/// Header row followed by one row per client. Phones get a leading `'` so
/// the sheet keeps their leading zero.
pub(crate) fn client_rows(clients: &[ClientRecord]) -> Vec<Vec<Value>> {
    let mut rows = Vec::with_capacity(clients.len() + 1);
    rows.push(HEADER.iter().map(|h| json!(h)).collect());
    for c in clients {
        let phone = if c.phone.is_empty() {
            String::new()
        } else {
            format!("'{}", c.phone)
        };
        rows.push(vec![
            json!(c.id.to_string()),
            json!(c.company_name),
            json!(c.contact_person),
            json!(phone),
            json!(c.email),
            json!(c.industry),
            json!(c.state.label()),
            json!(c.region.label()),
            json!(c.address),
            json!(c.estimated_usage),
            json!(c.priority),
            json!(c.status),
            json!(c.notes),
            json!(c.created_at.to_rfc3339()),
            json!(c.updated_at.to_rfc3339()),
        ]);
    }
    rows
}

pub(crate) fn data_range(row_count: usize) -> String {
    format!("Sheet1!A1:O{}", row_count)
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SyncReport {
    pub rows_written: usize,
    pub updated_cells: u64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateResponse {
    #[serde(default)]
    updated_cells: u64,
}

pub(crate) struct SheetsClient {
    http: Client,
    api_base: String,
    account: ServiceAccount,
}

impl SheetsClient {
    pub(crate) fn new(api_base: &str, account: ServiceAccount, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            account,
        })
    }

    pub(crate) fn from_config(config: &Config) -> Result<Self> {
        let raw = config
            .secrets
            .google_service_account_key
            .as_deref()
            .ok_or(AppError::MissingCredential("GOOGLE_SERVICE_ACCOUNT_KEY"))?;
        let account = ServiceAccount::from_json(raw)?;
        Self::new(&config.sheets_api_base, account, config.request_timeout)
    }

    async fn access_token(&self) -> Result<String> {
        let assertion = sign_assertion(&self.account, Utc::now().timestamp())?;
        let response = self
            .http
            .post(&self.account.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::MalformedResponse("sheets", e.to_string()))?;
        token.access_token.ok_or_else(|| {
            AppError::Sheets(
                "Failed to authenticate with Google. Check service account configuration."
                    .to_string(),
            )
        })
    }

    /// Clears `Sheet1` and writes `rows` from A1.
    pub(crate) async fn write_rows(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
        rows: &[Vec<Value>],
    ) -> Result<SyncReport> {
        let values_url = format!("{}/v4/spreadsheets/{}/values", self.api_base, spreadsheet_id);

        let clear = self
            .http
            .post(format!("{}/Sheet1:clear", values_url))
            .bearer_auth(access_token)
            .send()
            .await?;
        if !clear.status().is_success() {
            let body = clear.text().await.unwrap_or_default();
            tracing::error!(target: "sheets_task", "Failed to clear sheet: {}", body);
            return Err(AppError::Sheets(format!("Failed to clear sheet. {}", SHARE_HINT)));
        }

        let update = self
            .http
            .put(format!("{}/{}", values_url, data_range(rows.len())))
            .query(&[("valueInputOption", "USER_ENTERED")])
            .bearer_auth(access_token)
            .json(&json!({ "values": rows }))
            .send()
            .await?;
        if !update.status().is_success() {
            let body = update.text().await.unwrap_or_default();
            tracing::error!(target: "sheets_task", "Failed to update sheet: {}", body);
            return Err(AppError::Sheets(format!(
                "Failed to update sheet. Check spreadsheet permissions. {}",
                SHARE_HINT
            )));
        }

        let result: UpdateResponse = update
            .json()
            .await
            .map_err(|e| AppError::MalformedResponse("sheets", e.to_string()))?;
        Ok(SyncReport {
            rows_written: rows.len(),
            updated_cells: result.updated_cells,
        })
    }

    /// Replaces the sheet's contents with the given clients.
    pub(crate) async fn sync_clients(
        &self,
        spreadsheet_id: &str,
        clients: &[ClientRecord],
    ) -> Result<SyncReport> {
        tracing::info!(target: "sheets_task",
            "Syncing {} clients to spreadsheet {} as {}",
            clients.len(), spreadsheet_id, self.account.client_email
        );
        let token = self.access_token().await?;
        let report = self
            .write_rows(&token, spreadsheet_id, &client_rows(clients))
            .await?;
        tracing::info!(target: "sheets_task", "Sync wrote {} rows ({} cells)", report.rows_written, report.updated_cells);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{Region, State};
    use crate::models::{ClientStatus, Priority};
    use uuid::Uuid;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record(phone: &str) -> ClientRecord {
        let now = Utc::now();
        ClientRecord {
            id: Uuid::new_v4(),
            owner: None,
            company_name: "Kilang Sawit Kemaman Sdn Bhd".to_string(),
            contact_person: "To be contacted".to_string(),
            phone: phone.to_string(),
            email: String::new(),
            address: String::new(),
            industry: "Palm Oil".to_string(),
            state: State::Terengganu,
            region: Region::PantaiTimur,
            estimated_usage: 18_000,
            status: ClientStatus::New,
            priority: Priority::High,
            notes: String::new(),
            latitude: None,
            longitude: None,
            created_at: now,
            updated_at: now,
            archived_at: None,
        }
    }

    fn account() -> ServiceAccount {
        ServiceAccount {
            client_email: "sync@project.iam.gserviceaccount.com".to_string(),
            private_key: "not a key".to_string(),
            token_uri: default_token_uri(),
        }
    }

    #[test]
    fn test_rows_and_range() {
        let rows = client_rows(&[record("09-859 1234"), record("")]);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].len(), 15);
        assert_eq!(rows[0][9], json!("Estimated Usage (L)"));
        assert_eq!(rows[1][3], json!("'09-859 1234"));
        assert_eq!(rows[2][3], json!(""));
        assert_eq!(rows[1][6], json!("Terengganu"));
        assert_eq!(rows[1][7], json!("Pantai Timur"));
        assert_eq!(rows[1][9], json!(18_000));
        assert_eq!(rows[1][10], json!("high"));
        assert_eq!(rows[1][11], json!("new"));
        assert_eq!(data_range(rows.len()), "Sheet1!A1:O3");
    }

    #[test]
    fn test_service_account_parsing() {
        let account = ServiceAccount::from_json(
            r#"{"client_email": "a@b.iam.gserviceaccount.com", "private_key": "pem", "project_id": "p"}"#,
        )
        .unwrap();
        assert_eq!(account.token_uri, "https://oauth2.googleapis.com/token");
        assert!(matches!(ServiceAccount::from_json("{not json"), Err(AppError::Config(_))));
    }

    #[test]
    fn test_invalid_private_key_fails_signing() {
        assert!(matches!(sign_assertion(&account(), 1_700_000_000), Err(AppError::Jwt(_))));
    }

    #[test]
    fn test_missing_key_is_reported() {
        assert!(matches!(
            SheetsClient::from_config(&Config::default()),
            Err(AppError::MissingCredential("GOOGLE_SERVICE_ACCOUNT_KEY"))
        ));
    }

    #[tokio::test]
    async fn test_write_rows_clears_then_updates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v4/spreadsheets/sheet-1/values/Sheet1:clear"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v4/spreadsheets/sheet-1/values/Sheet1!A1:O2"))
            .and(query_param("valueInputOption", "USER_ENTERED"))
            .and(body_partial_json(json!({"values": [HEADER]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"updatedCells": 30})))
            .expect(1)
            .mount(&server)
            .await;

        let client = SheetsClient::new(&server.uri(), account(), Duration::from_secs(5)).unwrap();
        let rows = client_rows(&[record("012-345 6789")]);
        let report = client.write_rows("tok", "sheet-1", &rows).await.unwrap();
        assert_eq!(
            report,
            SyncReport {
                rows_written: 2,
                updated_cells: 30
            }
        );
    }

    #[tokio::test]
    async fn test_clear_failure_mentions_sharing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("PERMISSION_DENIED"))
            .mount(&server)
            .await;

        let client = SheetsClient::new(&server.uri(), account(), Duration::from_secs(5)).unwrap();
        let err = client
            .write_rows("tok", "sheet-1", &client_rows(&[]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Sheets(_)));
        assert!(err.to_string().contains("shared with the service account"));
    }
}

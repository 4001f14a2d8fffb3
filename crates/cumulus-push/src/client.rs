use cumulus_core::{CumulusError, SalesforceConfig};
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::soap::{login_envelope, parse_login_response};

#[derive(Debug, Deserialize)]
struct QueryResponse<T> {
    records: Vec<T>,
    #[serde(default)]
    done: bool,
    #[serde(rename = "nextRecordsUrl")]
    next_records_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
    message: String,
}

/// An authenticated session against one Salesforce org.
pub struct SalesforceClient {
    http: reqwest::Client,
    instance_url: String,
    api_version: String,
    session_id: String,
}

impl SalesforceClient {
    /// Log in with the username and password from `config` using the SOAP
    /// partner API.
    ///
    /// # Errors
    ///
    /// Returns [`CumulusError::Config`] if credentials are missing and
    /// [`CumulusError::Salesforce`] if the login is refused or the response
    /// cannot be read.
    pub async fn login(config: &SalesforceConfig) -> Result<Self, CumulusError> {
        let (username, password) = config.credentials()?;
        let http = build_http()?;
        let url = format!(
            "{}/services/Soap/u/{}",
            config.server_url.trim_end_matches('/'),
            config.api_version
        );
        debug!(%url, username, "Salesforce login");

        let response = http
            .post(&url)
            .header("Content-Type", "text/xml; charset=UTF-8")
            .header("SOAPAction", "login")
            .body(login_envelope(username, password))
            .send()
            .await
            .map_err(|e| CumulusError::Salesforce(format!("login request failed: {e}")))?;
        // Faults come back as HTTP 500 with a SOAP body, so the body is
        // parsed whatever the status.
        let text = response
            .text()
            .await
            .map_err(|e| CumulusError::Salesforce(format!("login response unreadable: {e}")))?;
        let session = parse_login_response(&text)?;

        let instance_url = Url::parse(&session.server_url)
            .map_err(|e| CumulusError::Salesforce(format!("invalid server URL: {e}")))?
            .origin()
            .ascii_serialization();
        info!(%instance_url, "logged in to Salesforce");

        Ok(Self {
            http,
            instance_url,
            api_version: config.api_version.clone(),
            session_id: session.session_id,
        })
    }

    /// Use an existing session, e.g. an access token from another tool.
    ///
    /// # Errors
    ///
    /// Returns [`CumulusError::Salesforce`] if the HTTP client cannot be
    /// built.
    pub fn with_session(
        instance_url: &str,
        api_version: &str,
        session_id: &str,
    ) -> Result<Self, CumulusError> {
        Ok(Self {
            http: build_http()?,
            instance_url: instance_url.trim_end_matches('/').to_string(),
            api_version: api_version.to_string(),
            session_id: session_id.to_string(),
        })
    }

    /// Base URL of the org, e.g. `https://na1.salesforce.com`.
    pub fn instance_url(&self) -> &str {
        &self.instance_url
    }

    fn data_path(&self, route: &str) -> String {
        format!("/services/data/v{}{route}", self.api_version)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{path}", self.instance_url);
        debug!(%method, %url, "Salesforce request");
        self.http
            .request(method, url)
            .bearer_auth(&self.session_id)
            .header("Accept", "application/json")
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, CumulusError> {
        let response = request
            .send()
            .await
            .map_err(|e| CumulusError::Salesforce(format!("request failed: {e}")))?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(api_error(response).await)
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, CumulusError> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| CumulusError::Salesforce(format!("invalid response body: {e}")))
    }

    /// Run a SOQL query and return every record, following
    /// `nextRecordsUrl` across batches.
    pub async fn query<T: DeserializeOwned>(&self, soql: &str) -> Result<Vec<T>, CumulusError> {
        self.query_at("/query", soql).await
    }

    /// Run a SOQL query against the Tooling API.
    pub async fn tooling_query<T: DeserializeOwned>(
        &self,
        soql: &str,
    ) -> Result<Vec<T>, CumulusError> {
        self.query_at("/tooling/query", soql).await
    }

    async fn query_at<T: DeserializeOwned>(
        &self,
        route: &str,
        soql: &str,
    ) -> Result<Vec<T>, CumulusError> {
        debug!(soql, route, "SOQL query");
        let mut page: QueryResponse<T> = self
            .send_json(self.request(Method::GET, &self.data_path(route)).query(&[("q", soql)]))
            .await?;
        let mut records = Vec::new();
        loop {
            records.append(&mut page.records);
            match page.next_records_url.take() {
                Some(next) if !page.done => {
                    page = self.send_json(self.request(Method::GET, &next)).await?;
                }
                _ => break,
            }
        }
        Ok(records)
    }

    /// POST `body` to a Tooling API resource such as `runTestsAsynchronous`
    /// and decode the response.
    pub async fn tooling_post<B, T>(&self, resource: &str, body: &B) -> Result<T, CumulusError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let path = self.data_path(&format!("/tooling/{resource}/"));
        self.send_json(self.request(Method::POST, &path).json(body))
            .await
    }

    /// Insert a record and return its Id.
    pub async fn create<B: Serialize + ?Sized>(
        &self,
        sobject: &str,
        body: &B,
    ) -> Result<String, CumulusError> {
        let path = self.data_path(&format!("/sobjects/{sobject}/"));
        let created: CreateResponse = self
            .send_json(self.request(Method::POST, &path).json(body))
            .await?;
        debug!(sobject, id = %created.id, "created record");
        Ok(created.id)
    }

    /// Update fields of record `id`.
    pub async fn update<B: Serialize + ?Sized>(
        &self,
        sobject: &str,
        id: &str,
        body: &B,
    ) -> Result<(), CumulusError> {
        let path = self.data_path(&format!("/sobjects/{sobject}/{id}"));
        self.send(self.request(Method::PATCH, &path).json(body))
            .await?;
        debug!(sobject, id, "updated record");
        Ok(())
    }
}

fn build_http() -> Result<reqwest::Client, CumulusError> {
    reqwest::Client::builder()
        .user_agent("cumulus")
        .build()
        .map_err(|e| CumulusError::Salesforce(format!("failed to create HTTP client: {e}")))
}

/// The REST API reports errors as a list of `{errorCode, message}`.
async fn api_error(response: Response) -> CumulusError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<Vec<ApiError>>(&body)
        .ok()
        .filter(|errors| !errors.is_empty())
        .map(|errors| {
            errors
                .iter()
                .map(|e| match &e.error_code {
                    Some(code) => format!("{code}: {}", e.message),
                    None => e.message.clone(),
                })
                .collect::<Vec<_>>()
                .join("; ")
        })
        .unwrap_or(body);
    CumulusError::Salesforce(format!("HTTP {status}: {detail}"))
}

/// Quote a value for use inside a SOQL string literal.
pub(crate) fn soql_quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

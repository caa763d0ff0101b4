use std::time::Duration;

use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column, Connection, Row};
use thiserror::Error;
use tracing::debug;

use mayday_core::creds;
use mayday_core::job::{DbParams, HttpParams, JobParams};

/// Classified failure of a single job invocation.
///
/// Caught and logged by the runtime; the job stays scheduled for its next
/// natural fire.
#[derive(Debug, Error)]
pub enum ExecError {
    /// HTTP method string is not a valid method token.
    #[error("invalid http method {0:?}")]
    BadMethod(String),
    /// Could not connect to the target.
    #[error("connection failed to {url}: {source}")]
    Connect {
        /// Target URL.
        url: String,
        /// Underlying client error.
        source: reqwest::Error,
    },
    /// The request timed out.
    #[error("timed out connecting to {url}")]
    Timeout {
        /// Target URL.
        url: String,
    },
    /// Redirect limit exceeded.
    #[error("too many redirects for {url}")]
    TooManyRedirects {
        /// Target URL.
        url: String,
    },
    /// The server answered with a non-success status.
    #[error("request to {url} returned status {status}")]
    Status {
        /// Target URL.
        url: String,
        /// Response status code.
        status: reqwest::StatusCode,
    },
    /// Any other request failure.
    #[error("request to {url} failed: {source}")]
    Request {
        /// Target URL.
        url: String,
        /// Underlying client error.
        source: reqwest::Error,
    },
    /// A required database credential is absent from the environment.
    #[error("database credential missing: {0}")]
    CredentialsMissing(&'static str),
    /// The database connection or query failed.
    #[error("database error: {0}")]
    DataSource(#[from] sqlx::Error),
}

/// Run one job invocation to completion, returning the text to notify.
///
/// Dispatch is an exhaustive match over the closed parameter enum; there is
/// no unknown-type path left at this point.
pub async fn execute(params: &JobParams, http: &reqwest::Client) -> Result<String, ExecError> {
    match params {
        JobParams::Alert(p) => Ok(p.message.clone()),
        JobParams::HttpQuery(p) => http_query(p, http).await,
        JobParams::DatabaseQuery(p) => db_query(p).await,
    }
}

async fn http_query(p: &HttpParams, http: &reqwest::Client) -> Result<String, ExecError> {
    let method = reqwest::Method::from_bytes(p.method.to_ascii_uppercase().as_bytes())
        .map_err(|_| ExecError::BadMethod(p.method.clone()))?;

    let mut req = http.request(method, &p.url);
    for (key, value) in &p.headers {
        req = req.header(key, value);
    }
    if let Some(body) = &p.body {
        req = req.body(body.clone());
    }
    if let Some(ms) = p.timeout_ms {
        req = req.timeout(Duration::from_millis(ms));
    }

    let resp = req.send().await.map_err(|e| classify(&p.url, e))?;
    if let Err(e) = resp.error_for_status_ref() {
        return Err(ExecError::Status {
            url: p.url.clone(),
            status: e.status().unwrap_or(reqwest::StatusCode::INTERNAL_SERVER_ERROR),
        });
    }
    resp.text().await.map_err(|e| classify(&p.url, e))
}

fn classify(url: &str, e: reqwest::Error) -> ExecError {
    let url = url.to_string();
    if e.is_timeout() {
        ExecError::Timeout { url }
    } else if e.is_connect() {
        ExecError::Connect { url, source: e }
    } else if e.is_redirect() {
        ExecError::TooManyRedirects { url }
    } else {
        ExecError::Request { url, source: e }
    }
}

async fn db_query(p: &DbParams) -> Result<String, ExecError> {
    let creds = creds::database();
    let host = creds.host.ok_or(ExecError::CredentialsMissing("MYSQL_HOST"))?;
    let database = creds.database.ok_or(ExecError::CredentialsMissing("MYSQL_DB"))?;
    let user = creds.user.ok_or(ExecError::CredentialsMissing("MYSQL_USER"))?;

    let mut opts = MySqlConnectOptions::new().host(&host).username(&user).database(&database);
    if let Some(password) = &creds.password {
        opts = opts.password(password);
    }

    let mut conn = MySqlConnection::connect_with(&opts).await?;
    let fetched = sqlx::query(&p.query).fetch_all(&mut conn).await;
    // The connection is released regardless of the query outcome.
    if let Err(e) = conn.close().await {
        debug!("database close failed: {e}");
    }
    Ok(render_rows(&fetched?))
}

fn render_rows(rows: &[MySqlRow]) -> String {
    if rows.is_empty() {
        return "(no rows)".to_string();
    }
    rows.iter().map(render_row).collect::<Vec<_>>().join("\n")
}

// Best-effort text rendering: common column types decoded, anything else
// shown as a placeholder.
fn render_row(row: &MySqlRow) -> String {
    let cells: Vec<String> = row
        .columns()
        .iter()
        .enumerate()
        .map(|(i, col)| format!("{}={}", col.name(), render_cell(row, i)))
        .collect();
    cells.join(", ")
}

fn render_cell(row: &MySqlRow, i: usize) -> String {
    if let Ok(v) = row.try_get::<Option<String>, _>(i) {
        return v.unwrap_or_else(|| "NULL".to_string());
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
        return v.map_or_else(|| "NULL".to_string(), |n| n.to_string());
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(i) {
        return v.map_or_else(|| "NULL".to_string(), |n| n.to_string());
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(i) {
        return v.map_or_else(|| "NULL".to_string(), |b| b.to_string());
    }
    "?".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mayday_core::job::AlertParams;

    #[tokio::test]
    async fn alert_returns_its_message() {
        let params = JobParams::Alert(AlertParams { message: "ping".to_string() });
        let out = execute(&params, &reqwest::Client::new()).await.unwrap();
        assert_eq!(out, "ping");
    }

    #[tokio::test]
    async fn invalid_method_rejected() {
        let params = JobParams::HttpQuery(HttpParams {
            method: "GE T".to_string(),
            url: "http://example.com".to_string(),
            headers: Default::default(),
            body: None,
            timeout_ms: None,
        });
        let err = execute(&params, &reqwest::Client::new()).await.unwrap_err();
        assert!(matches!(err, ExecError::BadMethod(_)));
    }

    #[tokio::test]
    async fn refused_connection_classified_as_connect() {
        let params = JobParams::HttpQuery(HttpParams {
            method: "GET".to_string(),
            // Reserved port, nothing listens here.
            url: "http://127.0.0.1:1/".to_string(),
            headers: Default::default(),
            body: None,
            timeout_ms: Some(2_000),
        });
        let err = execute(&params, &reqwest::Client::new()).await.unwrap_err();
        assert!(matches!(err, ExecError::Connect { .. } | ExecError::Timeout { .. }));
    }

    #[tokio::test]
    async fn database_without_credentials_fails_fast() {
        std::env::remove_var("MYSQL_HOST");
        std::env::remove_var("MYSQL_DB");
        std::env::remove_var("MYSQL_USER");
        std::env::remove_var("MYSQL_PASSWORD");
        let params = JobParams::DatabaseQuery(DbParams { query: "select 1".to_string() });
        let err = execute(&params, &reqwest::Client::new()).await.unwrap_err();
        assert!(matches!(err, ExecError::CredentialsMissing("MYSQL_HOST")));
    }
}

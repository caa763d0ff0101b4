use std::env;

/// Slack API credentials read from the process environment.
#[derive(Debug, Clone, Default)]
pub struct SlackCreds {
    /// Bot token (`SLACK_BOT_TOKEN`).
    pub bot_token: Option<String>,
}

/// Audit database credentials read from the process environment.
///
/// Missing values are carried as `None` and surface as handler-level
/// failures when a database job fires, never as startup failures.
#[derive(Debug, Clone, Default)]
pub struct DbCreds {
    /// Database host (`MYSQL_HOST`).
    pub host: Option<String>,
    /// Database name (`MYSQL_DB`).
    pub database: Option<String>,
    /// Username (`MYSQL_USER`).
    pub user: Option<String>,
    /// Password (`MYSQL_PASSWORD`).
    pub password: Option<String>,
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

/// Slack credentials from the environment.
pub fn slack() -> SlackCreds {
    SlackCreds { bot_token: var("SLACK_BOT_TOKEN") }
}

/// Audit database credentials from the environment.
pub fn database() -> DbCreds {
    DbCreds {
        host: var("MYSQL_HOST"),
        database: var("MYSQL_DB"),
        user: var("MYSQL_USER"),
        password: var("MYSQL_PASSWORD"),
    }
}

/// Deployment environment tag (`AUDIT_ENVIRONMENT`), if set.
pub fn environment() -> Option<String> {
    var("AUDIT_ENVIRONMENT")
}

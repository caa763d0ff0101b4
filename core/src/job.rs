use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::warn;

use crate::cfg::Section;
use crate::error::ValidationError;
use crate::timespec::TimeSpec;

/// A validated, immutable description of one recurring job.
///
/// Built once from a config section at startup; a replacement set requires
/// a restart.
#[derive(Debug, Clone)]
pub struct JobDefinition {
    /// Unique identifier (the config section key).
    pub name: String,
    /// Opaque label carried through to notifications.
    pub severity: String,
    /// Typed action parameters, shape-checked at load.
    pub params: JobParams,
    /// Where results are delivered.
    pub target: NotifyTarget,
    /// When and how often the job fires.
    pub recurrence: TimeSpec,
}

/// Notification destination: delivery medium plus channel name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyTarget {
    /// Delivery medium (currently only `slack` is wired up).
    pub medium: String,
    /// Channel identifier, stripped of surrounding quotes.
    pub channel: String,
}

/// Typed parameters for the three supported job types.
///
/// A closed enum instead of a string-keyed handler map: unknown tags are
/// rejected while loading and dispatch in the runner is an exhaustive match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobParams {
    /// Issue an HTTP request and report the response body.
    HttpQuery(HttpParams),
    /// Run a SQL query and report the rows.
    DatabaseQuery(DbParams),
    /// Deliver a fixed message.
    Alert(AlertParams),
}

/// Parameters for an HTTP query job.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpParams {
    /// HTTP method, e.g. `GET`.
    pub method: String,
    /// Target URL.
    pub url: String,
    /// Extra request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Optional request body.
    #[serde(default)]
    pub body: Option<String>,
    /// Optional per-request timeout (ms).
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Parameters for a database query job.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DbParams {
    /// SQL text to execute.
    pub query: String,
}

/// Parameters for an alert job.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlertParams {
    /// Message text to deliver.
    pub message: String,
}

impl JobParams {
    /// Human-readable tag for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            JobParams::HttpQuery(_) => "http_query",
            JobParams::DatabaseQuery(_) => "database_query",
            JobParams::Alert(_) => "alert",
        }
    }
}

impl JobDefinition {
    /// Validate one raw config section into a job definition.
    ///
    /// All failure modes are typed results so that a bad section never
    /// takes its siblings down with it.
    pub fn from_section(name: &str, section: &Section) -> Result<Self, ValidationError> {
        let kind = require(name, section, "type")?;
        let parameters = require(name, section, "parameters")?;
        let params = parse_params(name, kind, parameters)?;

        let severity = section.get("severity").cloned().unwrap_or_default();
        let medium = section.get("medium").cloned().unwrap_or_default();
        let channel = section
            .get("channel")
            .map(|c| c.trim_matches('"').to_string())
            .unwrap_or_default();

        Ok(Self {
            name: name.to_string(),
            severity,
            params,
            target: NotifyTarget { medium, channel },
            recurrence: TimeSpec::from_section(name, section)?,
        })
    }
}

/// Build the active job set from all config sections.
///
/// Invalid sections are logged and skipped; the rest load normally.
pub fn load_all(sections: &BTreeMap<String, Section>) -> Vec<JobDefinition> {
    let mut jobs = Vec::with_capacity(sections.len());
    for (name, section) in sections {
        match JobDefinition::from_section(name, section) {
            Ok(job) => jobs.push(job),
            Err(e) => warn!("rule rejected: {e}"),
        }
    }
    jobs
}

fn require<'a>(
    rule: &str,
    section: &'a Section,
    key: &'static str,
) -> Result<&'a str, ValidationError> {
    section
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ValidationError::MissingKey { rule: rule.to_string(), key })
}

fn parse_params(rule: &str, kind: &str, parameters: &str) -> Result<JobParams, ValidationError> {
    // Tags match case-insensitively with underscores ignored, so
    // "DatabaseQuery", "database_query" and "databasequery" all resolve.
    let folded: String =
        kind.chars().filter(|c| *c != '_').map(|c| c.to_ascii_lowercase()).collect();

    let invalid = |e: serde_json::Error| ValidationError::ParametersInvalid {
        rule: rule.to_string(),
        detail: e.to_string(),
    };

    match folded.as_str() {
        "httpquery" => Ok(JobParams::HttpQuery(serde_json::from_str(parameters).map_err(invalid)?)),
        "databasequery" => {
            Ok(JobParams::DatabaseQuery(serde_json::from_str(parameters).map_err(invalid)?))
        }
        "alert" => Ok(JobParams::Alert(serde_json::from_str(parameters).map_err(invalid)?)),
        _ => Err(ValidationError::UnknownType {
            rule: rule.to_string(),
            found: kind.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(pairs: &[(&str, &str)]) -> Section {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn alert_section(message: &str) -> Section {
        section(&[
            ("type", "alert"),
            ("severity", "low"),
            ("parameters", &format!(r#"{{"message":"{message}"}}"#)),
            ("medium", "slack"),
            ("channel", "\"#ops\""),
            ("seconds", "5"),
        ])
    }

    #[test]
    fn builds_alert_job() {
        let job = JobDefinition::from_section("ping", &alert_section("hello")).unwrap();
        assert_eq!(job.name, "ping");
        assert_eq!(job.severity, "low");
        assert_eq!(job.target.medium, "slack");
        assert!(matches!(job.params, JobParams::Alert(ref p) if p.message == "hello"));
    }

    #[test]
    fn channel_quotes_stripped() {
        let job = JobDefinition::from_section("ping", &alert_section("x")).unwrap();
        assert_eq!(job.target.channel, "#ops");
    }

    #[test]
    fn type_tag_case_and_underscore_insensitive() {
        for tag in ["DatabaseQuery", "database_query", "databasequery"] {
            let mut s = alert_section("x");
            s.insert("type".into(), tag.into());
            s.insert("parameters".into(), r#"{"query":"select 1"}"#.into());
            let job = JobDefinition::from_section("db", &s).unwrap();
            assert_eq!(job.params.kind(), "database_query");
        }
    }

    #[test]
    fn unknown_type_rejected() {
        let mut s = alert_section("x");
        s.insert("type".into(), "jira".into());
        let err = JobDefinition::from_section("j", &s).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownType { .. }));
    }

    #[test]
    fn malformed_parameters_rejected() {
        let mut s = alert_section("x");
        s.insert("parameters".into(), "{not json".into());
        let err = JobDefinition::from_section("j", &s).unwrap_err();
        assert!(matches!(err, ValidationError::ParametersInvalid { .. }));
    }

    #[test]
    fn wrong_shape_rejected() {
        // Valid JSON, but an alert needs a "message" field.
        let mut s = alert_section("x");
        s.insert("parameters".into(), r#"{"query":"select 1"}"#.into());
        let err = JobDefinition::from_section("j", &s).unwrap_err();
        assert!(matches!(err, ValidationError::ParametersInvalid { .. }));
    }

    #[test]
    fn http_params_full_shape() {
        let mut s = alert_section("x");
        s.insert("type".into(), "http_query".into());
        s.insert(
            "parameters".into(),
            r#"{"method":"POST","url":"https://example.com","headers":{"x-a":"1"},"body":"hi","timeout_ms":500}"#
                .into(),
        );
        let job = JobDefinition::from_section("h", &s).unwrap();
        let JobParams::HttpQuery(p) = job.params else { panic!("expected http params") };
        assert_eq!(p.method, "POST");
        assert_eq!(p.headers.get("x-a").map(String::as_str), Some("1"));
        assert_eq!(p.timeout_ms, Some(500));
    }

    #[test]
    fn bad_section_does_not_block_siblings() {
        let mut sections = BTreeMap::new();
        sections.insert("good".to_string(), alert_section("ok"));
        let mut bad = alert_section("x");
        bad.insert("parameters".into(), "][".into());
        sections.insert("bad".to_string(), bad);
        let mut unknown = alert_section("x");
        unknown.insert("type".into(), "pager".into());
        sections.insert("unknown".to_string(), unknown);
        let mut oversized = alert_section("x");
        oversized.insert("seconds".into(), i64::MAX.to_string());
        sections.insert("oversized".to_string(), oversized);

        let jobs = load_all(&sections);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].name, "good");
    }
}

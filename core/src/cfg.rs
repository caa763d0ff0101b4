use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Raw key/value pairs of one job section, all string-typed.
pub type Section = BTreeMap<String, String>;

/// Load the job configuration file: one TOML table per job, values coerced
/// to strings before validation.
///
/// A missing or unreadable file is an error; the caller treats it as fatal
/// since the process has nothing to schedule without configuration.
pub fn load(path: &Path) -> Result<BTreeMap<String, Section>> {
    let txt = fs::read_to_string(path)
        .with_context(|| format!("read config file {}", path.display()))?;
    parse(&txt).with_context(|| format!("parse config file {}", path.display()))
}

fn parse(txt: &str) -> Result<BTreeMap<String, Section>> {
    let doc: toml::Table = toml::from_str(txt)?;

    let mut sections = BTreeMap::new();
    for (name, value) in doc {
        // A malformed section is excluded, never fatal for its siblings.
        let toml::Value::Table(table) = value else {
            warn!("config entry {name:?} is not a table, skipped");
            continue;
        };
        let mut section = Section::new();
        let mut skipped = false;
        for (key, value) in table {
            match coerce(value) {
                Ok(v) => {
                    section.insert(key, v);
                }
                Err(e) => {
                    warn!("config section {name:?} skipped: key {key:?}: {e}");
                    skipped = true;
                    break;
                }
            }
        }
        if !skipped {
            sections.insert(name, section);
        }
    }
    Ok(sections)
}

// Integers are accepted unquoted for convenience; everything is handed to
// validation as a string.
fn coerce(value: toml::Value) -> Result<String> {
    match value {
        toml::Value::String(s) => Ok(s),
        toml::Value::Integer(n) => Ok(n.to_string()),
        other => bail!("unsupported value type: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // The body contains `"#` (quoted channel names), so the raw string
    // needs the wider `r##` delimiter.
    const SAMPLE: &str = r##"
[heartbeat]
type = "alert"
severity = "low"
parameters = '{"message":"ping"}'
medium = "slack"
channel = "#ops"
seconds = 5

[audit-sweep]
type = "database_query"
severity = "high"
parameters = '{"query":"select count(*) from logins"}'
medium = "slack"
channel = "#audit"
hours = "1"
jitter = 30
"##;

    #[test]
    fn parses_sections_as_string_maps() {
        let sections = parse(SAMPLE).unwrap();
        assert_eq!(sections.len(), 2);

        let hb = &sections["heartbeat"];
        assert_eq!(hb["type"], "alert");
        // Unquoted integers arrive as strings.
        assert_eq!(hb["seconds"], "5");

        let audit = &sections["audit-sweep"];
        assert_eq!(audit["hours"], "1");
        assert_eq!(audit["jitter"], "30");
    }

    #[test]
    fn non_table_entry_skipped() {
        let txt = "top = 1\n\n[ok]\ntype = \"alert\"\n";
        let sections = parse(txt).unwrap();
        assert_eq!(sections.len(), 1);
        assert!(sections.contains_key("ok"));
    }

    #[test]
    fn unsupported_value_excludes_only_its_section() {
        let txt = r##"
[broken]
type = "alert"
jitter = 30.0

[ok]
type = "alert"
channel = "#ops"
"##;
        let sections = parse(txt).unwrap();
        assert_eq!(sections.len(), 1);
        assert!(sections.contains_key("ok"));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load(Path::new("/nonexistent/mayday.toml")).is_err());
    }

    #[test]
    fn loads_from_disk() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(SAMPLE.as_bytes()).unwrap();
        let sections = load(f.path()).unwrap();
        assert!(sections.contains_key("heartbeat"));
    }
}

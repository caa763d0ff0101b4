use chrono::{DateTime, Duration, FixedOffset, Utc};

use crate::cfg::Section;
use crate::error::ValidationError;

/// Date pattern used by `startdate`/`enddate`, e.g. `Oct 10 2020 23:23:23 +1000`.
pub const DATE_FORMAT: &str = "%b %d %Y %H:%M:%S %z";

// Upper bound for every interval/jitter component. One million weeks is
// roughly 19,000 years, so `now + interval` stays inside chrono's datetime
// range and the arithmetic can never wrap negative or panic.
const MAX_COMPONENT: u64 = 1_000_000;

/// Declarative recurrence: interval components, an optional firing window
/// and an optional jitter tolerance.
///
/// Validated once at construction; [`TimeSpec::next_fire_after`] can then
/// never fail, only expire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSpec {
    weeks: u64,
    days: u64,
    hours: u64,
    minutes: u64,
    seconds: u64,
    start: Option<DateTime<FixedOffset>>,
    end: Option<DateTime<FixedOffset>>,
    jitter: Option<u64>,
}

impl TimeSpec {
    /// Build a recurrence from the raw string section of one job.
    ///
    /// Missing keys and empty strings count as absent. Rejects a zero-length
    /// interval, an end bound preceding the start bound, and malformed
    /// numbers or dates.
    pub fn from_section(rule: &str, section: &Section) -> Result<Self, ValidationError> {
        let spec = Self {
            weeks: parse_component(rule, section, "weeks")?,
            days: parse_component(rule, section, "days")?,
            hours: parse_component(rule, section, "hours")?,
            minutes: parse_component(rule, section, "minutes")?,
            seconds: parse_component(rule, section, "seconds")?,
            start: parse_date(rule, section, "startdate")?,
            end: parse_date(rule, section, "enddate")?,
            jitter: parse_optional(rule, section, "jitter")?,
        };

        if spec.interval().is_zero() {
            return Err(ValidationError::ZeroInterval { rule: rule.to_string() });
        }
        if let (Some(start), Some(end)) = (spec.start, spec.end) {
            if end < start {
                return Err(ValidationError::EndBeforeStart { rule: rule.to_string() });
            }
        }
        Ok(spec)
    }

    /// Total interval between fires.
    pub fn interval(&self) -> Duration {
        Duration::weeks(self.weeks as i64)
            + Duration::days(self.days as i64)
            + Duration::hours(self.hours as i64)
            + Duration::minutes(self.minutes as i64)
            + Duration::seconds(self.seconds as i64)
    }

    /// Start of the firing window, if bounded.
    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.start.map(|d| d.with_timezone(&Utc))
    }

    /// End of the firing window, if bounded.
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end.map(|d| d.with_timezone(&Utc))
    }

    /// Jitter tolerance, if configured.
    pub fn jitter(&self) -> Option<Duration> {
        self.jitter.map(|s| Duration::seconds(s as i64))
    }

    /// Next fire instant strictly after `after`, or `None` once the
    /// recurrence has passed its end bound.
    ///
    /// The first fire is pinned to the start bound itself: a job never runs
    /// before its configured start, and never skips straight to
    /// `start + interval`.
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let candidate = after + self.interval();
        if let Some(start) = self.start() {
            if candidate < start {
                return Some(start);
            }
        }
        if let Some(end) = self.end() {
            if candidate > end {
                return None;
            }
        }
        Some(candidate)
    }
}

fn raw<'a>(section: &'a Section, key: &str) -> Option<&'a str> {
    section.get(key).map(String::as_str).filter(|v| !v.is_empty())
}

fn parse_component(rule: &str, section: &Section, key: &'static str) -> Result<u64, ValidationError> {
    Ok(parse_optional(rule, section, key)?.unwrap_or(0))
}

fn parse_optional(
    rule: &str,
    section: &Section,
    key: &'static str,
) -> Result<Option<u64>, ValidationError> {
    match raw(section, key) {
        None => Ok(None),
        Some(v) => match v.parse::<u64>() {
            Ok(n) if n <= MAX_COMPONENT => Ok(Some(n)),
            _ => Err(ValidationError::BadNumber {
                rule: rule.to_string(),
                key,
                found: v.to_string(),
            }),
        },
    }
}

fn parse_date(
    rule: &str,
    section: &Section,
    key: &'static str,
) -> Result<Option<DateTime<FixedOffset>>, ValidationError> {
    match raw(section, key) {
        None => Ok(None),
        Some(v) => DateTime::parse_from_str(v, DATE_FORMAT).map(Some).map_err(|_| {
            ValidationError::BadDate { rule: rule.to_string(), key, found: v.to_string() }
        }),
    }
}

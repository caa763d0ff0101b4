use thiserror::Error;

/// Load-time rejection of a single job definition.
///
/// Every variant names the offending job so the loader can report it and
/// carry on with the remaining sections.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The `type` key is not one of the recognized job types.
    #[error("rule {rule}: unknown job type {found:?}")]
    UnknownType {
        /// Job (section) name.
        rule: String,
        /// The unrecognized tag as written in the config.
        found: String,
    },

    /// The `parameters` value is not valid JSON, or does not match the
    /// shape required by the declared type.
    #[error("rule {rule}: invalid parameters: {detail}")]
    ParametersInvalid {
        /// Job (section) name.
        rule: String,
        /// Underlying parse/shape error.
        detail: String,
    },

    /// A required key is absent from the section.
    #[error("rule {rule}: missing key {key:?}")]
    MissingKey {
        /// Job (section) name.
        rule: String,
        /// The missing key.
        key: &'static str,
    },

    /// An interval or jitter component is not a non-negative integer.
    #[error("rule {rule}: key {key:?} is not a non-negative integer: {found:?}")]
    BadNumber {
        /// Job (section) name.
        rule: String,
        /// The offending key.
        key: &'static str,
        /// The raw value.
        found: String,
    },

    /// A date string does not match `%b %d %Y %H:%M:%S %z`.
    #[error("rule {rule}: key {key:?} is not a valid date: {found:?}")]
    BadDate {
        /// Job (section) name.
        rule: String,
        /// The offending key.
        key: &'static str,
        /// The raw value.
        found: String,
    },

    /// All interval components are zero.
    #[error("rule {rule}: recurrence interval is zero")]
    ZeroInterval {
        /// Job (section) name.
        rule: String,
    },

    /// `enddate` precedes `startdate`.
    #[error("rule {rule}: enddate precedes startdate")]
    EndBeforeStart {
        /// Job (section) name.
        rule: String,
    },
}

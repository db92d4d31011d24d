use crate::data::{Point, PointError};
use crate::matcher::Matcher;
use crate::template::{ApplyError, NameParts, DEFAULT_FIELD};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::num::ParseFloatError;
use thiserror::Error;

/// Earliest accepted timestamp, 1901-12-13T00:00:00Z, in Unix seconds.
pub const MIN_TIMESTAMP: i64 = -2_147_558_400;

/// Latest accepted timestamp, 2038-01-19T00:00:00Z, in Unix seconds.
pub const MAX_TIMESTAMP: i64 = 2_147_472_000;

/// Timestamp some producers send to mean "now".
const NOW_SENTINEL: f64 = -1.0;

const NANOS_PER_SECOND: f64 = 1_000_000_000.0;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("received `{0}` which doesn't have required fields")]
    MalformedLine(String),
    #[error(transparent)]
    Template(#[from] ApplyError),
    #[error("field `{name}` value: {source}")]
    InvalidValue {
        name: String,
        #[source]
        source: ParseFloatError,
    },
    #[error("field `{name}` value: `{value}` is out of range")]
    ValueOutOfRange { name: String, value: String },
    #[error("field `{name}` value: {value} is unsupported")]
    UnsupportedValue { name: String, value: f64 },
    #[error("field `{name}` time: {source}")]
    InvalidTimestamp {
        name: String,
        #[source]
        source: ParseFloatError,
    },
    #[error("field `{name}` time: timestamp {timestamp} out of range")]
    TimestampOutOfRange { name: String, timestamp: f64 },
    #[error(transparent)]
    Point(#[from] PointError),
}

/// Turns graphite plaintext lines into points.
///
/// The matcher and default tags are fixed at construction, so a parser can be shared across
/// threads and used concurrently.
#[derive(Debug, Clone, Default)]
pub struct Parser {
    matcher: Matcher,
    default_tags: IndexMap<String, String>,
}

impl Parser {
    pub fn new(matcher: Matcher, default_tags: IndexMap<String, String>) -> Self {
        Self {
            matcher,
            default_tags,
        }
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn default_tags(&self) -> &IndexMap<String, String> {
        &self.default_tags
    }

    /// Parses `<name> <value> [<timestamp>]`.
    pub fn parse(&self, line: &str) -> Result<Point, ParseError> {
        let fields = line.split_whitespace().collect::<Vec<_>>();
        let (name, value, timestamp) = match fields.as_slice() {
            [name, value] => (*name, *value, None),
            [name, value, timestamp] => (*name, *value, Some(*timestamp)),
            _ => return Err(ParseError::MalformedLine(line.to_string())),
        };

        let NameParts {
            mut measurement,
            mut tags,
            field,
        } = self.matcher.lookup(name).apply(name)?;

        // could not extract a measurement, use the raw name
        if measurement.is_empty() {
            measurement = name.to_string();
        }

        let raw_value = value;
        let value = raw_value
            .parse::<f64>()
            .map_err(|source| ParseError::InvalidValue {
                name: name.to_string(),
                source,
            })?;
        if !value.is_finite() {
            if !is_non_finite_literal(raw_value) {
                return Err(ParseError::ValueOutOfRange {
                    name: name.to_string(),
                    value: raw_value.to_string(),
                });
            }
            return Err(ParseError::UnsupportedValue {
                name: name.to_string(),
                value,
            });
        }

        let field = if field.is_empty() {
            DEFAULT_FIELD.to_string()
        } else {
            field
        };
        let fields = HashMap::from([(field, value)]);

        let timestamp = match timestamp {
            Some(raw) => parse_timestamp(name, raw)?,
            None => Utc::now(),
        };

        self.merge_default_tags(&mut tags);
        Ok(Point::new(measurement, tags, fields, timestamp)?)
    }

    /// Decomposes the name of `line` without parsing its value or timestamp. The parser's
    /// default tags are merged in; the measurement is left empty if the template did not produce
    /// one.
    pub fn apply_template(&self, line: &str) -> Result<NameParts, ParseError> {
        let Some(name) = line.split_whitespace().next() else {
            return Ok(NameParts::default());
        };
        let mut parts = self.matcher.lookup(name).apply(name)?;
        self.merge_default_tags(&mut parts.tags);
        Ok(parts)
    }

    fn merge_default_tags(&self, tags: &mut HashMap<String, String>) {
        for (key, value) in &self.default_tags {
            if !tags.contains_key(key) {
                tags.insert(key.to_owned(), value.to_owned());
            }
        }
    }
}

/// Whether `raw` spells out NaN or infinity, as opposed to a literal too large for an `f64`.
fn is_non_finite_literal(raw: &str) -> bool {
    let unsigned = raw
        .trim_start_matches(|c| c == '+' || c == '-')
        .to_ascii_lowercase();
    matches!(unsigned.as_str(), "nan" | "inf" | "infinity")
}

fn parse_timestamp(name: &str, raw: &str) -> Result<DateTime<Utc>, ParseError> {
    let unix = raw
        .parse::<f64>()
        .map_err(|source| ParseError::InvalidTimestamp {
            name: name.to_string(),
            source,
        })?;
    if unix == NOW_SENTINEL {
        return Ok(Utc::now());
    }

    let out_of_range = || ParseError::TimestampOutOfRange {
        name: name.to_string(),
        timestamp: unix,
    };
    if !unix.is_finite() {
        return Err(out_of_range());
    }

    let seconds = unix.floor();
    let nanos = (((unix - seconds) * NANOS_PER_SECOND) as u32).min(999_999_999);
    if seconds < MIN_TIMESTAMP as f64 || (seconds, nanos) > (MAX_TIMESTAMP as f64, 0) {
        return Err(out_of_range());
    }
    DateTime::from_timestamp(seconds as i64, nanos).ok_or_else(out_of_range)
}

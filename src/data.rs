use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Longest series key (`measurement,tag=value,...`) a point may carry.
pub const MAX_KEY_LENGTH: usize = 65535;

const RESERVED_KEY: &str = "time";

#[derive(Debug, Error)]
pub enum PointError {
    #[error("missing measurement")]
    EmptyMeasurement,
    #[error("point without fields is unsupported")]
    NoFields,
    #[error("{value} is unsupported value for field `{key}`")]
    UnsupportedFieldValue { key: String, value: f64 },
    #[error("invalid field key `{0}`")]
    InvalidFieldKey(String),
    #[error("invalid tag key `{0}`")]
    InvalidTagKey(String),
    #[error("max key length exceeded: {0} > {MAX_KEY_LENGTH}")]
    KeyTooLong(usize),
}

/// A decoded metric: measurement, tags, fields and a UTC timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    pub measurement: String,
    pub tags: HashMap<String, String>,
    pub fields: HashMap<String, f64>,
    pub timestamp: DateTime<Utc>,
}

impl Point {
    pub fn new(
        measurement: String,
        mut tags: HashMap<String, String>,
        fields: HashMap<String, f64>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, PointError> {
        if measurement.is_empty() {
            return Err(PointError::EmptyMeasurement);
        }
        if fields.is_empty() {
            return Err(PointError::NoFields);
        }
        for (key, value) in &fields {
            if key.is_empty() || key == RESERVED_KEY {
                return Err(PointError::InvalidFieldKey(key.to_owned()));
            }
            if !value.is_finite() {
                return Err(PointError::UnsupportedFieldValue {
                    key: key.to_owned(),
                    value: *value,
                });
            }
        }
        if let Some(key) = tags
            .keys()
            .find(|k| k.is_empty() || k.as_str() == RESERVED_KEY)
        {
            return Err(PointError::InvalidTagKey(key.to_owned()));
        }
        // a tag without a value has no line protocol form
        tags.retain(|_, v| !v.is_empty());

        let point = Self {
            measurement,
            tags,
            fields,
            timestamp,
        };
        let key_length = point.series_key().len();
        if key_length > MAX_KEY_LENGTH {
            return Err(PointError::KeyTooLong(key_length));
        }
        Ok(point)
    }

    /// The value of the single field a graphite line produces.
    pub fn value(&self) -> Option<f64> {
        self.fields.values().next().copied()
    }

    /// Escaped measurement followed by the sorted, escaped tags.
    pub fn series_key(&self) -> String {
        let mut key = escape_measurement(&self.measurement);
        for (k, v) in self.tags.iter().sorted_by_key(|(k, _)| *k) {
            key.push_str(&format!(",{}={}", escape_string(k), escape_string(v)));
        }
        key
    }
}

impl Display for Point {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let fields = self
            .fields
            .iter()
            .sorted_by_key(|(k, _)| *k)
            .map(|(k, v)| format!("{}={}", escape_string(k), v))
            .join(",");

        let mut s = self.series_key();
        s.push_str(&format!(" {fields}"));
        if let Some(nanos) = self.timestamp.timestamp_nanos_opt() {
            s.push_str(&format!(" {nanos}"));
        }

        f.write_str(&s)
    }
}

fn escape_measurement(s: &str) -> String {
    s.replace(' ', r#"\ "#).replace(',', r#"\,"#)
}

fn escape_string(s: &str) -> String {
    s.replace(' ', r#"\ "#)
        .replace(',', r#"\,"#)
        .replace('=', r#"\="#)
}

#[cfg(test)]
mod tests {
    use crate::data::{Point, PointError};
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::HashMap;

    fn fields(key: &str, value: f64) -> HashMap<String, f64> {
        vec![(key.to_string(), value)].into_iter().collect()
    }

    #[test]
    fn format() {
        let point = Point::new(
            "test =metric".to_string(),
            vec![
                ("tag Key1".to_string(), "tag Value1".to_string()),
                ("key".to_string(), "value".to_string()),
            ]
            .into_iter()
            .collect(),
            fields("value", 1.11),
            Utc.with_ymd_and_hms(2020, 1, 1, 1, 1, 1).unwrap(),
        )
        .unwrap();

        assert_eq!(
            point.to_string(),
            r#"test\ =metric,key=value,tag\ Key1=tag\ Value1 value=1.11 1577840461000000000"#
        );
        assert_eq!(point.value(), Some(1.11));
    }

    #[test]
    fn empty_tag_values_are_dropped() {
        let point = Point::new(
            "cpu".to_string(),
            vec![
                ("host".to_string(), String::new()),
                ("dc".to_string(), "east".to_string()),
            ]
            .into_iter()
            .collect(),
            fields("value", 1.0),
            DateTime::from_timestamp(1, 0).unwrap(),
        )
        .unwrap();

        assert!(!point.tags.contains_key("host"));
        assert_eq!(point.series_key(), "cpu,dc=east");
        assert_eq!(point.to_string(), "cpu,dc=east value=1 1000000000");
    }

    #[test]
    fn validation() {
        let at = DateTime::from_timestamp(0, 0).unwrap();
        assert!(matches!(
            Point::new(String::new(), HashMap::new(), fields("value", 1.0), at),
            Err(PointError::EmptyMeasurement)
        ));
        assert!(matches!(
            Point::new("cpu".to_string(), HashMap::new(), HashMap::new(), at),
            Err(PointError::NoFields)
        ));
        assert!(matches!(
            Point::new("cpu".to_string(), HashMap::new(), fields("time", 1.0), at),
            Err(PointError::InvalidFieldKey(k)) if k == "time"
        ));
        assert!(matches!(
            Point::new("cpu".to_string(), HashMap::new(), fields("value", f64::NAN), at),
            Err(PointError::UnsupportedFieldValue { .. })
        ));
        assert!(matches!(
            Point::new(
                "cpu".to_string(),
                vec![(String::new(), "x".to_string())].into_iter().collect(),
                fields("value", 1.0),
                at
            ),
            Err(PointError::InvalidTagKey(_))
        ));
        assert!(matches!(
            Point::new("c".repeat(70_000), HashMap::new(), fields("value", 1.0), at),
            Err(PointError::KeyTooLong(70_000))
        ));
    }
}

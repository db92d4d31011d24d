use indexmap::IndexMap;
use regex::Regex;
use std::collections::HashMap;
use thiserror::Error;

/// Separator used to join multi-token measurements, fields and tag values when none is
/// configured.
pub const DEFAULT_SEPARATOR: &str = ".";

/// Field key used when a template does not name one.
pub const DEFAULT_FIELD: &str = "value";

/// Raised while compiling a template, before any line is parsed.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("no measurement specified for template `{0}`")]
    NoMeasurement(String),
    #[error("either 'field*' or 'measurement*' can be used in each template (but not both together): `{0}`")]
    ConflictingWildcards(String),
    #[error("invalid regular expression: {0}")]
    InvalidRegex(#[from] regex::Error),
    #[error("measurement must be included as a named capture group: /{0}/")]
    MissingMeasurementGroup(String),
}

/// Raised while applying a template to a metric name.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("'field' can only be used once in each template: `{0}`")]
    DuplicateField(String),
    #[error("unable to match `{name}` to regular expression /{pattern}/")]
    NoMatch { name: String, pattern: String },
}

/// The pieces a template extracts from a dotted metric name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameParts {
    pub measurement: String,
    pub tags: HashMap<String, String>,
    pub field: String,
}

/// Decomposes a metric name into measurement, tags and field.
#[derive(Debug, Clone)]
pub enum Template {
    Positional(PositionalTemplate),
    Regex(RegexTemplate),
}

impl Template {
    pub fn apply(&self, name: &str) -> Result<NameParts, ApplyError> {
        match self {
            Self::Positional(template) => template.apply(name),
            Self::Regex(template) => template.apply(name),
        }
    }

    /// The pattern this template was compiled from.
    pub fn pattern(&self) -> &str {
        match self {
            Self::Positional(template) => &template.pattern,
            Self::Regex(template) => template.re.as_str(),
        }
    }
}

impl From<PositionalTemplate> for Template {
    fn from(value: PositionalTemplate) -> Self {
        Self::Positional(value)
    }
}

impl From<RegexTemplate> for Template {
    fn from(value: RegexTemplate) -> Self {
        Self::Regex(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Role {
    Measurement,
    MeasurementWildcard,
    Field,
    FieldWildcard,
    Tag(String),
    Skip,
}

impl From<&str> for Role {
    fn from(token: &str) -> Self {
        match token {
            "measurement" => Self::Measurement,
            "measurement*" => Self::MeasurementWildcard,
            "field" => Self::Field,
            "field*" => Self::FieldWildcard,
            "" => Self::Skip,
            tag => Self::Tag(tag.to_string()),
        }
    }
}

/// Maps each dot-delimited token of a name to the role found at the same position of a pattern
/// such as `region.host.measurement*`.
#[derive(Debug, Clone)]
pub struct PositionalTemplate {
    pattern: String,
    roles: Vec<Role>,
    default_tags: IndexMap<String, String>,
    separator: String,
}

impl PositionalTemplate {
    pub fn new<S: Into<String>>(
        pattern: &str,
        default_tags: IndexMap<String, String>,
        separator: S,
    ) -> Result<Self, TemplateError> {
        let roles = pattern.split('.').map(Role::from).collect::<Vec<_>>();

        let has_measurement = roles
            .iter()
            .any(|r| matches!(r, Role::Measurement | Role::MeasurementWildcard));
        if !has_measurement {
            return Err(TemplateError::NoMeasurement(pattern.to_string()));
        }
        if roles.contains(&Role::MeasurementWildcard) && roles.contains(&Role::FieldWildcard) {
            return Err(TemplateError::ConflictingWildcards(pattern.to_string()));
        }

        Ok(Self {
            pattern: pattern.to_string(),
            roles,
            default_tags,
            separator: separator.into(),
        })
    }

    /// `measurement*` with no tags: the whole name becomes the measurement.
    pub fn greedy_measurement() -> Self {
        Self {
            pattern: "measurement*".to_string(),
            roles: vec![Role::MeasurementWildcard],
            default_tags: IndexMap::new(),
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }

    pub fn apply(&self, name: &str) -> Result<NameParts, ApplyError> {
        let tokens = name.split('.').collect::<Vec<_>>();
        let mut measurement: Vec<&str> = Vec::new();
        let mut field = String::new();
        let mut tags: IndexMap<&str, Vec<&str>> = IndexMap::new();

        for (key, value) in &self.default_tags {
            tags.entry(key.as_str()).or_default().push(value.as_str());
        }

        // Roles past the end of the name are not applied; tokens past the end of the pattern are
        // dropped unless a wildcard role consumed them.
        for (i, (role, token)) in self.roles.iter().zip(tokens.iter().copied()).enumerate() {
            match role {
                Role::Measurement => measurement.push(token),
                Role::MeasurementWildcard => {
                    measurement.extend(&tokens[i..]);
                    break;
                }
                Role::Field => {
                    if !field.is_empty() {
                        return Err(ApplyError::DuplicateField(name.to_string()));
                    }
                    field = token.to_string();
                }
                Role::FieldWildcard => {
                    field = tokens[i..].join(&self.separator);
                    break;
                }
                Role::Tag(key) => tags.entry(key.as_str()).or_default().push(token),
                Role::Skip => {}
            }
        }

        Ok(NameParts {
            measurement: measurement.join(&self.separator),
            tags: tags
                .into_iter()
                .map(|(k, values)| (k.to_string(), values.join(&self.separator)))
                .collect(),
            field,
        })
    }
}

/// Extracts measurement, field and tags from the named capture groups of a regular expression.
#[derive(Debug, Clone)]
pub struct RegexTemplate {
    re: Regex,
}

impl RegexTemplate {
    pub fn new(pattern: &str) -> Result<Self, TemplateError> {
        let re = Regex::new(pattern)?;
        if !re.capture_names().flatten().any(|n| n == "measurement") {
            return Err(TemplateError::MissingMeasurementGroup(pattern.to_string()));
        }
        Ok(Self { re })
    }

    pub fn apply(&self, name: &str) -> Result<NameParts, ApplyError> {
        let captures = self.re.captures(name).ok_or_else(|| ApplyError::NoMatch {
            name: name.to_string(),
            pattern: self.re.as_str().to_string(),
        })?;

        let mut parts = NameParts::default();
        for (i, group) in self.re.capture_names().enumerate() {
            let Some(group) = group else {
                continue;
            };
            // optional groups that did not participate capture the empty string
            let value = captures.get(i).map_or("", |m| m.as_str()).to_string();
            match group {
                "measurement" => parts.measurement = value,
                "field" => parts.field = value,
                tag => {
                    parts.tags.insert(tag.to_string(), value);
                }
            }
        }
        if parts.field.is_empty() {
            parts.field = DEFAULT_FIELD.to_string();
        }
        Ok(parts)
    }
}

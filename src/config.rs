use crate::template::DEFAULT_SEPARATOR;
use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("template must be non-empty")]
    EmptyTemplate,
    #[error("template contains too many parts: `{0}`")]
    TooManyParts(String),
    #[error("invalid default tag `{0}`, expected key=value")]
    InvalidTag(String),
}

/// Graphite input settings, deserializable from any serde format.
///
/// ```json
/// {
///   "separator": "_",
///   "tags": { "region": "us-west" },
///   "templates": ["servers.* .host.measurement* dc=east", "measurement.field"]
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct GraphiteConfig {
    #[serde(default = "default_separator")]
    pub separator: String,
    #[serde(default)]
    pub templates: Templates,
    #[serde(default)]
    pub tags: IndexMap<String, String>,
}

impl Default for GraphiteConfig {
    fn default() -> Self {
        Self {
            separator: default_separator(),
            templates: Templates::default(),
            tags: IndexMap::new(),
        }
    }
}

fn default_separator() -> String {
    DEFAULT_SEPARATOR.to_string()
}

/// The accepted shapes of a template list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Templates {
    /// `"[filter] <pattern> [k1=v1,k2=v2]"` per entry.
    Lines(Vec<String>),
    Entries(Vec<TemplateEntry>),
}

impl Default for Templates {
    fn default() -> Self {
        Self::Lines(Vec::new())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateFormat {
    #[default]
    Simple,
    Regexp,
}

/// A template declared as a map. The filter is not part of the template string here.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateEntry {
    #[serde(default)]
    pub filter: String,
    pub template: String,
    #[serde(default)]
    pub format: TemplateFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateKind {
    Positional {
        pattern: String,
        tags: IndexMap<String, String>,
    },
    Regex {
        pattern: String,
    },
}

/// A template bound to a filter, ready to be compiled. An empty filter declares the default
/// template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateDeclaration {
    pub filter: String,
    pub kind: TemplateKind,
}

impl TemplateDeclaration {
    pub fn positional<F: Into<String>, P: Into<String>>(filter: F, pattern: P) -> Self {
        Self {
            filter: filter.into(),
            kind: TemplateKind::Positional {
                pattern: pattern.into(),
                tags: IndexMap::new(),
            },
        }
    }

    pub fn regex<F: Into<String>, P: Into<String>>(filter: F, pattern: P) -> Self {
        Self {
            filter: filter.into(),
            kind: TemplateKind::Regex {
                pattern: pattern.into(),
            },
        }
    }

    /// Parses `"[filter] <pattern> [k1=v1,k2=v2]"`. Blank lines declare nothing, and a tag token
    /// without any `=` is ignored.
    pub fn parse_line(line: &str) -> Result<Option<Self>, ConfigError> {
        let parts = line.split_whitespace().collect::<Vec<_>>();
        let (filter, pattern, tags) = match parts.as_slice() {
            [] => return Ok(None),
            [pattern] => ("", *pattern, None),
            [pattern, tags] if tags.contains('=') => ("", *pattern, Some(*tags)),
            [filter, pattern] => (*filter, *pattern, None),
            [filter, pattern, tags] => (*filter, *pattern, Some(*tags)),
            _ => return Err(ConfigError::TooManyParts(line.to_string())),
        };
        Ok(Some(Self {
            filter: filter.to_string(),
            kind: TemplateKind::Positional {
                pattern: pattern.to_string(),
                tags: positional_tags(tags)?,
            },
        }))
    }

    /// Converts a map-shaped declaration. An empty template is an error; one made only of
    /// whitespace declares nothing.
    pub fn from_entry(entry: &TemplateEntry) -> Result<Option<Self>, ConfigError> {
        if entry.template.is_empty() {
            return Err(ConfigError::EmptyTemplate);
        }
        if entry.template.trim().is_empty() {
            return Ok(None);
        }
        let kind = match entry.format {
            TemplateFormat::Regexp => TemplateKind::Regex {
                pattern: entry.template.to_owned(),
            },
            TemplateFormat::Simple => {
                let parts = entry.template.split_whitespace().collect::<Vec<_>>();
                let (pattern, tags) = match parts.as_slice() {
                    [pattern] => (*pattern, None),
                    [pattern, tags] => (*pattern, Some(*tags)),
                    _ => return Err(ConfigError::TooManyParts(entry.template.to_owned())),
                };
                TemplateKind::Positional {
                    pattern: pattern.to_string(),
                    tags: positional_tags(tags)?,
                }
            }
        };
        Ok(Some(Self {
            filter: entry.filter.to_owned(),
            kind,
        }))
    }
}

impl Templates {
    /// Declarations in the order they were written.
    pub fn declarations(&self) -> Result<Vec<TemplateDeclaration>, ConfigError> {
        let mut declarations = Vec::new();
        match self {
            Self::Lines(lines) => {
                for line in lines {
                    match TemplateDeclaration::parse_line(line)? {
                        Some(declaration) => declarations.push(declaration),
                        None => debug!("skipping blank graphite template"),
                    }
                }
            }
            Self::Entries(entries) => {
                for entry in entries {
                    match TemplateDeclaration::from_entry(entry)? {
                        Some(declaration) => declarations.push(declaration),
                        None => debug!(filter = %entry.filter, "skipping blank graphite template"),
                    }
                }
            }
        }
        Ok(declarations)
    }
}

/// Default tags of a positional declaration. A token without any `=` is not a tag list.
fn positional_tags(tags: Option<&str>) -> Result<IndexMap<String, String>, ConfigError> {
    match tags {
        Some(tags) if tags.contains('=') => parse_tags(tags),
        _ => Ok(IndexMap::new()),
    }
}

/// Parses `k1=v1,k2=v2`.
fn parse_tags(s: &str) -> Result<IndexMap<String, String>, ConfigError> {
    s.split(',')
        .map(|kv| match kv.split_once('=') {
            Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
            _ => Err(ConfigError::InvalidTag(kv.to_string())),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn positional(filter: &str, pattern: &str, t: &[(&str, &str)]) -> TemplateDeclaration {
        TemplateDeclaration {
            filter: filter.to_string(),
            kind: TemplateKind::Positional {
                pattern: pattern.to_string(),
                tags: tags(t),
            },
        }
    }

    #[test]
    fn line_shapes() {
        assert_eq!(TemplateDeclaration::parse_line("  ").unwrap(), None);
        assert_eq!(
            TemplateDeclaration::parse_line("measurement.field").unwrap(),
            Some(positional("", "measurement.field", &[]))
        );
        assert_eq!(
            TemplateDeclaration::parse_line("measurement.field dc=east,env=prod").unwrap(),
            Some(positional(
                "",
                "measurement.field",
                &[("dc", "east"), ("env", "prod")]
            ))
        );
        assert_eq!(
            TemplateDeclaration::parse_line("servers.* .host.measurement*").unwrap(),
            Some(positional("servers.*", ".host.measurement*", &[]))
        );
        assert_eq!(
            TemplateDeclaration::parse_line("servers.* .host.measurement* dc=east").unwrap(),
            Some(positional("servers.*", ".host.measurement*", &[("dc", "east")]))
        );
    }

    #[test]
    fn line_errors() {
        assert_eq!(
            TemplateDeclaration::parse_line("a b c d"),
            Err(ConfigError::TooManyParts("a b c d".to_string()))
        );
        assert_eq!(
            TemplateDeclaration::parse_line("servers measurement dc=east,broken"),
            Err(ConfigError::InvalidTag("broken".to_string()))
        );
        assert_eq!(
            TemplateDeclaration::parse_line("measurement =east"),
            Err(ConfigError::InvalidTag("=east".to_string()))
        );
    }

    #[test]
    fn tag_token_without_equals_is_ignored() {
        assert_eq!(
            TemplateDeclaration::parse_line("servers measurement.host dc").unwrap(),
            Some(positional("servers", "measurement.host", &[]))
        );
        let entry = TemplateEntry {
            filter: "servers".to_string(),
            template: "measurement.host dc".to_string(),
            format: TemplateFormat::Simple,
        };
        assert_eq!(
            TemplateDeclaration::from_entry(&entry).unwrap(),
            Some(positional("servers", "measurement.host", &[]))
        );
    }

    #[test]
    fn entry_shapes() {
        let entries = vec![
            TemplateEntry {
                filter: "servers.*".to_string(),
                template: ".host.measurement dc=east".to_string(),
                format: TemplateFormat::Simple,
            },
            TemplateEntry {
                filter: String::new(),
                template: r"^(?P<measurement>\w+)".to_string(),
                format: TemplateFormat::Regexp,
            },
        ];
        assert_eq!(
            Templates::Entries(entries).declarations().unwrap(),
            vec![
                positional("servers.*", ".host.measurement", &[("dc", "east")]),
                TemplateDeclaration::regex("", r"^(?P<measurement>\w+)"),
            ]
        );
    }

    #[test]
    fn entry_errors() {
        let entry = |template: &str| TemplateEntry {
            filter: String::new(),
            template: template.to_string(),
            format: TemplateFormat::Simple,
        };
        assert_eq!(
            TemplateDeclaration::from_entry(&entry("")),
            Err(ConfigError::EmptyTemplate)
        );
        assert_eq!(
            TemplateDeclaration::from_entry(&entry("servers.* measurement dc=east")),
            Err(ConfigError::TooManyParts(
                "servers.* measurement dc=east".to_string()
            ))
        );
    }

    #[test]
    fn whitespace_entries_are_skipped() {
        let entries = vec![
            TemplateEntry {
                filter: "servers".to_string(),
                template: "   ".to_string(),
                format: TemplateFormat::Simple,
            },
            TemplateEntry {
                filter: String::new(),
                template: "measurement*".to_string(),
                format: TemplateFormat::Simple,
            },
        ];
        assert_eq!(
            Templates::Entries(entries).declarations().unwrap(),
            vec![positional("", "measurement*", &[])]
        );
    }

    #[test]
    fn blank_lines_are_skipped() {
        let templates = Templates::Lines(vec![
            "".to_string(),
            "measurement*".to_string(),
            "  ".to_string(),
        ]);
        assert_eq!(
            templates.declarations().unwrap(),
            vec![positional("", "measurement*", &[])]
        );
    }
}

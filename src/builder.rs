use crate::config::{ConfigError, GraphiteConfig, TemplateDeclaration, TemplateKind};
use crate::matcher::MatcherBuilder;
use crate::parser::Parser;
use crate::template::{
    PositionalTemplate, RegexTemplate, Template, TemplateError, DEFAULT_SEPARATOR,
};
use indexmap::IndexMap;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum BuildError {
    /// A declared template could not be compiled
    #[error("invalid template for filter `{filter}`: {source}")]
    Template {
        filter: String,
        #[source]
        source: TemplateError,
    },
    /// The configuration could not be turned into template declarations
    #[error("invalid graphite configuration: {0}")]
    Config(#[from] ConfigError),
}

pub struct ParserBuilder {
    pub(crate) separator: String,
    pub(crate) declarations: Vec<TemplateDeclaration>,
    pub(crate) default_tags: Option<IndexMap<String, String>>,
}

impl ParserBuilder {
    pub fn new() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR.to_string(),
            declarations: Vec::new(),
            default_tags: None,
        }
    }

    /// Tags added to every point that does not already carry them.
    pub fn add_default_tag<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        if let Some(tags) = &mut self.default_tags {
            tags.insert(key.into(), value.into());
        } else {
            self.default_tags = Some(vec![(key.into(), value.into())].into_iter().collect());
        }
        self
    }

    /// Separator used by positional templates to join multi-token values.
    pub fn with_separator<S: Into<String>>(mut self, separator: S) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn add_template<F: Into<String>, P: Into<String>>(self, filter: F, pattern: P) -> Self {
        self.add_declaration(TemplateDeclaration::positional(filter, pattern))
    }

    pub fn add_template_with_tags<F: Into<String>, P: Into<String>>(
        self,
        filter: F,
        pattern: P,
        tags: IndexMap<String, String>,
    ) -> Self {
        self.add_declaration(TemplateDeclaration {
            filter: filter.into(),
            kind: TemplateKind::Positional {
                pattern: pattern.into(),
                tags,
            },
        })
    }

    pub fn add_regex_template<F: Into<String>, P: Into<String>>(
        self,
        filter: F,
        pattern: P,
    ) -> Self {
        self.add_declaration(TemplateDeclaration::regex(filter, pattern))
    }

    pub fn add_declaration(mut self, declaration: TemplateDeclaration) -> Self {
        self.declarations.push(declaration);
        self
    }

    pub fn with_config(mut self, config: &GraphiteConfig) -> Result<Self, ConfigError> {
        self.separator = config.separator.to_owned();
        for (key, value) in &config.tags {
            self = self.add_default_tag(key, value);
        }
        self.declarations.extend(config.templates.declarations()?);
        Ok(self)
    }

    /// Compiles every declared template and freezes the filter tree. The first template that
    /// fails to compile aborts the build.
    pub fn build(self) -> Result<Parser, BuildError> {
        let mut matcher = MatcherBuilder::new();
        for declaration in &self.declarations {
            let template = compile(declaration, &self.separator).map_err(|source| {
                BuildError::Template {
                    filter: declaration.filter.to_owned(),
                    source,
                }
            })?;
            if declaration.filter.is_empty() {
                debug!(pattern = template.pattern(), "replacing default graphite template");
            }
            matcher.add(&declaration.filter, template);
        }
        debug!(
            templates = self.declarations.len(),
            separator = %self.separator,
            "built graphite parser"
        );
        Ok(Parser::new(
            matcher.build(),
            self.default_tags.unwrap_or_default(),
        ))
    }
}

impl Default for ParserBuilder {
    fn default() -> Self {
        ParserBuilder::new()
    }
}

fn compile(declaration: &TemplateDeclaration, separator: &str) -> Result<Template, TemplateError> {
    Ok(match &declaration.kind {
        TemplateKind::Positional { pattern, tags } => {
            PositionalTemplate::new(pattern, tags.to_owned(), separator)?.into()
        }
        TemplateKind::Regex { pattern } => RegexTemplate::new(pattern)?.into(),
    })
}

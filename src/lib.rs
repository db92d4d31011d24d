mod builder;
mod config;
mod data;
mod matcher;
mod parser;
mod template;

pub use builder::*;
pub use config::{
    ConfigError, GraphiteConfig, TemplateDeclaration, TemplateFormat, TemplateKind, TemplateEntry,
    Templates,
};
pub use data::{Point, PointError, MAX_KEY_LENGTH};
pub use matcher::{Matcher, MatcherBuilder};
pub use parser::{ParseError, Parser, MAX_TIMESTAMP, MIN_TIMESTAMP};
pub use template::{
    ApplyError, NameParts, PositionalTemplate, RegexTemplate, Template, TemplateError,
    DEFAULT_FIELD, DEFAULT_SEPARATOR,
};

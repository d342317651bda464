//! Optimizer rules and the per-target rule table.
//!
//! A rule pairs a media type with the binary to run, the argument template and
//! an optional output extension. The table is built once from configuration and
//! never changes afterwards; a media type with no rule is never optimized.

use crate::config::RuleConfig;
use crate::error::{OptimizeError, Result};
use crate::template::{CommandTemplate, PreparedCommand};
use crate::tool_resolver::ToolPathResolver;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Immutable optimizer configuration for one media type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizerRule {
    media_type: String,
    binary: PathBuf,
    template: CommandTemplate,
    output_extension: Option<String>,
}

impl OptimizerRule {
    /// Build a rule. `binary` must already be resolved to an executable.
    pub fn new(
        media_type: &str,
        binary: PathBuf,
        arguments: &str,
        output_extension: Option<&str>,
    ) -> Result<Self> {
        let output_extension = output_extension
            .map(|ext| ext.trim().trim_start_matches('.'))
            .filter(|ext| !ext.is_empty())
            .map(str::to_string);

        Ok(Self {
            media_type: normalize(media_type),
            binary,
            template: CommandTemplate::parse(arguments)?,
            output_extension,
        })
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn output_extension(&self) -> Option<&str> {
        self.output_extension.as_deref()
    }

    /// Render the command line for one invocation
    pub fn command(&self, original: &Path, optimized: &Path) -> PreparedCommand {
        self.template.render(&self.binary, original, optimized)
    }
}

/// Lookup table from media type to rule
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: HashMap<String, OptimizerRule>,
}

impl RuleTable {
    /// Build the table from the `mediaTypes` configuration map, failing on the
    /// first malformed entry. `null` entries are skipped.
    pub fn from_config(
        media_types: &BTreeMap<String, Option<RuleConfig>>,
        resolver: &ToolPathResolver,
    ) -> Result<Self> {
        let mut rules = HashMap::new();

        for (media_type, config) in media_types {
            let Some(config) = config else {
                continue;
            };

            let binary = resolver.resolve_tool(&config.binary_path).ok_or_else(|| {
                OptimizeError::MissingDependency(format!(
                    "optimizer binary \"{}\" for {} not found",
                    config.binary_path, media_type
                ))
            })?;

            let rule = OptimizerRule::new(
                media_type,
                binary,
                &config.arguments,
                config.outfile_extension.as_deref(),
            )
            .map_err(|e| match e {
                OptimizeError::Configuration(msg) => {
                    OptimizeError::Configuration(format!("rule for {}: {}", media_type, msg))
                }
                other => other,
            })?;

            if rules.contains_key(rule.media_type()) {
                return Err(OptimizeError::Configuration(format!(
                    "media type {} is configured more than once",
                    rule.media_type()
                )));
            }
            rules.insert(rule.media_type().to_string(), rule);
        }

        Ok(Self { rules })
    }

    /// Build a table from already constructed rules
    pub fn from_rules(rules: impl IntoIterator<Item = OptimizerRule>) -> Result<Self> {
        let mut table = HashMap::new();
        for rule in rules {
            let media_type = rule.media_type().to_string();
            if table.insert(media_type.clone(), rule).is_some() {
                return Err(OptimizeError::Configuration(format!(
                    "media type {} is configured more than once",
                    media_type
                )));
            }
        }
        Ok(Self { rules: table })
    }

    pub fn rule_for(&self, media_type: &str) -> Option<&OptimizerRule> {
        self.rules.get(&normalize(media_type))
    }

    pub fn should_optimize(&self, media_type: &str) -> bool {
        self.rule_for(media_type).is_some()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

// Parameters such as "; charset=binary" never select a different rule.
fn normalize(media_type: &str) -> String {
    media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

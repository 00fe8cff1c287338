//
// classify.rs
// CMR-Curate-rs
//
// Maps (image-type text, anatomy text) to canonical labels using a versioned rule table held as data.
//
// Thales Matheus Mendonça Santos - October 2026

use std::fs;
use std::path::Path;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::RuleError;

/// Label of an axis no rule matched.
pub const OTHER: &str = "Other";

const BUILTIN_RULES: &str = include_str!("../rules/cardiac_mri.json");

/// How an axis label was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisMatch {
    Exact,
    Pattern,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AxisLabel {
    pub label: String,
    pub matched: AxisMatch,
}

impl AxisLabel {
    fn other() -> Self {
        Self {
            label: OTHER.to_string(),
            matched: AxisMatch::Other,
        }
    }

    pub fn is_other(&self) -> bool {
        self.matched == AxisMatch::Other
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub image_type: AxisLabel,
    pub anatomy: AxisLabel,
}

impl Classification {
    /// `<ImageType>_<Anatomy>`, e.g. `CINE_LVSA` or `CINE_Other`.
    pub fn label(&self) -> String {
        format!("{}_{}", self.image_type.label, self.anatomy.label)
    }

    pub fn has_fallback(&self) -> bool {
        self.image_type.is_other() || self.anatomy.is_other()
    }
}

/// Serialized form of the rule table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleTable {
    pub version: u32,
    pub image_types: Vec<RuleSpec>,
    pub anatomies: Vec<RuleSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    pub label: String,
    /// Whole-value aliases, compared case-insensitively.
    #[serde(default)]
    pub exact: Vec<String>,
    /// Case-insensitive regex searched anywhere in the value.
    #[serde(default)]
    pub pattern: Option<String>,
    /// Suppresses `pattern` when it also matches.
    #[serde(default)]
    pub exclude: Option<String>,
}

#[derive(Debug)]
struct CompiledRule {
    label: String,
    exact: Vec<String>,
    pattern: Option<Regex>,
    exclude: Option<Regex>,
}

impl CompiledRule {
    fn compile(spec: RuleSpec) -> Result<Self, RuleError> {
        validate_label(&spec.label)?;
        let build = |source: &str| {
            RegexBuilder::new(source)
                .case_insensitive(true)
                .build()
                .map_err(|source| RuleError::Pattern {
                    label: spec.label.clone(),
                    source,
                })
        };
        let pattern = spec.pattern.as_deref().map(build).transpose()?;
        let exclude = spec.exclude.as_deref().map(build).transpose()?;

        let mut exact: Vec<String> = spec.exact.iter().map(|a| a.trim().to_lowercase()).collect();
        exact.push(spec.label.to_lowercase());

        Ok(Self {
            label: spec.label,
            exact,
            pattern,
            exclude,
        })
    }

    fn matches_exact(&self, normalized: &str) -> bool {
        self.exact.iter().any(|alias| alias == normalized)
    }

    fn matches_pattern(&self, value: &str) -> bool {
        match &self.pattern {
            Some(pattern) => {
                pattern.is_match(value)
                    && !self.exclude.as_ref().is_some_and(|ex| ex.is_match(value))
            }
            None => false,
        }
    }
}

fn validate_label(label: &str) -> Result<(), RuleError> {
    let invalid = |reason| RuleError::InvalidLabel {
        label: label.to_string(),
        reason,
    };
    if label.is_empty() {
        return Err(invalid("label is empty"));
    }
    if label.eq_ignore_ascii_case(OTHER) {
        return Err(invalid("`Other` is reserved for unmatched values"));
    }
    if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid("only ASCII letters, digits and `_` are allowed"));
    }
    Ok(())
}

#[derive(Debug)]
struct Axis {
    rules: Vec<CompiledRule>,
}

impl Axis {
    fn compile(specs: Vec<RuleSpec>) -> Result<Self, RuleError> {
        let rules = specs
            .into_iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    // Exact matches win over patterns; within each pass, table order decides.
    fn resolve(&self, value: &str) -> AxisLabel {
        let normalized = value.trim().to_lowercase();
        if normalized.is_empty() {
            return AxisLabel::other();
        }
        if let Some(rule) = self.rules.iter().find(|r| r.matches_exact(&normalized)) {
            return AxisLabel {
                label: rule.label.clone(),
                matched: AxisMatch::Exact,
            };
        }
        if let Some(rule) = self.rules.iter().find(|r| r.matches_pattern(value.trim())) {
            return AxisLabel {
                label: rule.label.clone(),
                matched: AxisMatch::Pattern,
            };
        }
        AxisLabel::other()
    }

    fn knows(&self, label: &str) -> bool {
        label == OTHER || self.rules.iter().any(|r| r.label == label)
    }
}

/// Pure classifier over a static rule table.
#[derive(Debug)]
pub struct Classifier {
    version: u32,
    image_types: Axis,
    anatomies: Axis,
}

impl Classifier {
    pub fn from_table(table: RuleTable) -> Result<Self, RuleError> {
        Ok(Self {
            version: table.version,
            image_types: Axis::compile(table.image_types)?,
            anatomies: Axis::compile(table.anatomies)?,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, RuleError> {
        Self::from_table(serde_json::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, RuleError> {
        let text = fs::read_to_string(path).map_err(|source| RuleError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// The cardiac MRI table shipped with the crate.
    pub fn builtin() -> Result<Self, RuleError> {
        Self::from_json(BUILTIN_RULES)
    }

    pub fn load(path: Option<&Path>) -> Result<Self, RuleError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::builtin(),
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Both axes resolve independently; an unmatched axis is `Other`, never an error.
    pub fn classify(&self, image_type: &str, anatomy: &str) -> Classification {
        Classification {
            image_type: self.image_types.resolve(image_type),
            anatomy: self.anatomies.resolve(anatomy),
        }
    }

    pub fn is_image_type_label(&self, label: &str) -> bool {
        self.image_types.knows(label)
    }

    pub fn is_anatomy_label(&self, label: &str) -> bool {
        self.anatomies.knows(label)
    }
}

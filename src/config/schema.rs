use serde::Deserialize;
use thiserror::Error;

/// A reusable set of filter rules kept in TOML.
///
/// ```toml
/// description = "strip logins before deploying to Azure"
/// blacklist = ['Type="SqlLogin"', 'Type="SqlUser"']
///
/// [[replace]]
/// pattern = 'AUTHORIZATION \[\w+\]'
/// replacement = "AUTHORIZATION [dbo]"
/// ```
#[derive(Debug, Deserialize, Default, Clone)]
pub struct FilterProfile {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub blacklist: Vec<String>,
    #[serde(default)]
    pub replace: Vec<ReplaceDefinition>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReplaceDefinition {
    pub pattern: String,
    #[serde(default)]
    pub replacement: String,
}

impl FilterProfile {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.blacklist.is_empty() && self.replace.is_empty() {
            issues.push(ValidationIssue::EmptyProfile);
        }

        for (idx, pattern) in self.blacklist.iter().enumerate() {
            if pattern.trim().is_empty() {
                issues.push(ValidationIssue::EmptyPattern {
                    section: "blacklist",
                    entry: idx + 1,
                });
            }
        }

        for (idx, rule) in self.replace.iter().enumerate() {
            if rule.pattern.trim().is_empty() {
                issues.push(ValidationIssue::EmptyPattern {
                    section: "replace",
                    entry: idx + 1,
                });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

/// Every problem found in a profile, reported together.
#[derive(Error, Debug, Clone)]
#[error("{}", render_issues(.issues))]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

#[derive(Error, Debug, Clone)]
pub enum ValidationIssue {
    #[error("filter profile contains no blacklist or replace rules")]
    EmptyProfile,

    #[error("{section} entry {entry} has an empty pattern")]
    EmptyPattern { section: &'static str, entry: usize },
}

fn render_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

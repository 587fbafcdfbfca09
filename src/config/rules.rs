//! Blacklist and replace rules for the filter operation.
//!
//! Both rule files are line oriented. Lines starting with `#` and blank lines
//! are skipped. A blacklist line is one regular expression; a replace line is
//! `pattern<TAB>replacement`, split at the first tab. Patterns are compiled
//! with `.` matching newlines, since element text spans many lines.
//!
//! The same rules can also come from a TOML [`FilterProfile`].

use crate::config::schema::{FilterProfile, ValidationError};
use regex::{Regex, RegexBuilder};
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RulesError {
    #[error("invalid pattern at {origin}:{line}: {source}")]
    InvalidPattern {
        origin: String,
        line: usize,
        #[source]
        source: regex::Error,
    },

    #[error("replace rule at {origin}:{line} has no tab between pattern and replacement")]
    MissingSeparator { origin: String, line: usize },

    #[error("failed to read rules from {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse filter profile {origin}: {source}")]
    ProfileSyntax {
        origin: String,
        #[source]
        source: toml_edit::de::Error,
    },

    #[error("invalid filter profile {origin}: {source}")]
    InvalidProfile {
        origin: String,
        #[source]
        source: ValidationError,
    },
}

/// One `pattern -> replacement` rewrite.
///
/// Replacements reference the match as `$&`, numbered groups as `$1`, and
/// named groups as `${name}`; `$$` is a literal dollar. A numbered reference
/// ends at the first non-digit, so `$1_new` is group 1 followed by `_new`.
/// Any other `$` is literal.
#[derive(Debug, Clone)]
pub struct ReplaceRule {
    pub pattern: Regex,
    /// Replacement as written in the rule
    pub replacement: String,
    /// Same replacement in the `regex` crate's expansion syntax
    expansion: String,
}

impl ReplaceRule {
    pub fn new(pattern: Regex, replacement: impl Into<String>) -> Self {
        let replacement = replacement.into();
        Self {
            pattern,
            expansion: expansion_syntax(&replacement),
            replacement,
        }
    }

    /// Apply the rule to every match in `text`.
    pub fn apply<'t>(&self, text: &'t str) -> Cow<'t, str> {
        self.pattern.replace_all(text, self.expansion.as_str())
    }
}

/// Ordered rewrite rules followed by a blacklist.
#[derive(Debug, Clone, Default)]
pub struct FilterRules {
    replacements: Vec<ReplaceRule>,
    blacklist: Vec<Regex>,
}

impl FilterRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build rules from in-memory rule file contents.
    pub fn from_lines(blacklist: &str, replace: &str) -> Result<Self, RulesError> {
        Ok(Self {
            replacements: parse_replacements(replace, "<replace>")?,
            blacklist: parse_blacklist(blacklist, "<blacklist>")?,
        })
    }

    /// Load whichever rule files are given; a missing argument contributes no rules.
    pub fn load(blacklist: Option<&Path>, replace: Option<&Path>) -> Result<Self, RulesError> {
        let mut rules = Self::new();
        if let Some(path) = replace {
            let contents = read_rules(path)?;
            rules.replacements = parse_replacements(&contents, &path.display().to_string())?;
        }
        if let Some(path) = blacklist {
            let contents = read_rules(path)?;
            rules.blacklist = parse_blacklist(&contents, &path.display().to_string())?;
        }
        Ok(rules)
    }

    /// Compile the rules carried by a TOML filter profile.
    ///
    /// Errors report the 1-based entry index in place of a line number.
    pub fn from_profile(profile: &FilterProfile, origin: &str) -> Result<Self, RulesError> {
        let replacements = profile
            .replace
            .iter()
            .enumerate()
            .map(|(idx, def)| {
                Ok(ReplaceRule::new(
                    compile(&def.pattern, origin, idx + 1)?,
                    def.replacement.as_str(),
                ))
            })
            .collect::<Result<Vec<_>, RulesError>>()?;

        let blacklist = profile
            .blacklist
            .iter()
            .enumerate()
            .map(|(idx, pattern)| compile(pattern, origin, idx + 1))
            .collect::<Result<Vec<_>, RulesError>>()?;

        Ok(Self {
            replacements,
            blacklist,
        })
    }

    /// Append `other`'s rules after this set's, preserving order.
    pub fn extend(&mut self, other: FilterRules) {
        self.replacements.extend(other.replacements);
        self.blacklist.extend(other.blacklist);
    }

    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty() && self.blacklist.is_empty()
    }

    pub fn replacements(&self) -> &[ReplaceRule] {
        &self.replacements
    }

    pub fn blacklist(&self) -> &[Regex] {
        &self.blacklist
    }

    /// Apply every replace rule in order, each to the previous rule's output.
    pub fn apply_replacements<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let mut current = Cow::Borrowed(text);
        for rule in &self.replacements {
            let replaced = match rule.apply(&current) {
                Cow::Borrowed(_) => continue,
                Cow::Owned(replaced) => replaced,
            };
            current = Cow::Owned(replaced);
        }
        current
    }

    pub fn is_blacklisted(&self, text: &str) -> bool {
        self.blacklist.iter().any(|pattern| pattern.is_match(text))
    }
}

/// Parse blacklist rule lines.
pub fn parse_blacklist(input: &str, origin: &str) -> Result<Vec<Regex>, RulesError> {
    rule_lines(input)
        .map(|(line, text)| compile(text, origin, line))
        .collect()
}

/// Parse `pattern<TAB>replacement` rule lines.
pub fn parse_replacements(input: &str, origin: &str) -> Result<Vec<ReplaceRule>, RulesError> {
    rule_lines(input)
        .map(|(line, text)| {
            let (pattern, replacement) =
                text.split_once('\t')
                    .ok_or_else(|| RulesError::MissingSeparator {
                        origin: origin.to_string(),
                        line,
                    })?;
            Ok(ReplaceRule::new(compile(pattern, origin, line)?, replacement))
        })
        .collect()
}

/// Parse and validate a TOML filter profile. `origin` names it in errors.
pub fn parse_profile(input: &str, origin: &str) -> Result<FilterProfile, RulesError> {
    let profile: FilterProfile =
        toml_edit::de::from_str(input).map_err(|source| RulesError::ProfileSyntax {
            origin: origin.to_string(),
            source,
        })?;
    profile
        .validate()
        .map_err(|source| RulesError::InvalidProfile {
            origin: origin.to_string(),
            source,
        })?;
    Ok(profile)
}

pub fn load_profile(path: &Path) -> Result<FilterProfile, RulesError> {
    let contents = read_rules(path)?;
    parse_profile(&contents, &path.display().to_string())
}

/// Non-comment, non-blank lines paired with their 1-based line number.
fn rule_lines(input: &str) -> impl Iterator<Item = (usize, &str)> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.starts_with('#') && !line.trim().is_empty())
        .map(|(idx, line)| (idx + 1, line))
}

fn compile(pattern: &str, origin: &str, line: usize) -> Result<Regex, RulesError> {
    RegexBuilder::new(pattern)
        .dot_matches_new_line(true)
        .build()
        .map_err(|source| RulesError::InvalidPattern {
            origin: origin.to_string(),
            line,
            source,
        })
}

/// Translate a rule replacement into `regex` expansion syntax.
fn expansion_syntax(replacement: &str) -> String {
    let mut out = String::with_capacity(replacement.len() + 4);
    let mut rest = replacement;

    while let Some(idx) = rest.find('$') {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx + 1..];
        let digits = tail.len() - tail.trim_start_matches(|c: char| c.is_ascii_digit()).len();

        rest = if digits > 0 {
            out.push_str(&format!("${{{}}}", &tail[..digits]));
            &tail[digits..]
        } else if let Some(after) = tail.strip_prefix('&') {
            out.push_str("${0}");
            after
        } else if let Some(name) = braced_name(tail) {
            out.push_str(&format!("${{{name}}}"));
            &tail[name.len() + 2..]
        } else {
            // `$$` and any unrecognized `$`
            out.push_str("$$");
            tail.strip_prefix('$').unwrap_or(tail)
        };
    }

    out.push_str(rest);
    out
}

/// Group name of a `{name}` reference at the start of `tail`.
fn braced_name(tail: &str) -> Option<&str> {
    let inner = tail.strip_prefix('{')?;
    let name = &inner[..inner.find('}')?];
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then_some(name)
}

fn read_rules(path: &Path) -> Result<String, RulesError> {
    fs::read_to_string(path).map_err(|source| RulesError::Io {
        path: path.to_path_buf(),
        source,
    })
}

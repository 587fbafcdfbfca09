pub mod rules;
pub mod schema;

pub use rules::{
    load_profile, parse_blacklist, parse_profile, parse_replacements, FilterRules, ReplaceRule,
    RulesError,
};
pub use schema::{FilterProfile, ReplaceDefinition, ValidationError, ValidationIssue};

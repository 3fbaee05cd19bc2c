//! Request validation engine
//!
//! Role definitions declare per-attribute directives (`exists`, `isString`, `match`, ...).
//! [`CompiledSchema::compile`] turns them into [`FieldRule`]s once; running the compiled
//! rules against a JSON body yields the ordered failure list the API reports.
//!
//! The fixed endpoints (login, password reset, ...) use the same engine through [`rules`].

use crate::errors::{SchemaError, ValidationFailure};
use crate::models::{AttributeSchema, ValidationDirective, ValidationMethod};
use regex_lite::Regex;
use serde_json::Value;
use std::collections::HashSet;
use validator::ValidateEmail;

/// Runtime check attached to one field
#[derive(Debug, Clone)]
pub enum Check {
    Exists,
    IsString,
    IsBoolean,
    NotEmpty,
    Matches(Regex),
    IsIn(Vec<String>),
    Email,
}

/// A check bound to a dotted field path together with its failure message
#[derive(Debug, Clone)]
pub struct FieldRule {
    field: String,
    check: Check,
    message: String,
}

impl FieldRule {
    pub fn new(field: impl Into<String>, check: Check, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            check,
            message: message.into(),
        }
    }

    pub fn required(field: &str) -> Self {
        Self::new(field, Check::Exists, format!("{} is required", leaf(field)))
    }

    pub fn not_empty(field: &str) -> Self {
        Self::new(field, Check::NotEmpty, format!("{} cannot be empty", leaf(field)))
    }

    pub fn string(field: &str) -> Self {
        Self::new(field, Check::IsString, format!("{} must be a string", leaf(field)))
    }

    pub fn email(field: &str) -> Self {
        Self::new(field, Check::Email, format!("{} must be valid", leaf(field)))
    }

    pub fn matches(field: &str, pattern: &Regex, message: &str) -> Self {
        Self::new(field, Check::Matches(pattern.clone()), message)
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Failures of "field is required" rules are reported first
    pub fn is_presence_rule(&self) -> bool {
        matches!(self.check, Check::Exists)
    }

    pub fn passes(&self, input: &Value) -> bool {
        let value = lookup(input, &self.field);
        match &self.check {
            Check::Exists => value.is_some(),
            Check::IsString => matches!(value, Some(Value::String(_))),
            Check::IsBoolean => match value {
                Some(Value::Bool(_)) => true,
                Some(Value::String(s)) => matches!(s.as_str(), "true" | "false" | "0" | "1"),
                _ => false,
            },
            Check::NotEmpty => match value {
                Some(Value::Array(items)) => !items.is_empty(),
                other => !value_text(other).trim().is_empty(),
            },
            Check::Matches(pattern) => pattern.is_match(&value_text(value)),
            Check::IsIn(choices) => {
                value.is_some() && choices.iter().any(|c| *c == value_text(value))
            }
            Check::Email => match value {
                Some(Value::String(s)) => s.validate_email(),
                _ => false,
            },
        }
    }
}

/// Last segment of a dotted path, used in generated messages
fn leaf(field: &str) -> &str {
    field.rsplit('.').next().unwrap_or(field)
}

fn lookup<'a>(input: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(input, |value, segment| value.get(segment))
}

/// String form a value is tested in; missing and null read as empty
fn value_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Ordered set of rules compiled from a role schema and/or fixed rule sets
#[derive(Debug, Clone, Default)]
pub struct CompiledSchema {
    rules: Vec<FieldRule>,
}

impl CompiledSchema {
    pub fn new(rules: Vec<FieldRule>) -> Self {
        Self { rules }
    }

    /// Compile a role's attribute schema. Attribute fields live under `prefix`
    /// (e.g. `additions`), so attribute `phone` is checked at `additions.phone`.
    pub fn compile(prefix: &str, schema: &[AttributeSchema]) -> Result<Self, SchemaError> {
        let mut rules = Vec::new();
        for attribute in schema {
            let field = if prefix.is_empty() {
                attribute.name.clone()
            } else {
                format!("{}.{}", prefix, attribute.name)
            };
            for directive in &attribute.validations {
                rules.push(compile_directive(&field, &attribute.name, directive)?);
            }
        }
        Ok(Self { rules })
    }

    /// Append another rule set after this one
    pub fn chain(mut self, other: CompiledSchema) -> Self {
        self.rules.extend(other.rules);
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run every rule and return the collated failure messages
    pub fn messages(&self, input: &Value) -> Vec<String> {
        let failed = self
            .rules
            .iter()
            .filter(|rule| !rule.passes(input))
            .map(|rule| (rule.is_presence_rule(), rule.message.clone()));
        collate(failed)
    }

    pub fn validate(&self, input: &Value) -> Result<(), ValidationFailure> {
        let messages = self.messages(input);
        if messages.is_empty() {
            Ok(())
        } else {
            Err(ValidationFailure { messages })
        }
    }
}

fn compile_directive(
    field: &str,
    attribute: &str,
    directive: &ValidationDirective,
) -> Result<FieldRule, SchemaError> {
    let argument = || {
        directive
            .validator
            .as_deref()
            .filter(|arg| !arg.is_empty())
            .ok_or_else(|| SchemaError::MissingArgument {
                attribute: attribute.to_string(),
                method: directive.method.as_str().to_string(),
            })
    };

    let check = match directive.method {
        ValidationMethod::Exists => Check::Exists,
        ValidationMethod::IsString => Check::IsString,
        ValidationMethod::IsBoolean => Check::IsBoolean,
        ValidationMethod::NotEmpty => Check::NotEmpty,
        ValidationMethod::Match => {
            let pattern = Regex::new(argument()?).map_err(|e| SchemaError::InvalidPattern {
                attribute: attribute.to_string(),
                reason: e.to_string(),
            })?;
            Check::Matches(pattern)
        }
        ValidationMethod::IsIn => {
            let invalid = || SchemaError::InvalidChoices {
                attribute: attribute.to_string(),
            };
            let choices: Vec<Value> = serde_json::from_str(argument()?).map_err(|_| invalid())?;
            let choices = choices
                .iter()
                .map(|choice| match choice {
                    Value::String(_) | Value::Number(_) | Value::Bool(_) => {
                        Ok(value_text(Some(choice)))
                    }
                    _ => Err(invalid()),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Check::IsIn(choices)
        }
    };

    Ok(FieldRule::new(field, check, directive.message.clone()))
}

/// Move presence failures to the front (keeping relative order), then keep only the
/// first message for each leading field-name token.
fn collate(failed: impl Iterator<Item = (bool, String)>) -> Vec<String> {
    let (required, other): (Vec<_>, Vec<_>) = failed.partition(|(presence, _)| *presence);

    let mut seen = HashSet::new();
    required
        .into_iter()
        .chain(other)
        .map(|(_, message)| message)
        .filter(|message| {
            let key = message.split(' ').next().unwrap_or_default().to_string();
            seen.insert(key)
        })
        .collect()
}

/// Rule sets for the fixed authentication endpoints
pub mod rules {
    use super::{CompiledSchema, FieldRule};
    use once_cell::sync::Lazy;
    use regex_lite::Regex;

    static UPPERCASE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Z]").expect("static pattern compiles"));
    static LOWERCASE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z]").expect("static pattern compiles"));
    static DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d").expect("static pattern compiles"));
    static SPECIAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\W_]").expect("static pattern compiles"));
    static MIN_LENGTH: Lazy<Regex> = Lazy::new(|| Regex::new(r".{8,}").expect("static pattern compiles"));
    static NO_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\S+$").expect("static pattern compiles"));

    pub fn email(field: &str) -> Vec<FieldRule> {
        vec![
            FieldRule::required(field),
            FieldRule::not_empty(field),
            FieldRule::email(field),
        ]
    }

    /// Password strength rules; messages always name the field "password"
    pub fn password(field: &str) -> Vec<FieldRule> {
        vec![
            FieldRule::required(field),
            FieldRule::new(field, super::Check::NotEmpty, "password cannot be empty"),
            FieldRule::matches(field, &UPPERCASE, "password must contain at least 1 uppercase"),
            FieldRule::matches(field, &LOWERCASE, "password must contain at least 1 lowercase"),
            FieldRule::matches(field, &DIGIT, "password must contain at least 1 number"),
            FieldRule::matches(
                field,
                &SPECIAL,
                "password must contain at least 1 special characters",
            ),
            FieldRule::matches(field, &MIN_LENGTH, "password must contain at least of 8 characters"),
            FieldRule::matches(field, &NO_SPACE, "password cannot contain space"),
        ]
    }

    /// `required` + `not empty` for each field
    pub fn present(fields: &[&str]) -> Vec<FieldRule> {
        fields
            .iter()
            .flat_map(|f| [FieldRule::required(f), FieldRule::not_empty(f)])
            .collect()
    }

    /// Base rules every registration carries before the role's own directives
    pub fn register() -> CompiledSchema {
        let mut rules = email("email");
        rules.push(FieldRule::required("additions"));
        rules.extend(present(&["additions.name"]));
        rules.extend(password("additions.password"));
        CompiledSchema::new(rules)
    }

    pub fn login() -> CompiledSchema {
        CompiledSchema::new(present(&["role", "email", "password"]))
    }

    pub fn verify_email() -> CompiledSchema {
        CompiledSchema::new(present(&["token"]))
    }

    pub fn forgot_password() -> CompiledSchema {
        CompiledSchema::new(present(&["role", "email"]))
    }

    pub fn reset_password() -> CompiledSchema {
        let mut rules = present(&["role", "email", "token"]);
        rules.extend(password("password"));
        CompiledSchema::new(rules)
    }

    pub fn change_password() -> CompiledSchema {
        CompiledSchema::new(password("password"))
    }

    pub fn verify_password() -> CompiledSchema {
        CompiledSchema::new(present(&["password"]))
    }

    pub fn named_resource() -> CompiledSchema {
        let mut rules = present(&["name"]);
        rules.push(FieldRule::string("name"));
        CompiledSchema::new(rules)
    }
}

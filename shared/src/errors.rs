//! Error types shared by the validation engine and role canonicalization

use std::fmt;
use thiserror::Error;

/// Problem with a role or route definition
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error(r#"the only accepted value for access limit are "readonly" or "noaccess""#)]
    UnknownAccess(String),

    #[error(r#"the only accepted value for restriction method are "GET", "POST", "PUT", "PATCH", or "DELETE""#)]
    UnknownHttpMethod(String),

    #[error(r#"validation method "{0}" is not supported"#)]
    UnknownMethod(String),

    #[error("validation method {method} of {attribute} requires a validator")]
    MissingArgument { attribute: String, method: String },

    #[error("invalid pattern for {attribute}: {reason}")]
    InvalidPattern { attribute: String, reason: String },

    #[error("isIn validator for {attribute} must be a JSON array of strings")]
    InvalidChoices { attribute: String },

    #[error("attribute {0} has an unsupported value type")]
    UnsupportedAttribute(String),
}

/// Ordered, de-duplicated validation failure messages
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub messages: Vec<String>,
}

impl fmt::Display for ValidationFailure {
    /// Renders as `1. first message.\n2. second message.`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, message) in self.messages.iter().enumerate() {
            if idx > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}. {}.", idx + 1, message)?;
        }
        Ok(())
    }
}

//! Data models for identities, roles and route restrictions

use crate::errors::SchemaError;
use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Role that bypasses route restrictions
pub const ADMIN_ROLE: &str = "admin";

/// Role listed when no role filter is given
pub const DEFAULT_MEMBER_ROLE: &str = "user";

/// Attributes every role membership carries regardless of its schema
pub const DEFAULT_ATTRIBUTES: [&str; 2] = ["name", "password"];

/// Length of verification and reset tokens
pub const TOKEN_LEN: usize = 32;

/// Value stored in a role membership attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Flag(bool),
    Number(serde_json::Number),
    Text(String),
    List(Vec<AttributeValue>),
}

impl AttributeValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl TryFrom<&serde_json::Value> for AttributeValue {
    type Error = ();

    fn try_from(value: &serde_json::Value) -> Result<Self, Self::Error> {
        use serde_json::Value;
        Ok(match value {
            Value::Null => AttributeValue::Null,
            Value::Bool(b) => AttributeValue::Flag(*b),
            Value::Number(n) => AttributeValue::Number(n.clone()),
            Value::String(s) => AttributeValue::Text(s.clone()),
            Value::Array(items) => AttributeValue::List(
                items
                    .iter()
                    .map(AttributeValue::try_from)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Value::Object(_) => return Err(()),
        })
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

/// Ordered association list of a membership's attributes.
///
/// Serialized as a JSON object whose key order follows insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeBag {
    entries: Vec<(String, AttributeValue)>,
}

impl AttributeBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a bag from raw request attributes, keeping only the names `declared` accepts.
    ///
    /// Nested objects are not representable and are rejected.
    pub fn from_declared<F>(
        raw: &serde_json::Map<String, serde_json::Value>,
        declared: F,
    ) -> Result<Self, SchemaError>
    where
        F: Fn(&str) -> bool,
    {
        let mut bag = Self::new();
        for (name, value) in raw {
            if !declared(name) {
                continue;
            }
            let value = AttributeValue::try_from(value)
                .map_err(|_| SchemaError::UnsupportedAttribute(name.clone()))?;
            bag.set(name.clone(), value);
        }
        Ok(bag)
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn get_text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(AttributeValue::as_text)
    }

    /// Insert or replace an attribute, keeping the original position on replace
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<AttributeValue> {
        let idx = self.entries.iter().position(|(key, _)| key == name)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for AttributeBag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for AttributeBag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BagVisitor;

        impl<'de> Visitor<'de> for BagVisitor {
            type Value = AttributeBag;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of attributes")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut bag = AttributeBag::new();
                while let Some((key, value)) = access.next_entry::<String, AttributeValue>()? {
                    bag.set(key, value);
                }
                Ok(bag)
            }
        }

        deserializer.deserialize_map(BagVisitor)
    }
}

/// An identity's enrollment in one role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleMembership {
    pub name: String,
    pub additions: AttributeBag,
}

impl RoleMembership {
    pub fn password_hash(&self) -> Option<&str> {
        self.additions.get_text("password")
    }

    pub fn display_name(&self) -> &str {
        self.additions.get_text("name").unwrap_or_default()
    }
}

/// Registered account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub code: String,
    pub email: String,
    /// `None` once the email address has been verified
    pub verify_email_token: Option<String>,
    pub roles: Vec<RoleMembership>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    /// Unverified identities are purged after this instant
    pub expires_at: Option<DateTime<Utc>>,
}

impl Identity {
    pub fn is_verified(&self) -> bool {
        self.verify_email_token.is_none()
    }

    pub fn membership(&self, role: &str) -> Option<&RoleMembership> {
        self.roles.iter().find(|r| r.name == role)
    }

    pub fn membership_mut(&mut self, role: &str) -> Option<&mut RoleMembership> {
        self.roles.iter_mut().find(|r| r.name == role)
    }

    /// Live means neither soft-deleted nor past its unverified expiry
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.deleted_at.is_none() && self.expires_at.map_or(true, |exp| exp > now)
    }
}

/// Validation method a role attribute directive may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValidationMethod {
    Exists,
    IsString,
    IsBoolean,
    NotEmpty,
    Match,
    IsIn,
}

impl ValidationMethod {
    pub const ALL: [ValidationMethod; 6] = [
        ValidationMethod::Exists,
        ValidationMethod::IsString,
        ValidationMethod::IsBoolean,
        ValidationMethod::NotEmpty,
        ValidationMethod::Match,
        ValidationMethod::IsIn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationMethod::Exists => "exists",
            ValidationMethod::IsString => "isString",
            ValidationMethod::IsBoolean => "isBoolean",
            ValidationMethod::NotEmpty => "notEmpty",
            ValidationMethod::Match => "match",
            ValidationMethod::IsIn => "isIn",
        }
    }

    /// Whether the directive needs a `validator` argument
    pub fn takes_argument(&self) -> bool {
        matches!(self, ValidationMethod::Match | ValidationMethod::IsIn)
    }
}

impl FromStr for ValidationMethod {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| SchemaError::UnknownMethod(s.to_string()))
    }
}

/// One validation rule attached to a role attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationDirective {
    pub method: ValidationMethod,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<String>,
}

/// Attribute a role declares for its members
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSchema {
    pub name: String,
    pub validations: Vec<ValidationDirective>,
}

/// Access level a role has on a frontend page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageAccess {
    Readonly,
    Noaccess,
}

impl PageAccess {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageAccess::Readonly => "readonly",
            PageAccess::Noaccess => "noaccess",
        }
    }
}

impl FromStr for PageAccess {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "readonly" => Ok(PageAccess::Readonly),
            "noaccess" => Ok(PageAccess::Noaccess),
            other => Err(SchemaError::UnknownAccess(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLimit {
    pub page: String,
    pub access: PageAccess,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrationPolicy {
    #[serde(default)]
    pub approvement_required: bool,
    #[serde(default)]
    pub whitelist: Vec<String>,
}

/// Persisted role configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub name: String,
    pub additions: Vec<AttributeSchema>,
    pub limits: Vec<PageLimit>,
    pub registration: RegistrationPolicy,
}

impl RoleDefinition {
    /// A role with no attributes, page limits or registration restrictions
    pub fn open(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            additions: Vec::new(),
            limits: Vec::new(),
            registration: RegistrationPolicy::default(),
        }
    }

    /// Whether `name` is an attribute members of this role may carry
    pub fn declares(&self, name: &str) -> bool {
        DEFAULT_ATTRIBUTES.contains(&name) || self.additions.iter().any(|a| a.name == name)
    }
}

/// HTTP methods a route restriction can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 5] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Patch,
        HttpMethod::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl FromStr for HttpMethod {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| SchemaError::UnknownHttpMethod(s.to_string()))
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodRestriction {
    pub method: HttpMethod,
    pub roles: Vec<String>,
}

/// Registered path with its per-method role allow-lists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDefinition {
    pub name: String,
    pub restrictions: Vec<MethodRestriction>,
}

impl RouteDefinition {
    pub fn restriction(&self, method: HttpMethod) -> Option<&MethodRestriction> {
        self.restrictions.iter().find(|r| r.method == method)
    }
}

/// Password reset grant, valid until `expired_at`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetToken {
    pub role: String,
    pub email: String,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expired_at: DateTime<Utc>,
}

/// Plaintext carried inside a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPayload {
    pub email: String,
    pub role: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attribute_bag_keeps_insertion_order() {
        let mut bag = AttributeBag::new();
        bag.set("zeta", "last");
        bag.set("alpha", "first");
        bag.set("zeta", "replaced");

        let keys: Vec<&str> = bag.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
        assert_eq!(bag.get_text("zeta"), Some("replaced"));

        let encoded = serde_json::to_string(&bag).unwrap();
        assert_eq!(encoded, r#"{"zeta":"replaced","alpha":"first"}"#);
    }

    #[test]
    fn test_attribute_bag_filters_undeclared() {
        let raw = json!({ "name": "Ana", "password": "x", "nickname": "a" });
        let bag = AttributeBag::from_declared(raw.as_object().unwrap(), |n| n != "nickname")
            .unwrap();
        assert_eq!(bag.len(), 2);
        assert!(bag.get("nickname").is_none());
    }

    #[test]
    fn test_attribute_bag_rejects_objects() {
        let raw = json!({ "name": { "first": "Ana" } });
        let err = AttributeBag::from_declared(raw.as_object().unwrap(), |_| true).unwrap_err();
        assert!(matches!(err, SchemaError::UnsupportedAttribute(name) if name == "name"));
    }

    #[test]
    fn test_identity_liveness() {
        let now = Utc::now();
        let mut identity = Identity {
            code: "M000".into(),
            email: "a@b.io".into(),
            verify_email_token: Some("t".into()),
            roles: vec![],
            created_at: now,
            updated_at: now,
            deleted_at: None,
            expires_at: Some(now + chrono::Duration::days(3)),
        };
        assert!(identity.is_live(now));
        assert!(!identity.is_verified());

        identity.expires_at = Some(now - chrono::Duration::seconds(1));
        assert!(!identity.is_live(now));

        identity.expires_at = None;
        identity.deleted_at = Some(now);
        assert!(!identity.is_live(now));
    }

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(serde_json::to_value(ValidationMethod::IsIn).unwrap(), json!("isIn"));
        assert_eq!(serde_json::to_value(HttpMethod::Patch).unwrap(), json!("PATCH"));
        assert_eq!(serde_json::to_value(PageAccess::Noaccess).unwrap(), json!("noaccess"));
        assert!("TRACE".parse::<HttpMethod>().is_err());
        assert_eq!("match".parse::<ValidationMethod>().unwrap(), ValidationMethod::Match);
    }
}

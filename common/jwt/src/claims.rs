use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AuthError, AuthResult};

/// Decoded token payload.
///
/// The payload object is kept verbatim, so serialising a `Claims` reproduces
/// the token it came from. Registered claims are read through accessors that
/// return `None` when the claim is absent or has an unexpected type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

/// The `aud` claim, which may be a single string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::Single(item) => item == audience,
            Audience::Many(items) => items.iter().any(|item| item == audience),
        }
    }
}

impl Claims {
    pub fn issuer(&self) -> Option<&str> {
        self.0.get("iss").and_then(Value::as_str)
    }

    pub fn subject(&self) -> Option<&str> {
        self.0.get("sub").and_then(Value::as_str)
    }

    /// `jti` is left untyped; issuers send both strings and numbers.
    pub fn jwt_id(&self) -> Option<&Value> {
        self.0.get("jti")
    }

    pub fn aud(&self) -> Option<Audience> {
        self.0
            .get("aud")
            .and_then(|aud| Audience::deserialize(aud).ok())
    }

    pub fn audience(&self) -> Vec<String> {
        match self.aud() {
            Some(Audience::Single(item)) => vec![item],
            Some(Audience::Many(items)) => items,
            None => Vec::new(),
        }
    }

    /// A NumericDate claim in seconds. Fractional values are kept.
    pub fn numeric_date(&self, name: &str) -> Option<f64> {
        self.0.get(name).and_then(Value::as_f64)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.numeric_date("exp").and_then(to_datetime)
    }

    pub fn not_before(&self) -> Option<DateTime<Utc>> {
        self.numeric_date("nbf").and_then(to_datetime)
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.numeric_date("iat").and_then(to_datetime)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

fn to_datetime(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    Utc.timestamp_millis_opt((seconds * 1000.0).round() as i64).single()
}

impl From<Map<String, Value>> for Claims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Claims {
    type Error = AuthError;

    fn try_from(value: Value) -> AuthResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(AuthError::Verification(
                "token payload is not a JSON object".to_string(),
            )),
        }
    }
}

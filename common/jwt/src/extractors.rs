use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde_json::{Map, Value};

use crate::claims::Claims;
use crate::error::AuthError;
use crate::lookup::ExtractedToken;

/// Verified claims attached to a request by the authentication middleware.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Name under which the claims are exposed to the GraphQL context.
    pub field: String,
    pub claims: Claims,
    pub token: ExtractedToken,
}

impl AuthContext {
    pub fn subject(&self) -> Option<&str> {
        self.claims.subject()
    }

    pub fn into_claims(self) -> Claims {
        self.claims
    }

    /// Context fragment for the executor: `{ <field>: <claims> }`.
    pub fn to_value(&self) -> Value {
        let mut fragment = Map::new();
        fragment.insert(self.field.clone(), self.claims.to_value());
        Value::Object(fragment)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or(AuthError::MissingToken)
    }
}

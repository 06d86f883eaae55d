use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::str::FromStr;

use jsonwebtoken::{decode, Algorithm, Validation};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::claims::Claims;
use crate::config::JwtConfig;
use crate::error::{AuthError, AuthResult};
use crate::keys::{KeyResolver, SigningKeyProvider};

/// Turns a raw token into trusted claims.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> AuthResult<Claims>;
}

/// JOSE header fields needed before the signature can be checked.
///
/// `alg` stays a string so that algorithms `jsonwebtoken` cannot represent
/// (`none`, `ES512`) still decode and are refused as a verification failure.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenHeader {
    pub alg: String,
    #[serde(default)]
    pub kid: Option<String>,
    #[serde(default)]
    pub typ: Option<String>,
}

/// Header and payload of a token, read without checking the signature.
#[derive(Debug, Clone)]
pub struct UnverifiedToken {
    pub header: TokenHeader,
    pub payload: Value,
}

/// Structural decode of a compact JWS. Nothing returned here is trusted.
pub fn decode_unverified(token: &str) -> AuthResult<UnverifiedToken> {
    let mut segments = token.split('.');
    let (Some(header), Some(payload), Some(_), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(AuthError::MalformedToken(
            "token must have three segments".to_string(),
        ));
    };

    let header: TokenHeader = decode_segment(header, "header")?;
    let payload: Value = decode_segment(payload, "payload")?;
    if !payload.is_object() {
        return Err(AuthError::MalformedToken(
            "payload is not a JSON object".to_string(),
        ));
    }

    Ok(UnverifiedToken { header, payload })
}

fn decode_segment<T: DeserializeOwned>(segment: &str, part: &str) -> AuthResult<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|err| AuthError::MalformedToken(format!("{part} encoding: {err}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|err| AuthError::MalformedToken(format!("{part} json: {err}")))
}

/// Verifies tokens with keys from an ordered list of providers.
#[derive(Clone)]
pub struct JwtVerifier {
    config: JwtConfig,
    resolver: KeyResolver,
}

impl JwtVerifier {
    pub fn new(config: JwtConfig, resolver: KeyResolver) -> Self {
        Self { config, resolver }
    }

    pub fn builder(config: JwtConfig) -> JwtVerifierBuilder {
        JwtVerifierBuilder::new(config)
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    pub fn resolver(&self) -> &KeyResolver {
        &self.resolver
    }

    fn validation(&self, header: &TokenHeader) -> AuthResult<Validation> {
        let alg = Algorithm::from_str(&header.alg)
            .ok()
            .filter(|alg| self.config.allows(*alg))
            .ok_or_else(|| {
                AuthError::Verification(format!("algorithm '{}' is not allowed", header.alg))
            })?;

        let mut validation = Validation::new(alg);
        validation.leeway = self.config.leeway_seconds.into();
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&self.config.required_claims);

        if self.config.issuers.is_empty() {
            validation.iss = None;
        } else {
            validation.set_issuer(&self.config.issuers);
        }

        if self.config.audiences.is_empty() {
            validation.validate_aud = false;
        } else {
            validation.set_audience(&self.config.audiences);
        }

        Ok(validation)
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> AuthResult<Claims> {
        let unverified = decode_unverified(token)?;
        let kid = unverified.header.kid.as_deref();

        let key = self.resolver.resolve(kid).await?;

        let validation = self.validation(&unverified.header)?;
        let token_data = decode::<Value>(token, &key, &validation)?;
        let claims = Claims::try_from(token_data.claims)?;
        debug!(?kid, sub = claims.subject(), "verified JWT successfully");
        Ok(claims)
    }
}

pub struct JwtVerifierBuilder {
    config: JwtConfig,
    resolver: KeyResolver,
}

impl JwtVerifierBuilder {
    fn new(config: JwtConfig) -> Self {
        Self {
            config,
            resolver: KeyResolver::default(),
        }
    }

    pub fn with_provider(mut self, provider: impl SigningKeyProvider + 'static) -> Self {
        self.resolver = self.resolver.with_provider(provider);
        self
    }

    pub fn with_resolver(mut self, resolver: KeyResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn build(self) -> JwtVerifier {
        JwtVerifier {
            config: self.config,
            resolver: self.resolver,
        }
    }
}

use std::sync::Arc;

use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::HeaderName;
use serde::Serialize;

pub const DEFAULT_PREFIX: &str = "Bearer";

/// A token found in the request, along with the prefix that introduced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedToken {
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

impl ExtractedToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            prefix: None,
        }
    }

    pub fn with_prefix(token: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            prefix: Some(prefix.into()),
        }
    }
}

/// One place to look for a token. Implementations must not have side effects.
pub trait TokenExtractor: Send + Sync {
    fn extract(&self, parts: &Parts) -> Option<ExtractedToken>;
}

impl<F> TokenExtractor for F
where
    F: Fn(&Parts) -> Option<ExtractedToken> + Send + Sync,
{
    fn extract(&self, parts: &Parts) -> Option<ExtractedToken> {
        self(parts)
    }
}

/// Reads the token from a header, optionally behind a scheme prefix such as
/// `Bearer`. The prefix match is case-sensitive.
#[derive(Debug, Clone)]
pub struct HeaderExtractor {
    name: HeaderName,
    prefix: Option<String>,
}

impl HeaderExtractor {
    pub fn new(name: HeaderName, prefix: Option<String>) -> Self {
        Self { name, prefix }
    }

    pub fn bearer() -> Self {
        Self::new(AUTHORIZATION, Some(DEFAULT_PREFIX.to_string()))
    }
}

impl TokenExtractor for HeaderExtractor {
    fn extract(&self, parts: &Parts) -> Option<ExtractedToken> {
        let raw = parts.headers.get(&self.name)?.to_str().ok()?.trim();

        let Some(prefix) = &self.prefix else {
            return (!raw.is_empty()).then(|| ExtractedToken::new(raw));
        };

        let (scheme, rest) = raw.split_once(char::is_whitespace)?;
        if scheme != prefix {
            return None;
        }

        let token = rest.trim();
        if token.is_empty() {
            return None;
        }

        Some(ExtractedToken::with_prefix(token, prefix.as_str()))
    }
}

/// Reads the token from a named cookie.
#[derive(Debug, Clone)]
pub struct CookieExtractor {
    name: String,
}

impl CookieExtractor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl TokenExtractor for CookieExtractor {
    fn extract(&self, parts: &Parts) -> Option<ExtractedToken> {
        parts
            .headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| name.trim() == self.name)
            .map(|(_, value)| value.trim().trim_matches('"'))
            .filter(|value| !value.is_empty())
            .map(|value| {
                // Values that are not valid UTF-8 once decoded are used as sent.
                let token = urlencoding::decode(value)
                    .map(|decoded| decoded.into_owned())
                    .unwrap_or_else(|_| value.to_string());
                ExtractedToken::new(token)
            })
    }
}

/// Ordered list of extraction strategies; the first hit wins.
#[derive(Clone)]
pub struct TokenLookup {
    extractors: Vec<Arc<dyn TokenExtractor>>,
}

impl Default for TokenLookup {
    fn default() -> Self {
        Self {
            extractors: vec![Arc::new(HeaderExtractor::bearer())],
        }
    }
}

impl TokenLookup {
    /// Build a lookup from explicit strategies. An empty list falls back to
    /// `Authorization: Bearer <token>`.
    pub fn new(extractors: Vec<Arc<dyn TokenExtractor>>) -> Self {
        if extractors.is_empty() {
            return Self::default();
        }
        Self { extractors }
    }

    pub fn header(name: HeaderName, prefix: Option<&str>) -> Self {
        Self::new(vec![Arc::new(HeaderExtractor::new(
            name,
            prefix.map(str::to_string),
        ))])
    }

    pub fn then(mut self, extractor: impl TokenExtractor + 'static) -> Self {
        self.extractors.push(Arc::new(extractor));
        self
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }

    pub fn extract(&self, parts: &Parts) -> Option<ExtractedToken> {
        self.extractors
            .iter()
            .find_map(|extractor| extractor.extract(parts))
    }
}

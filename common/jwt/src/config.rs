use jsonwebtoken::Algorithm;

/// Algorithms accepted when no explicit allow-list is configured. The resolved
/// key still has to belong to the same family as the token's `alg`.
pub const DEFAULT_ALGORITHMS: &[Algorithm] = &[
    Algorithm::HS256,
    Algorithm::HS384,
    Algorithm::HS512,
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::EdDSA,
];

/// Runtime configuration for JWT verification.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Allowed `alg` header values.
    pub algorithms: Vec<Algorithm>,
    /// Accepted issuers (iss). Not checked when empty.
    pub issuers: Vec<String>,
    /// Accepted audiences (aud). Not checked when empty.
    pub audiences: Vec<String>,
    /// Allowable clock skew in seconds when validating exp/nbf.
    pub leeway_seconds: u32,
    /// Claims that must be present in every token.
    pub required_claims: Vec<String>,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            algorithms: DEFAULT_ALGORITHMS.to_vec(),
            issuers: Vec::new(),
            audiences: Vec::new(),
            leeway_seconds: 0,
            required_claims: Vec::new(),
        }
    }
}

impl JwtConfig {
    /// Config that pins a single issuer and audience, with a 30 second leeway.
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuers: vec![issuer.into()],
            audiences: vec![audience.into()],
            leeway_seconds: 30,
            ..Self::default()
        }
    }

    pub fn with_algorithms(mut self, algorithms: impl IntoIterator<Item = Algorithm>) -> Self {
        self.algorithms = algorithms.into_iter().collect();
        self
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuers.push(issuer.into());
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audiences.push(audience.into());
        self
    }

    /// Adjust the allowed leeway.
    pub fn with_leeway(mut self, seconds: u32) -> Self {
        self.leeway_seconds = seconds;
        self
    }

    pub fn require_claim(mut self, claim: impl Into<String>) -> Self {
        self.required_claims.push(claim.into());
        self
    }

    pub fn allows(&self, algorithm: Algorithm) -> bool {
        self.algorithms.contains(&algorithm)
    }
}

/// Whether missing or invalid tokens halt the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejectPolicy {
    pub missing_token: bool,
    pub invalid_token: bool,
}

impl Default for RejectPolicy {
    fn default() -> Self {
        Self {
            missing_token: true,
            invalid_token: true,
        }
    }
}

impl RejectPolicy {
    /// Let every request through, verified or not.
    pub fn permissive() -> Self {
        Self {
            missing_token: false,
            invalid_token: false,
        }
    }
}

pub const DEFAULT_CONTEXT_FIELD: &str = "jwt";

/// Where verified claims are exposed to downstream handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtendContext {
    Disabled,
    Field(String),
}

impl Default for ExtendContext {
    fn default() -> Self {
        ExtendContext::Field(DEFAULT_CONTEXT_FIELD.to_string())
    }
}

impl ExtendContext {
    pub fn field(name: impl Into<String>) -> Self {
        ExtendContext::Field(name.into())
    }

    pub fn field_name(&self) -> Option<&str> {
        match self {
            ExtendContext::Disabled => None,
            ExtendContext::Field(name) => Some(name.as_str()),
        }
    }
}

impl From<bool> for ExtendContext {
    fn from(enabled: bool) -> Self {
        if enabled {
            ExtendContext::default()
        } else {
            ExtendContext::Disabled
        }
    }
}

impl From<&str> for ExtendContext {
    fn from(name: &str) -> Self {
        ExtendContext::field(name)
    }
}

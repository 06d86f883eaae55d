use anyhow::{anyhow, bail, Context, Result};
use common_jwt::{ExtendContext, JwtConfig, RejectPolicy};
use jsonwebtoken::Algorithm;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub jwt: JwtConfig,
    pub secret: Option<String>,
    pub public_key_pem: Option<String>,
    pub jwks_urls: Vec<String>,
    pub jwks_cache_seconds: u64,
    pub token_header: String,
    pub token_prefix: Option<String>,
    pub token_cookie: Option<String>,
    pub reject: RejectPolicy,
    pub extend_context: ExtendContext,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Build the config from any key/value source; `from_env` reads the process
    /// environment.
    pub fn from_source<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| get(key).and_then(|value| normalize_optional(&value));

        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = var("PORT")
            .map(|value| value.parse::<u16>())
            .transpose()
            .context("Failed to parse PORT")?
            .unwrap_or(8080);

        let algorithms = var("JWT_ALGORITHMS")
            .map(|value| parse_algorithms(&value))
            .transpose()
            .context("Failed to parse JWT_ALGORITHMS")?;
        let leeway_seconds = var("JWT_LEEWAY_SECONDS")
            .map(|value| value.parse::<u32>())
            .transpose()
            .context("Failed to parse JWT_LEEWAY_SECONDS")?
            .unwrap_or(0);

        let mut jwt = JwtConfig::default().with_leeway(leeway_seconds);
        if let Some(algorithms) = algorithms {
            jwt = jwt.with_algorithms(algorithms);
        }
        for issuer in var("JWT_ISSUER").map(|v| parse_list(&v)).unwrap_or_default() {
            jwt = jwt.with_issuer(issuer);
        }
        for audience in var("JWT_AUDIENCE").map(|v| parse_list(&v)).unwrap_or_default() {
            jwt = jwt.with_audience(audience);
        }

        let secret = var("JWT_SECRET");
        let public_key_pem = var("JWT_PUBLIC_KEY_PEM");
        let jwks_urls = var("JWT_JWKS_URLS")
            .map(|value| parse_list(&value))
            .unwrap_or_default();
        let jwks_cache_seconds = var("JWT_JWKS_CACHE_SECONDS")
            .map(|value| value.parse::<u64>())
            .transpose()
            .context("Failed to parse JWT_JWKS_CACHE_SECONDS")?
            .unwrap_or(600);

        if secret.is_none() && public_key_pem.is_none() && jwks_urls.is_empty() {
            bail!("No signing key configured. Set JWT_SECRET, JWT_PUBLIC_KEY_PEM or JWT_JWKS_URLS");
        }

        let token_header = var("AUTH_TOKEN_HEADER").unwrap_or_else(|| "Authorization".to_string());
        // An explicitly empty prefix disables prefix matching.
        let token_prefix = match get("AUTH_TOKEN_PREFIX") {
            Some(value) => normalize_optional(&value),
            None => Some("Bearer".to_string()),
        };
        let token_cookie = var("AUTH_TOKEN_COOKIE");

        let reject = RejectPolicy {
            missing_token: var("AUTH_REJECT_MISSING_TOKEN")
                .map(|value| parse_bool(&value))
                .unwrap_or(true),
            invalid_token: var("AUTH_REJECT_INVALID_TOKEN")
                .map(|value| parse_bool(&value))
                .unwrap_or(true),
        };

        let extend_context = var("AUTH_EXTEND_CONTEXT")
            .map(|value| parse_extend_context(&value))
            .unwrap_or_default();

        Ok(Self {
            host,
            port,
            jwt,
            secret,
            public_key_pem,
            jwks_urls,
            jwks_cache_seconds,
            token_header,
            token_prefix,
            token_cookie,
            reject,
            extend_context,
        })
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(|c| c == ',' || c == ';' || c == ' ')
        .filter_map(normalize_optional)
        .collect()
}

fn parse_algorithms(value: &str) -> Result<Vec<Algorithm>> {
    let algorithms = parse_list(value)
        .iter()
        .map(|item| {
            Algorithm::from_str(item)
                .or_else(|_| Algorithm::from_str(&item.to_ascii_uppercase()))
                .map_err(|_| anyhow!("Unsupported JWT algorithm '{item}'"))
        })
        .collect::<Result<Vec<_>>>()?;
    if algorithms.is_empty() {
        bail!("JWT_ALGORITHMS must list at least one algorithm");
    }
    Ok(algorithms)
}

fn parse_extend_context(value: &str) -> ExtendContext {
    match value.trim().to_ascii_lowercase().as_str() {
        "0" | "false" | "no" | "off" => ExtendContext::Disabled,
        "1" | "true" | "yes" | "on" => ExtendContext::default(),
        _ => ExtendContext::field(value.trim()),
    }
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

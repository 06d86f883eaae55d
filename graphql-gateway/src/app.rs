use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderName;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{extract::State, middleware, Json, Router};
use common_jwt::{
    require_jwt, AuthContext, CookieExtractor, HeaderExtractor, InlineKeyProvider, JwksFetcher,
    JwtAuth, JwtVerifier, RemoteJwksProvider, TokenLookup,
};
use common_observability::AuthMetrics;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::GatewayConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<JwtAuth>,
    pub metrics: AuthMetrics,
}

impl AppState {
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let metrics = AuthMetrics::new().context("Failed to register auth metrics")?;
        let auth = build_auth(config, metrics.clone())?;
        Ok(Self {
            auth: Arc::new(auth),
            metrics,
        })
    }
}

/// Wire the configured lookup, providers and policy into a [`JwtAuth`].
pub fn build_auth(config: &GatewayConfig, metrics: AuthMetrics) -> Result<JwtAuth> {
    let header = HeaderName::from_bytes(config.token_header.as_bytes())
        .with_context(|| format!("Invalid AUTH_TOKEN_HEADER '{}'", config.token_header))?;
    let mut lookup = TokenLookup::new(vec![Arc::new(HeaderExtractor::new(
        header,
        config.token_prefix.clone(),
    ))]);
    if let Some(cookie) = &config.token_cookie {
        lookup = lookup.then(CookieExtractor::new(cookie.clone()));
    }

    let mut verifier = JwtVerifier::builder(config.jwt.clone());
    if let Some(secret) = &config.secret {
        verifier = verifier.with_provider(InlineKeyProvider::from_secret(secret.as_bytes()));
    }
    if let Some(pem) = &config.public_key_pem {
        verifier = verifier.with_provider(inline_from_pem(pem)?);
    }
    if !config.jwks_urls.is_empty() {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build JWKS HTTP client")?;
        for url in &config.jwks_urls {
            verifier = verifier.with_provider(
                RemoteJwksProvider::new(JwksFetcher::with_client(client.clone(), url.clone()))
                    .with_cache_ttl(Duration::from_secs(config.jwks_cache_seconds)),
            );
        }
    }
    let verifier = verifier.build();

    info!(
        providers = verifier.resolver().len(),
        extractors = lookup.len(),
        reject_missing = config.reject.missing_token,
        reject_invalid = config.reject.invalid_token,
        context_field = config.extend_context.field_name(),
        "configured JWT authentication"
    );

    Ok(JwtAuth::builder(verifier)
        .lookup(lookup)
        .reject(config.reject)
        .extend_context(config.extend_context.clone())
        .metrics(metrics)
        .build())
}

fn inline_from_pem(pem: &str) -> Result<InlineKeyProvider> {
    let pem = pem.replace("\\n", "\n");
    InlineKeyProvider::from_rsa_pem(pem.as_bytes())
        .or_else(|_| InlineKeyProvider::from_ec_pem(pem.as_bytes()))
        .or_else(|_| InlineKeyProvider::from_ed_pem(pem.as_bytes()))
        .map_err(|err| anyhow!("JWT_PUBLIC_KEY_PEM is not a usable public key: {err}"))
}

pub fn build_router(state: AppState) -> Router {
    let graphql = Router::new()
        .route("/graphql", post(graphql))
        .layer(middleware::from_fn_with_state(state.auth.clone(), require_jwt));

    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics))
        .merge(graphql)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQlRequest {
    pub query: String,
    #[serde(default)]
    pub operation_name: Option<String>,
    #[serde(default)]
    pub variables: Option<Value>,
}

/// Stand-in for the GraphQL executor: reports the context it would be given.
async fn graphql(auth: Option<AuthContext>, Json(request): Json<GraphQlRequest>) -> Json<Value> {
    let context = auth
        .map(|context| context.to_value())
        .unwrap_or_else(|| json!({}));
    Json(json!({
        "data": null,
        "extensions": {
            "operationName": request.operation_name,
            "context": context,
        }
    }))
}

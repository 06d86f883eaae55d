//! Per-request authentication: find a token, verify it, apply the reject
//! policy and hand the claims to downstream handlers.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use common_observability::AuthMetrics;
use tracing::debug;

use crate::config::{ExtendContext, RejectPolicy};
use crate::error::AuthError;
use crate::extractors::AuthContext;
use crate::lookup::TokenLookup;
use crate::verifier::TokenVerifier;

/// Terminal state of one request's authentication.
#[derive(Debug)]
pub enum AuthOutcome {
    /// The token verified. Holds the context to attach unless extension is
    /// disabled.
    Verified(Option<AuthContext>),
    /// No usable token, and the reject policy lets the request through.
    Unverified,
    /// The request must not reach the resolvers.
    Rejected(AuthError),
}

impl AuthOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            AuthOutcome::Verified(_) => "verified",
            AuthOutcome::Unverified => "unverified",
            AuthOutcome::Rejected(_) => "rejected",
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, AuthOutcome::Verified(_))
    }
}

/// Immutable authentication setup shared by every request.
#[derive(Clone)]
pub struct JwtAuth {
    lookup: TokenLookup,
    verifier: Arc<dyn TokenVerifier>,
    reject: RejectPolicy,
    extend_context: ExtendContext,
    metrics: Option<AuthMetrics>,
}

impl JwtAuth {
    pub fn builder(verifier: impl TokenVerifier + 'static) -> JwtAuthBuilder {
        JwtAuthBuilder::new(Arc::new(verifier))
    }

    pub fn reject_policy(&self) -> RejectPolicy {
        self.reject
    }

    pub fn extend_context(&self) -> &ExtendContext {
        &self.extend_context
    }

    pub async fn authenticate(&self, parts: &Parts) -> AuthOutcome {
        let outcome = self.run(parts).await;
        if let Some(metrics) = &self.metrics {
            metrics.record_outcome(outcome.label());
        }
        outcome
    }

    async fn run(&self, parts: &Parts) -> AuthOutcome {
        let Some(token) = self.lookup.extract(parts) else {
            self.record_failure(&AuthError::MissingToken);
            if self.reject.missing_token {
                debug!("rejecting request without token");
                return AuthOutcome::Rejected(AuthError::MissingToken);
            }
            debug!("no token found, continuing unauthenticated");
            return AuthOutcome::Unverified;
        };

        match self.verifier.verify(&token.token).await {
            Ok(claims) => {
                let context = self
                    .extend_context
                    .field_name()
                    .map(|field| AuthContext {
                        field: field.to_string(),
                        claims,
                        token,
                    });
                AuthOutcome::Verified(context)
            }
            Err(err) => {
                self.record_failure(&err);
                if self.reject.invalid_token {
                    debug!(error = %err, detail = err.detail(), "rejecting request with invalid token");
                    AuthOutcome::Rejected(err)
                } else {
                    debug!(error = %err, detail = err.detail(), "ignoring invalid token");
                    AuthOutcome::Unverified
                }
            }
        }
    }

    fn record_failure(&self, err: &AuthError) {
        if let Some(metrics) = &self.metrics {
            metrics.record_failure(err.kind().as_str());
        }
    }
}

pub struct JwtAuthBuilder {
    lookup: TokenLookup,
    verifier: Arc<dyn TokenVerifier>,
    reject: RejectPolicy,
    extend_context: ExtendContext,
    metrics: Option<AuthMetrics>,
}

impl JwtAuthBuilder {
    fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            lookup: TokenLookup::default(),
            verifier,
            reject: RejectPolicy::default(),
            extend_context: ExtendContext::default(),
            metrics: None,
        }
    }

    pub fn lookup(mut self, lookup: TokenLookup) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn reject(mut self, reject: RejectPolicy) -> Self {
        self.reject = reject;
        self
    }

    pub fn extend_context(mut self, extend_context: impl Into<ExtendContext>) -> Self {
        self.extend_context = extend_context.into();
        self
    }

    pub fn metrics(mut self, metrics: AuthMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> JwtAuth {
        JwtAuth {
            lookup: self.lookup,
            verifier: self.verifier,
            reject: self.reject,
            extend_context: self.extend_context,
            metrics: self.metrics,
        }
    }
}

/// Axum middleware running [`JwtAuth::authenticate`] ahead of the handler.
///
/// Use with `axum::middleware::from_fn_with_state(Arc<JwtAuth>, require_jwt)`.
pub async fn require_jwt(
    State(auth): State<Arc<JwtAuth>>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();

    match auth.authenticate(&parts).await {
        AuthOutcome::Rejected(err) => return err.into_response(),
        AuthOutcome::Verified(Some(context)) => {
            parts.extensions.insert(context);
        }
        AuthOutcome::Verified(None) | AuthOutcome::Unverified => {}
    }

    next.run(Request::from_parts(parts, body)).await
}

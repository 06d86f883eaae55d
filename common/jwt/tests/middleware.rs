mod support;

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::header::WWW_AUTHENTICATE;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::{middleware, routing::post, Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use common_jwt::{
    require_jwt, AuthContext, CookieExtractor, HeaderExtractor, InlineKeyProvider, JwtAuth,
    JwtConfig, JwtVerifier, KeyError, RejectPolicy, SigningKeyProvider, TokenLookup,
};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde_json::{json, Value};
use support::{sign_hs256, SECRET};
use tower::ServiceExt;

struct Offline;

#[async_trait]
impl SigningKeyProvider for Offline {
    fn name(&self) -> &str {
        "offline"
    }

    async fn signing_key(&self, _kid: Option<&str>) -> Result<DecodingKey, KeyError> {
        Err(KeyError::JwksFetch("connection refused".into()))
    }
}

async fn graphql(auth: Option<AuthContext>) -> Json<Value> {
    Json(auth.map(|context| context.to_value()).unwrap_or(Value::Null))
}

fn app(auth: JwtAuth) -> Router {
    Router::new()
        .route("/graphql", post(graphql))
        .layer(middleware::from_fn_with_state(Arc::new(auth), require_jwt))
}

fn inline_verifier(config: JwtConfig) -> JwtVerifier {
    JwtVerifier::builder(config)
        .with_provider(InlineKeyProvider::from_secret(SECRET))
        .build()
}

fn request(authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri("/graphql");
    if let Some(value) = authorization {
        builder = builder.header("authorization", value);
    }
    builder.body(Body::from("{\"query\":\"{ me { id } }\"}")).unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn missing_token_is_rejected_with_challenge() {
    let app = app(JwtAuth::builder(inline_verifier(JwtConfig::default())).build());
    let response = app.oneshot(request(None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers().get(WWW_AUTHENTICATE).unwrap(), "Bearer");
    let body = json_body(response).await;
    assert_eq!(body["code"], json!("AUTH_REQUIRED"));
    assert_eq!(body["message"], json!("authentication required"));
}

#[tokio::test]
async fn missing_token_passes_through_when_allowed() {
    let app = app(
        JwtAuth::builder(inline_verifier(JwtConfig::default()))
            .reject(RejectPolicy {
                missing_token: false,
                invalid_token: true,
            })
            .build(),
    );
    let response = app.oneshot(request(None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, Value::Null);
}

#[tokio::test]
async fn verified_claims_reach_the_handler_under_custom_field() {
    let app = app(
        JwtAuth::builder(inline_verifier(JwtConfig::default()))
            .extend_context("userClaims")
            .build(),
    );
    let token = sign_hs256(&json!({ "sub": "u1" }));
    let response = app
        .oneshot(request(Some(&format!("Bearer {token}"))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["userClaims"]["sub"], json!("u1"));
}

#[tokio::test]
async fn malformed_token_is_bad_request() {
    let app = app(JwtAuth::builder(inline_verifier(JwtConfig::default())).build());
    let response = app
        .oneshot(request(Some("Bearer abc.def.ghi")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["message"], json!("invalid token"));
}

#[tokio::test]
async fn wrong_algorithm_is_unauthorized() {
    let app = app(
        JwtAuth::builder(inline_verifier(
            JwtConfig::default().with_algorithms([Algorithm::RS256]),
        ))
        .build(),
    );
    let token = sign_hs256(&json!({ "sub": "u1" }));
    let response = app
        .oneshot(request(Some(&format!("Bearer {token}"))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["message"], json!("unauthenticated"));
}

#[tokio::test]
async fn unsigned_token_is_unauthorized() {
    let app = app(JwtAuth::builder(inline_verifier(JwtConfig::default())).build());
    let token = format!(
        "{}.{}.",
        URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#),
        URL_SAFE_NO_PAD.encode(r#"{"sub":"u1"}"#)
    );
    let response = app
        .oneshot(request(Some(&format!("Bearer {token}"))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers().get("X-Error-Code").unwrap(), "AUTH_TOKEN");
}

#[tokio::test]
async fn key_outage_is_service_unavailable() {
    let verifier = JwtVerifier::builder(JwtConfig::default())
        .with_provider(Offline)
        .with_provider(Offline)
        .build();
    let app = app(JwtAuth::builder(verifier).build());
    let token = sign_hs256(&json!({ "sub": "u1" }));
    let response = app
        .oneshot(request(Some(&format!("Bearer {token}"))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        json_body(response).await["message"],
        json!("authentication not available")
    );
}

#[tokio::test]
async fn invalid_token_is_ignored_when_allowed() {
    let app = app(
        JwtAuth::builder(inline_verifier(JwtConfig::default()))
            .reject(RejectPolicy::permissive())
            .build(),
    );
    let response = app
        .oneshot(request(Some("Bearer abc.def.ghi")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, Value::Null);
}

#[tokio::test]
async fn cookie_lookup_is_tried_after_header() {
    let lookup = TokenLookup::new(vec![Arc::new(HeaderExtractor::bearer())])
        .then(CookieExtractor::new("session"));
    let app = app(
        JwtAuth::builder(inline_verifier(JwtConfig::default()))
            .lookup(lookup)
            .build(),
    );
    let token = sign_hs256(&json!({ "sub": "cookie-user" }));
    let request = Request::builder()
        .method("POST")
        .uri("/graphql")
        .header("cookie", format!("theme=dark; session={token}"))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["jwt"]["sub"], json!("cookie-user"));
}

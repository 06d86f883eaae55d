pub mod claims;
pub mod config;
pub mod error;
pub mod extractors;
pub mod jwks;
pub mod keys;
pub mod lookup;
pub mod plugin;
pub mod verifier;

pub use claims::{Audience, Claims};
pub use config::{ExtendContext, JwtConfig, RejectPolicy};
pub use error::{AuthError, AuthErrorKind, AuthResult, KeyError};
pub use extractors::AuthContext;
pub use jwks::{InMemoryKeyStore, JwksFetcher, RemoteJwksProvider};
pub use keys::{InlineKeyProvider, KeyResolver, SigningKeyProvider};
pub use lookup::{CookieExtractor, ExtractedToken, HeaderExtractor, TokenExtractor, TokenLookup};
pub use plugin::{require_jwt, AuthOutcome, JwtAuth, JwtAuthBuilder};
pub use verifier::{
    decode_unverified, JwtVerifier, JwtVerifierBuilder, TokenHeader, TokenVerifier, UnverifiedToken,
};

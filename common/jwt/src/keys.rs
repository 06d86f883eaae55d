use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use tracing::{debug, error, warn};

use crate::error::{AuthError, AuthResult, KeyError};

/// Source of key material used to check token signatures.
#[async_trait]
pub trait SigningKeyProvider: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    async fn signing_key(&self, kid: Option<&str>) -> Result<DecodingKey, KeyError>;
}

/// Always hands out the same key, whatever the token's `kid`.
#[derive(Clone)]
pub struct InlineKeyProvider {
    key: DecodingKey,
}

impl InlineKeyProvider {
    pub fn from_decoding_key(key: DecodingKey) -> Self {
        Self { key }
    }

    /// HMAC shared secret.
    pub fn from_secret(secret: &[u8]) -> Self {
        Self::from_decoding_key(DecodingKey::from_secret(secret))
    }

    pub fn from_rsa_pem(pem: &[u8]) -> Result<Self, KeyError> {
        DecodingKey::from_rsa_pem(pem)
            .map(Self::from_decoding_key)
            .map_err(|err| KeyError::KeyParse(err.to_string()))
    }

    pub fn from_ec_pem(pem: &[u8]) -> Result<Self, KeyError> {
        DecodingKey::from_ec_pem(pem)
            .map(Self::from_decoding_key)
            .map_err(|err| KeyError::KeyParse(err.to_string()))
    }

    pub fn from_ed_pem(pem: &[u8]) -> Result<Self, KeyError> {
        DecodingKey::from_ed_pem(pem)
            .map(Self::from_decoding_key)
            .map_err(|err| KeyError::KeyParse(err.to_string()))
    }
}

#[async_trait]
impl SigningKeyProvider for InlineKeyProvider {
    fn name(&self) -> &str {
        "inline"
    }

    async fn signing_key(&self, _kid: Option<&str>) -> Result<DecodingKey, KeyError> {
        Ok(self.key.clone())
    }
}

/// Tries signing key providers in order until one yields a key.
#[derive(Clone, Default)]
pub struct KeyResolver {
    providers: Vec<Arc<dyn SigningKeyProvider>>,
}

impl KeyResolver {
    pub fn new(providers: Vec<Arc<dyn SigningKeyProvider>>) -> Self {
        Self { providers }
    }

    pub fn with_provider(mut self, provider: impl SigningKeyProvider + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Providers are awaited one after another; a later provider is only
    /// asked once every earlier one has failed.
    pub async fn resolve(&self, kid: Option<&str>) -> AuthResult<DecodingKey> {
        for (position, provider) in self.providers.iter().enumerate() {
            match provider.signing_key(kid).await {
                Ok(key) => {
                    debug!(provider = provider.name(), position, ?kid, "resolved signing key");
                    return Ok(key);
                }
                Err(err) => {
                    warn!(
                        provider = provider.name(),
                        position,
                        ?kid,
                        error = %err,
                        "signing key provider failed"
                    );
                }
            }
        }

        error!(
            providers = self.providers.len(),
            ?kid,
            "no signing key available"
        );
        Err(AuthError::SigningKeyUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct Failing {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SigningKeyProvider for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn signing_key(&self, _kid: Option<&str>) -> Result<DecodingKey, KeyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(KeyError::Other("boom".into()))
        }
    }

    struct Counting {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SigningKeyProvider for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn signing_key(&self, _kid: Option<&str>) -> Result<DecodingKey, KeyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(DecodingKey::from_secret(b"secret"))
        }
    }

    #[tokio::test]
    async fn first_success_short_circuits() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let resolver = KeyResolver::default()
            .with_provider(Counting { calls: first.clone() })
            .with_provider(Counting { calls: second.clone() });

        resolver.resolve(Some("kid")).await.expect("key");
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failures_fall_through_to_next_provider() {
        let failures = Arc::new(AtomicUsize::new(0));
        let hits = Arc::new(AtomicUsize::new(0));
        let resolver = KeyResolver::default()
            .with_provider(Failing { calls: failures.clone() })
            .with_provider(Failing { calls: failures.clone() })
            .with_provider(Counting { calls: hits.clone() });

        resolver.resolve(None).await.expect("third provider answers");
        assert_eq!(failures.load(Ordering::SeqCst), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn provider_failures_are_logged_not_raised() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let failures = Arc::new(AtomicUsize::new(0));
        let resolver = KeyResolver::default()
            .with_provider(Failing { calls: failures.clone() })
            .with_provider(Failing { calls: failures.clone() })
            .with_provider(Counting { calls: Arc::new(AtomicUsize::new(0)) });

        assert!(resolver.resolve(Some("kid")).await.is_ok());

        let output = logs.contents();
        assert_eq!(output.matches("signing key provider failed").count(), 2);
        assert_eq!(output.matches("WARN").count(), 2);
        assert!(output.contains("boom"));
        assert!(!output.contains("no signing key available"));
    }

    #[tokio::test]
    async fn exhausted_providers_are_unavailable() {
        let failures = Arc::new(AtomicUsize::new(0));
        let resolver = KeyResolver::default()
            .with_provider(Failing { calls: failures.clone() })
            .with_provider(Failing { calls: failures.clone() });

        let err = resolver.resolve(Some("kid")).await.err().expect("no key");
        assert!(matches!(err, AuthError::SigningKeyUnavailable));
        assert_eq!(failures.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_resolver_is_unavailable() {
        let err = KeyResolver::default().resolve(None).await.err().expect("no key");
        assert!(matches!(err, AuthError::SigningKeyUnavailable));
    }

    #[tokio::test]
    async fn inline_provider_ignores_kid() {
        let provider = InlineKeyProvider::from_secret(b"secret");
        assert!(provider.signing_key(None).await.is_ok());
        assert!(provider.signing_key(Some("anything")).await.is_ok());
    }

    #[test]
    fn inline_provider_rejects_bad_pem() {
        let err = InlineKeyProvider::from_rsa_pem(b"not a pem").err().expect("parse error");
        assert!(matches!(err, KeyError::KeyParse(_)));
    }
}

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::KeyError;
use crate::keys::SigningKeyProvider;

/// Default lifetime of a fetched key set.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);
/// Lower bound between two fetches triggered by an unknown `kid`.
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(6);

/// Thread-safe store for decoding keys loaded from a JWKS.
#[derive(Clone, Default)]
pub struct InMemoryKeyStore {
    inner: Arc<RwLock<HashMap<String, DecodingKey>>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_key(&self, kid: impl Into<String>, key: DecodingKey) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.insert(kid.into(), key);
    }

    pub fn get(&self, kid: &str) -> Option<DecodingKey> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.get(kid).cloned()
    }

    pub fn contains(&self, kid: &str) -> bool {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.contains_key(kid)
    }

    pub fn len(&self) -> usize {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The only key in the store, for tokens that carry no `kid`.
    pub fn single(&self) -> Result<Option<DecodingKey>, KeyError> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        match guard.len() {
            0 => Ok(None),
            1 => Ok(guard.values().next().cloned()),
            count => Err(KeyError::AmbiguousKey(count)),
        }
    }

    pub fn replace_all<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (String, DecodingKey)>,
    {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.clear();
        for (kid, key) in entries.into_iter() {
            guard.insert(kid, key);
        }
    }
}

/// Downloads and decodes a JSON Web Key Set.
#[derive(Clone)]
pub struct JwksFetcher {
    client: Client,
    url: String,
}

impl JwksFetcher {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn fetch(&self) -> Result<Vec<(String, DecodingKey)>, KeyError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|err| KeyError::JwksFetch(err.to_string()))?;

        if !response.status().is_success() {
            return Err(KeyError::JwksFetch(format!(
                "HTTP {} from {}",
                response.status(),
                self.url
            )));
        }

        let body: JwksResponse = response
            .json()
            .await
            .map_err(|err| KeyError::JwksDecode(err.to_string()))?;

        Ok(decode_key_set(body))
    }
}

/// Keeps every signing key it can use and skips the rest.
fn decode_key_set(body: JwksResponse) -> Vec<(String, DecodingKey)> {
    let mut keys = Vec::new();
    for entry in body.keys.into_iter() {
        let Some(kid) = entry.kid.clone() else {
            debug!(kty = %entry.kty, "skipping JWKS entry without kid");
            continue;
        };

        if entry.key_use.as_deref().is_some_and(|usage| usage != "sig") {
            debug!(kid, "skipping JWKS entry not meant for signatures");
            continue;
        }

        match entry.decoding_key() {
            Ok(key) => keys.push((kid, key)),
            Err(err) => debug!(kid, error = %err, "skipping unusable JWKS entry"),
        }
    }
    keys
}

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<JwkEntry>,
}

#[derive(Debug, Deserialize)]
struct JwkEntry {
    kid: Option<String>,
    kty: String,
    #[serde(rename = "use")]
    key_use: Option<String>,
    crv: Option<String>,
    n: Option<String>,
    e: Option<String>,
    x: Option<String>,
    y: Option<String>,
}

impl JwkEntry {
    fn decoding_key(&self) -> Result<DecodingKey, KeyError> {
        let missing = || KeyError::KeyParse(format!("{} key missing components", self.kty));
        let parsed = match self.kty.as_str() {
            "RSA" => {
                let n = self.n.as_deref().ok_or_else(missing)?;
                let e = self.e.as_deref().ok_or_else(missing)?;
                DecodingKey::from_rsa_components(n, e)
            }
            "EC" => {
                let x = self.x.as_deref().ok_or_else(missing)?;
                let y = self.y.as_deref().ok_or_else(missing)?;
                DecodingKey::from_ec_components(x, y)
            }
            "OKP" if self.crv.as_deref().unwrap_or("Ed25519") == "Ed25519" => {
                let x = self.x.as_deref().ok_or_else(missing)?;
                DecodingKey::from_ed_components(x)
            }
            other => return Err(KeyError::KeyParse(format!("unsupported key type '{other}'"))),
        };
        parsed.map_err(|err| KeyError::KeyParse(err.to_string()))
    }
}

enum CacheLookup {
    Hit(DecodingKey),
    RateLimited,
    Stale,
}

/// Looks signing keys up in a remote JWKS, caching the set between fetches.
///
/// Lookups served from the cache never wait on a download. Refreshes are
/// serialised by `refresh_lock`, and a task that waited for it checks the
/// cache again before fetching.
pub struct RemoteJwksProvider {
    fetcher: JwksFetcher,
    store: InMemoryKeyStore,
    cache_ttl: Duration,
    min_refresh_interval: Duration,
    fetched_at: RwLock<Option<Instant>>,
    refresh_lock: Mutex<()>,
}

impl RemoteJwksProvider {
    pub fn new(fetcher: JwksFetcher) -> Self {
        Self {
            fetcher,
            store: InMemoryKeyStore::new(),
            cache_ttl: DEFAULT_CACHE_TTL,
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
            fetched_at: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn from_url(url: impl Into<String>) -> Self {
        Self::new(JwksFetcher::new(url))
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    pub fn store(&self) -> &InMemoryKeyStore {
        &self.store
    }

    pub fn url(&self) -> &str {
        self.fetcher.url()
    }

    fn cached(&self, kid: Option<&str>) -> Result<Option<DecodingKey>, KeyError> {
        match kid {
            Some(kid) => Ok(self.store.get(kid)),
            None => self.store.single(),
        }
    }

    fn last_fetch(&self) -> Option<Instant> {
        *self.fetched_at.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, kid: Option<&str>) -> Result<CacheLookup, KeyError> {
        let Some(at) = self.last_fetch() else {
            return Ok(CacheLookup::Stale);
        };
        let age = Instant::now().saturating_duration_since(at);
        if age >= self.cache_ttl {
            return Ok(CacheLookup::Stale);
        }
        if let Some(key) = self.cached(kid)? {
            return Ok(CacheLookup::Hit(key));
        }
        if age < self.min_refresh_interval {
            return Ok(CacheLookup::RateLimited);
        }
        Ok(CacheLookup::Stale)
    }

    async fn refresh(&self) -> Result<usize, KeyError> {
        let keys = self.fetcher.fetch().await?;
        let count = keys.len();
        if count > 0 {
            self.store.replace_all(keys);
        }
        *self.fetched_at.write().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        info!(url = self.fetcher.url(), count, "refreshed JWKS");
        Ok(count)
    }
}

#[async_trait]
impl SigningKeyProvider for RemoteJwksProvider {
    fn name(&self) -> &str {
        "jwks"
    }

    async fn signing_key(&self, kid: Option<&str>) -> Result<DecodingKey, KeyError> {
        let unknown = || KeyError::UnknownKeyId(kid.unwrap_or("<none>").to_string());

        match self.lookup(kid)? {
            CacheLookup::Hit(key) => return Ok(key),
            CacheLookup::RateLimited => {
                debug!(?kid, "kid not in cached JWKS, refresh rate limited");
                return Err(unknown());
            }
            CacheLookup::Stale => {}
        }

        let _refreshing = self.refresh_lock.lock().await;
        match self.lookup(kid)? {
            CacheLookup::Hit(key) => return Ok(key),
            CacheLookup::RateLimited => return Err(unknown()),
            CacheLookup::Stale => {}
        }

        self.refresh().await?;
        self.cached(kid)?.ok_or_else(unknown)
    }
}

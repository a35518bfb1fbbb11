use crate::error::{DatasetError, DatasetResult};
use image::DynamicImage;
use log::{debug, trace};
use std::collections::HashMap;
use std::io::Read;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of decoded images, keyed by URL.
///
/// Implementations must be shareable between the worker threads that load
/// samples of one batch in parallel.
pub trait Fetch: Send + Sync {
    fn fetch(&self, url: &str) -> DatasetResult<DynamicImage>;
}

impl<F: Fetch + ?Sized> Fetch for Box<F> {
    fn fetch(&self, url: &str) -> DatasetResult<DynamicImage> {
        (**self).fetch(url)
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Upper bound for a whole request, connect through body. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }
}

/// Decodes an in-memory image, sniffing the format from its content.
pub fn decode_image(url: &str, bytes: &[u8]) -> DatasetResult<DynamicImage> {
    image::load_from_memory(bytes).map_err(|source| DatasetError::Decode {
        url: url.to_string(),
        source,
    })
}

/// Blocking HTTP(S) fetcher. Every call is one GET, there is no retry.
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Self {
        let mut builder = ureq::AgentBuilder::new();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        Self {
            agent: builder.build(),
        }
    }

    pub fn fetch_bytes(&self, url: &str) -> DatasetResult<Vec<u8>> {
        let response = self.agent.get(url).call().map_err(|err| match err {
            ureq::Error::Status(status, _) => DatasetError::Status {
                url: url.to_string(),
                status,
            },
            transport => DatasetError::Network {
                url: url.to_string(),
                reason: transport.to_string(),
            },
        })?;
        if response.status() != 200 {
            return Err(DatasetError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }
        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|source| DatasetError::NetworkIo {
                url: url.to_string(),
                source,
            })?;
        trace!("received {} bytes from {}", bytes.len(), url);
        Ok(bytes)
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(&FetchConfig::default())
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> DatasetResult<DynamicImage> {
        let bytes = measure_time!(format!("GET {}", url), || self.fetch_bytes(url))?;
        decode_image(url, &bytes)
    }
}

/// Memoizes decoded images of an inner fetcher by URL.
///
/// Remote content is treated as immutable, so entries are never invalidated.
pub struct CachingFetcher<F> {
    inner: F,
    cache: Mutex<HashMap<String, DynamicImage>>,
}

impl<F: Fetch> CachingFetcher<F> {
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // a worker panicking mid-insert leaves the map itself intact
    fn lock(&self) -> MutexGuard<'_, HashMap<String, DynamicImage>> {
        match self.cache.lock() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<F: Fetch> Fetch for CachingFetcher<F> {
    fn fetch(&self, url: &str) -> DatasetResult<DynamicImage> {
        if let Some(image) = self.lock().get(url).cloned() {
            debug!("cache hit for {}", url);
            return Ok(image);
        }
        // not holding the lock while fetching
        let image = self.inner.fetch(url)?;
        self.lock().insert(url.to_string(), image.clone());
        Ok(image)
    }
}

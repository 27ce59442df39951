use std::future::Future;
use std::pin::pin;
use std::time::Duration;

use rand::Rng;
use reqwest::redirect::Policy;
use reqwest::{Client, Url};
use tokio::runtime::Builder;
use tracing::debug;
use wallconfig::FetchOptions;

use crate::{CancelToken, FetchError, FetchRequest, ImageSource, ShutdownGrace};

const MAX_REDIRECTS: usize = 10;
/// Upper bound (exclusive) of the cache-busting query value.
const NONCE_RANGE: u32 = 10_000_000;
/// Longest a transfer waits on the network before looking at its cancel token.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct PicsumConfig {
    pub endpoint: Url,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub shutdown_grace_iterations: u32,
}

impl PicsumConfig {
    pub fn from_options(options: &FetchOptions) -> Result<Self, FetchError> {
        let endpoint = Url::parse(options.endpoint.trim()).map_err(|err| {
            FetchError::InvalidRequest(format!("invalid endpoint '{}': {err}", options.endpoint))
        })?;
        if endpoint.cannot_be_a_base() {
            return Err(FetchError::InvalidRequest(format!(
                "endpoint '{endpoint}' cannot carry a path"
            )));
        }
        Ok(Self {
            endpoint,
            connect_timeout: options.connect_timeout,
            request_timeout: options.request_timeout,
            shutdown_grace_iterations: options.shutdown_grace_iterations,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PicsumClient {
    http: Client,
    config: PicsumConfig,
}

impl PicsumClient {
    pub fn new(config: PicsumConfig) -> Result<Self, FetchError> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .redirect(Policy::limited(MAX_REDIRECTS))
            // Every fetch gets its own runtime, so pooled connections would be orphaned.
            .pool_max_idle_per_host(0)
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &PicsumConfig {
        &self.config
    }

    /// `<endpoint>/<width>/<height>/?random&t=<nonce>`
    pub fn image_url(&self, request: &FetchRequest, nonce: u32) -> Result<Url, FetchError> {
        let mut url = self.config.endpoint.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                FetchError::InvalidRequest("endpoint cannot carry a path".to_string())
            })?;
            segments.pop_if_empty();
            segments.push(&request.width.to_string());
            segments.push(&request.height.to_string());
            segments.push("");
        }
        url.set_query(Some(&format!("random&t={nonce}")));
        Ok(url)
    }

    async fn transfer(
        &self,
        url: Url,
        buffer: &mut Vec<u8>,
        cancel: &CancelToken,
    ) -> Result<(), FetchError> {
        let mut grace = ShutdownGrace::new(self.config.shutdown_grace_iterations);
        let mut response =
            until_cancelled(self.http.get(url.clone()).send(), &mut grace, cancel).await??;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        if response.url() != &url {
            debug!(from = %url, to = %response.url(), "followed redirect");
        }

        let mut iterations = 0u64;
        while let Some(chunk) = until_cancelled(response.chunk(), &mut grace, cancel).await?? {
            buffer.extend_from_slice(&chunk);
            iterations += 1;
        }

        debug!(iterations, bytes = buffer.len(), "transfer finished");
        Ok(())
    }
}

/// Drives `future` in slices of [`POLL_INTERVAL`]. Once `cancel` fires, every
/// slice is charged against `grace` and the wait is abandoned when it runs out.
async fn until_cancelled<F: Future>(
    future: F,
    grace: &mut ShutdownGrace,
    cancel: &CancelToken,
) -> Result<F::Output, FetchError> {
    let mut future = pin!(future);
    loop {
        if !grace.allow(cancel.is_cancelled()) {
            debug!("aborting transfer after shutdown");
            return Err(FetchError::ShutdownAborted);
        }
        if let Ok(output) = tokio::time::timeout(POLL_INTERVAL, &mut future).await {
            return Ok(output);
        }
    }
}

impl ImageSource for PicsumClient {
    fn fetch_into(
        &self,
        request: &FetchRequest,
        buffer: &mut Vec<u8>,
        cancel: &CancelToken,
    ) -> Result<(), FetchError> {
        let nonce = rand::thread_rng().gen_range(0..NONCE_RANGE);
        let url = self.image_url(request, nonce)?;
        debug!(%url, "requesting random image");

        let runtime = Builder::new_current_thread().enable_all().build()?;
        let result = runtime.block_on(self.transfer(url, buffer, cancel));
        // A resolver thread stuck in getaddrinfo must not hold up the worker.
        runtime.shutdown_timeout(POLL_INTERVAL);
        result
    }
}

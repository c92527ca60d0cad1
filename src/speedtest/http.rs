//! In-process HTTP speed test against Cloudflare-style endpoints.
//!
//! `GET {base}/__down?bytes=N` streams N bytes back; `POST {base}/__up`
//! swallows the request body. The lowest-latency configured server is used
//! for a download phase and an upload phase, each bounded by a time budget.
//!
//! Some servers refuse aggressive transfer settings (too many parallel
//! streams, very large bodies). A 4xx response steps down to the next, more
//! conservative option set instead of failing the provider.

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::future::join_all;
use futures_util::{stream, Stream, StreamExt};
use reqwest::{Body, Client};
use thiserror::Error;

use super::{MeasurementProvider, Unavailable};
use crate::config::ServerConfig;
use crate::constants::{
    HTTP_DOWNLOAD_SIZES, HTTP_LATENCY_TIMEOUT_SECS, HTTP_PARALLEL_STREAMS, HTTP_PHASE_BUDGET_SECS,
    HTTP_REQUEST_TIMEOUT_SECS, HTTP_UPLOAD_SIZES,
};
use crate::models::{Throughput, BITS_PER_MEGABIT};

const NAME: &str = "http";

/// Upload bodies are handed to the connection in slices of this size.
const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

/// Parallelism and buffering for one transfer attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOptions {
    pub streams: usize,
    /// Build every upload body once up front instead of per request.
    pub pre_allocate: bool,
}

const DOWNLOAD_LADDER: &[TransferOptions] = &[
    TransferOptions {
        streams: HTTP_PARALLEL_STREAMS,
        pre_allocate: false,
    },
    TransferOptions {
        streams: 1,
        pre_allocate: false,
    },
];

const UPLOAD_LADDER: &[TransferOptions] = &[
    TransferOptions {
        streams: HTTP_PARALLEL_STREAMS,
        pre_allocate: true,
    },
    TransferOptions {
        streams: 1,
        pre_allocate: true,
    },
    TransferOptions {
        streams: 1,
        pre_allocate: false,
    },
];

#[derive(Debug, Clone, Error, PartialEq)]
enum TransferError {
    /// The server refused this option set; a reduced one may work.
    #[error("server rejected transfer (HTTP {0})")]
    Rejected(u16),
    #[error("{0}")]
    Failed(String),
}

impl From<reqwest::Error> for TransferError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) if status.is_client_error() => TransferError::Rejected(status.as_u16()),
            _ => TransferError::Failed(e.to_string()),
        }
    }
}

pub struct HttpSpeedProvider {
    client: Client,
    servers: Vec<ServerConfig>,
    phase_budget: Duration,
}

impl HttpSpeedProvider {
    pub fn new(servers: Vec<ServerConfig>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                log::warn!("[SPEEDTEST] HTTP client setup failed, using defaults: {}", e);
                Client::new()
            });
        Self {
            client,
            servers,
            phase_budget: Duration::from_secs(HTTP_PHASE_BUDGET_SECS),
        }
    }

    /// Round-trip time of a zero-byte download, or `None` if unreachable.
    async fn latency(&self, server: &ServerConfig) -> Option<Duration> {
        let url = format!("{}/__down?bytes=0", server.base_url.trim_end_matches('/'));
        let started = Instant::now();
        let request = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(HTTP_LATENCY_TIMEOUT_SECS))
            .send();
        match request.await.and_then(|r| r.error_for_status()) {
            Ok(_) => Some(started.elapsed()),
            Err(e) => {
                log::debug!("latency probe to {} failed: {}", server.name, e);
                None
            }
        }
    }

    async fn best_server(&self) -> Option<&ServerConfig> {
        let mut best: Option<(&ServerConfig, Duration)> = None;
        for server in &self.servers {
            if let Some(rtt) = self.latency(server).await {
                let faster = match best {
                    Some((_, current)) => rtt < current,
                    None => true,
                };
                if faster {
                    best = Some((server, rtt));
                }
            }
        }
        best.map(|(server, rtt)| {
            log::info!(
                "[SPEEDTEST] Best server: {} ({} ms)",
                server.name,
                rtt.as_millis()
            );
            server
        })
    }

    async fn download(&self, base: &str, opts: TransferOptions) -> Result<f64, TransferError> {
        let started = Instant::now();
        let deadline = started + self.phase_budget;
        let streams = (0..opts.streams.max(1)).map(|_| self.download_stream(base, deadline));
        let bytes = sum_streams(join_all(streams).await)?;
        rate(bytes, started.elapsed())
    }

    async fn download_stream(&self, base: &str, deadline: Instant) -> Result<u64, TransferError> {
        let mut moved = 0u64;
        for size in HTTP_DOWNLOAD_SIZES.iter().cycle() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let url = format!("{}/__down?bytes={}", base, size);
            let response = match tokio::time::timeout(remaining, self.client.get(&url).send()).await {
                Ok(r) => r?.error_for_status()?,
                Err(_) => break,
            };
            let mut body = response.bytes_stream();
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match tokio::time::timeout(remaining, body.next()).await {
                    Ok(Some(chunk)) => moved += chunk?.len() as u64,
                    Ok(None) => break,
                    Err(_) => return Ok(moved),
                }
            }
        }
        Ok(moved)
    }

    async fn upload(&self, base: &str, opts: TransferOptions) -> Result<f64, TransferError> {
        let payloads: Option<Vec<Bytes>> = opts
            .pre_allocate
            .then(|| HTTP_UPLOAD_SIZES.iter().map(|s| payload(*s)).collect());
        let started = Instant::now();
        let deadline = started + self.phase_budget;
        let streams = (0..opts.streams.max(1))
            .map(|_| self.upload_stream(base, deadline, payloads.as_deref()));
        let bytes = sum_streams(join_all(streams).await)?;
        rate(bytes, started.elapsed())
    }

    async fn upload_stream(
        &self,
        base: &str,
        deadline: Instant,
        payloads: Option<&[Bytes]>,
    ) -> Result<u64, TransferError> {
        let url = format!("{}/__up", base);
        // Counts bytes as the connection pulls them, so a request cut off
        // by the deadline still contributes what it sent
        let moved = Arc::new(AtomicU64::new(0));
        for (i, size) in HTTP_UPLOAD_SIZES.iter().enumerate().cycle() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let data = match payloads {
                Some(p) => p[i].clone(),
                None => payload(*size),
            };
            let body = Body::wrap_stream(counted_chunks(data, Arc::clone(&moved)));
            match tokio::time::timeout(remaining, self.client.post(&url).body(body).send()).await {
                Ok(r) => {
                    r?.error_for_status()?;
                }
                Err(_) => break,
            }
        }
        Ok(moved.load(Ordering::Relaxed))
    }
}

#[async_trait]
impl MeasurementProvider for HttpSpeedProvider {
    fn name(&self) -> &str {
        NAME
    }

    async fn measure(&self) -> Result<Throughput, Unavailable> {
        log::info!("[SPEEDTEST] Backend: http ({} servers)", self.servers.len());
        let server = self
            .best_server()
            .await
            .ok_or_else(|| Unavailable::new(NAME, "no speed test server reachable"))?;
        let base = server.base_url.trim_end_matches('/');

        let down = with_ladder("download", DOWNLOAD_LADDER, |opts| self.download(base, opts))
            .await
            .map_err(|e| Unavailable::new(NAME, format!("download: {}", e)))?;
        let up = with_ladder("upload", UPLOAD_LADDER, |opts| self.upload(base, opts))
            .await
            .map_err(|e| Unavailable::new(NAME, format!("upload: {}", e)))?;

        Ok(Throughput {
            down_mbps: down,
            up_mbps: up,
        })
    }
}

/// Try each option set in order, stepping down only on a server rejection.
async fn with_ladder<F, Fut>(
    phase: &str,
    ladder: &[TransferOptions],
    mut attempt: F,
) -> Result<f64, TransferError>
where
    F: FnMut(TransferOptions) -> Fut,
    Fut: Future<Output = Result<f64, TransferError>>,
{
    let mut last = TransferError::Failed("no transfer options".into());
    for opts in ladder {
        match attempt(*opts).await {
            Ok(mbps) => return Ok(mbps),
            Err(TransferError::Rejected(status)) => {
                log::info!(
                    "[SPEEDTEST] {} rejected with {:?} (HTTP {}), reducing",
                    phase,
                    opts,
                    status
                );
                last = TransferError::Rejected(status);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last)
}

fn sum_streams(results: Vec<Result<u64, TransferError>>) -> Result<u64, TransferError> {
    results.into_iter().try_fold(0u64, |acc, r| Ok(acc + r?))
}

/// Bytes moved over `elapsed`, in Mb/s.
fn rate(bytes: u64, elapsed: Duration) -> Result<f64, TransferError> {
    if bytes == 0 {
        return Err(TransferError::Failed("no data transferred".into()));
    }
    let secs = elapsed.as_secs_f64().max(1e-6);
    Ok(bytes as f64 * 8.0 / secs / BITS_PER_MEGABIT)
}

fn payload(size: usize) -> Bytes {
    Bytes::from(vec![0u8; size])
}

/// `data` as a stream of slices, adding each slice to `counter` as it is polled.
fn counted_chunks(
    data: Bytes,
    counter: Arc<AtomicU64>,
) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static {
    let slices: Vec<Bytes> = (0..data.len())
        .step_by(UPLOAD_CHUNK_BYTES)
        .map(|start| data.slice(start..(start + UPLOAD_CHUNK_BYTES).min(data.len())))
        .collect();
    stream::iter(slices).map(move |slice| {
        counter.fetch_add(slice.len() as u64, Ordering::Relaxed);
        Ok(slice)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn ladder_steps_down_on_rejection() {
        let seen = Mutex::new(Vec::new());
        let result = with_ladder("upload", UPLOAD_LADDER, |opts| {
            seen.lock().unwrap().push(opts);
            let outcome = if opts.streams > 1 {
                Err(TransferError::Rejected(413))
            } else {
                Ok(42.0)
            };
            async move { outcome }
        })
        .await;
        assert_eq!(result, Ok(42.0));
        assert_eq!(*seen.lock().unwrap(), UPLOAD_LADDER[..2].to_vec());
    }

    #[tokio::test]
    async fn ladder_stops_on_hard_failure() {
        let calls = Mutex::new(0);
        let result = with_ladder("download", DOWNLOAD_LADDER, |_| {
            *calls.lock().unwrap() += 1;
            async { Err(TransferError::Failed("connection reset".into())) }
        })
        .await;
        assert!(matches!(result, Err(TransferError::Failed(_))));
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn ladder_exhausted_reports_last_rejection() {
        let result = with_ladder("download", DOWNLOAD_LADDER, |_| async {
            Err(TransferError::Rejected(429))
        })
        .await;
        assert_eq!(result, Err(TransferError::Rejected(429)));
    }

    #[test]
    fn ladders_reduce_parallelism() {
        assert_eq!(DOWNLOAD_LADDER[0].streams, HTTP_PARALLEL_STREAMS);
        assert_eq!(DOWNLOAD_LADDER.last().map(|o| o.streams), Some(1));
        assert!(UPLOAD_LADDER[0].pre_allocate);
        assert!(!UPLOAD_LADDER[2].pre_allocate);
    }

    #[test]
    fn rate_converts_bytes_to_megabits() {
        let mbps = rate(1_250_000, Duration::from_secs(1)).unwrap();
        assert!((mbps - 10.0).abs() < 1e-9);
        assert!(rate(0, Duration::from_secs(1)).is_err());
    }

    #[test]
    fn sum_streams_fails_if_any_stream_fails() {
        assert_eq!(sum_streams(vec![Ok(1), Ok(2)]), Ok(3));
        assert!(sum_streams(vec![Ok(1), Err(TransferError::Rejected(413))]).is_err());
    }

    #[tokio::test]
    async fn upload_bytes_count_as_they_are_pulled() {
        let counter = Arc::new(AtomicU64::new(0));
        let data = payload(3 * UPLOAD_CHUNK_BYTES + 10);
        let mut chunks = Box::pin(counted_chunks(data, Arc::clone(&counter)));

        assert_eq!(counter.load(Ordering::Relaxed), 0);
        chunks.next().await.unwrap().unwrap();
        chunks.next().await.unwrap().unwrap();
        // A body abandoned here has still sent two slices
        assert_eq!(counter.load(Ordering::Relaxed), 2 * UPLOAD_CHUNK_BYTES as u64);

        let rest: Vec<_> = chunks.collect().await;
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[1].as_ref().unwrap().len(), 10);
        assert_eq!(
            counter.load(Ordering::Relaxed),
            3 * UPLOAD_CHUNK_BYTES as u64 + 10
        );
    }

    #[tokio::test]
    async fn no_reachable_server_is_unavailable() {
        let provider = HttpSpeedProvider::new(Vec::new());
        let err = provider.measure().await.unwrap_err();
        assert_eq!(err.provider, "http");
    }
}

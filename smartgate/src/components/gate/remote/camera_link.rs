use crate::error::GateError;
use crate::utils::clock::{Clock, MonotonicClock};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{ffi::OsStr, path::Path, time::Duration};
use uuid::Uuid;

/// Local throttle on outbound capture requests. A request inside the
/// window is rejected here, before any network I/O happens; this is
/// backpressure on the camera module, not an error.
#[derive(Debug)]
pub struct CaptureThrottle {
    last_request_ms: Option<u64>,
    min_interval_ms: u64,
}

impl CaptureThrottle {
    pub fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request_ms: None,
            min_interval_ms,
        }
    }

    /// Permit a request at `now_ms` and record it, or reject it when the
    /// minimum interval since the previous permitted request has not yet
    /// elapsed.
    pub fn permit(&mut self, now_ms: u64) -> bool {
        if let Some(last_ms) = self.last_request_ms {
            if now_ms.saturating_sub(last_ms) < self.min_interval_ms {
                return false;
            }
        }
        self.last_request_ms = Some(now_ms);
        true
    }
}

/// Result of a capture request. Throttled is deliberately distinct from
/// failed so a caller can tell local backpressure from a genuine fault on
/// the camera module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The camera module acknowledged the capture.
    Accepted,
    /// Rejected locally inside the throttle window, no network I/O.
    Throttled,
    /// The camera module answered with a non success status, or could
    /// not be reached at all.
    Failed { code: Option<u16> },
}

/// Configuration for the camera link component.
#[derive(Deserialize, Serialize, PartialEq, Eq, Debug, Clone)]
pub struct CameraLinkConfig {
    /// Host (and optional port) of the companion camera module.
    host: String,
    /// Timeout on capture requests. Generous because the module writes
    /// the frame to its card before answering.
    #[serde(default = "CameraLinkConfig::default_capture_timeout_ms")]
    capture_timeout_ms: u64,
    /// Timeout on status requests.
    #[serde(default = "CameraLinkConfig::default_status_timeout_ms")]
    status_timeout_ms: u64,
    /// Short timeout used only for the reachability probe.
    #[serde(default = "CameraLinkConfig::default_probe_timeout_ms")]
    probe_timeout_ms: u64,
    /// Minimum spacing between outbound capture requests.
    #[serde(default = "CameraLinkConfig::default_min_capture_interval_ms")]
    min_capture_interval_ms: u64,
    /// Timeout on full image transfers, only used when the image relay
    /// feature is compiled in.
    #[serde(default = "CameraLinkConfig::default_stream_timeout_ms")]
    stream_timeout_ms: u64,
}

impl CameraLinkConfig {
    /// Create a camera link config with the default timeouts.
    ///
    /// * `host`: network address of the camera module.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            capture_timeout_ms: Self::default_capture_timeout_ms(),
            status_timeout_ms: Self::default_status_timeout_ms(),
            probe_timeout_ms: Self::default_probe_timeout_ms(),
            min_capture_interval_ms: Self::default_min_capture_interval_ms(),
            stream_timeout_ms: Self::default_stream_timeout_ms(),
        }
    }

    /// Build the config by reading a file, this is a helper function.
    ///
    /// * `filepath`: path to config.
    pub fn from_file<F: AsRef<OsStr>>(filepath: F) -> Self {
        let file = Path::new(&filepath);
        if file.is_file() {
            let config_file = config::Config::builder()
                .add_source(config::File::new(
                    &file.to_string_lossy(),
                    config::FileFormat::Yaml,
                ))
                .build()
                .expect("Failed read config");

            config_file
                .try_deserialize::<CameraLinkConfig>()
                .expect("Failed to parse config file into struct")
        } else {
            panic!("Could not locate the config file {:?}", file);
        }
    }

    fn default_capture_timeout_ms() -> u64 {
        10_000
    }

    fn default_status_timeout_ms() -> u64 {
        5_000
    }

    fn default_probe_timeout_ms() -> u64 {
        3_000
    }

    fn default_min_capture_interval_ms() -> u64 {
        2_000
    }

    fn default_stream_timeout_ms() -> u64 {
        15_000
    }
}

/// HTTP client component for the companion camera module. Every request
/// carries its own timeout so a stalled module can never hang the
/// controller beyond a few seconds, and reqwest returns the connection to
/// its pool on every exit path.
pub struct CameraLink {
    /// Unique identifier, helpful for trouble shooting and logging.
    uuid: Uuid,
    config: CameraLinkConfig,
    http: reqwest::Client,
    throttle: CaptureThrottle,
    clock: Box<dyn Clock>,
}

impl CameraLink {
    /// Create a camera link by consuming a config.
    ///
    /// * `config`: host and timeout parameters.
    pub fn new(config: CameraLinkConfig) -> Self {
        let throttle = CaptureThrottle::new(config.min_capture_interval_ms);
        Self {
            uuid: Uuid::new_v4(),
            config,
            http: reqwest::Client::new(),
            throttle,
            clock: Box::new(MonotonicClock::new()),
        }
    }

    /// Create a camera link by reading the config parameters from a file.
    ///
    /// * `filepath`: path to config file.
    pub fn from_config_file<F: AsRef<OsStr>>(filepath: F) -> Self {
        Self::new(CameraLinkConfig::from_file(filepath))
    }

    /// Replace the time source, used by tests to drive the throttle.
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Return the unique identifier of the camera link.
    pub fn get_uuid(&self) -> Uuid {
        self.uuid
    }

    /// Current camera module host.
    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// Point the link at a different camera module at runtime.
    pub fn set_host(&mut self, host: impl Into<String>) {
        self.config.host = host.into();
        log::info!("camera link {} host updated to {}", self.uuid, self.config.host);
    }

    /// Ask the camera module to capture a photo to its own storage. A
    /// request inside the throttle window returns
    /// [`CaptureOutcome::Throttled`] without touching the network; remote
    /// faults are reported, never escalated.
    pub async fn request_capture(&mut self) -> CaptureOutcome {
        let now_ms = self.clock.now_ms();
        if !self.throttle.permit(now_ms) {
            log::debug!("camera link {}: capture request too soon, skipping", self.uuid);
            return CaptureOutcome::Throttled;
        }

        let url = format!("http://{}/capture", self.config.host);
        let response = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .timeout(Duration::from_millis(self.config.capture_timeout_ms))
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                log::info!("camera link {}: capture acknowledged", self.uuid);
                CaptureOutcome::Accepted
            }
            Ok(response) => {
                let fault = GateError::RemoteError(response.status().as_u16());
                log::warn!("camera link {}: capture failed, {fault}", self.uuid);
                CaptureOutcome::Failed {
                    code: Some(response.status().as_u16()),
                }
            }
            Err(e) => {
                let fault = GateError::RemoteUnreachable(e.to_string());
                log::warn!("camera link {}: capture failed, {fault}", self.uuid);
                CaptureOutcome::Failed { code: None }
            }
        }
    }

    /// Fetch the status document of the camera module. A fault comes back
    /// as an error document in the same shape, never as a crash.
    pub async fn remote_status(&self) -> serde_json::Value {
        let url = format!("http://{}/status", self.config.host);
        let response = self
            .http
            .get(&url)
            .timeout(Duration::from_millis(self.config.status_timeout_ms))
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => response
                .json()
                .await
                .unwrap_or_else(|e| json!({ "error": e.to_string() })),
            Ok(response) => json!({
                "error": "camera module not reachable",
                "code": response.status().as_u16(),
            }),
            Err(e) => json!({ "error": e.to_string() }),
        }
    }

    /// Probe whether the camera module answers at all, with the shortest
    /// of the timeouts.
    pub async fn is_reachable(&self) -> bool {
        let url = format!("http://{}/status", self.config.host);
        let response = self
            .http
            .get(&url)
            .timeout(Duration::from_millis(self.config.probe_timeout_ms))
            .send()
            .await;

        matches!(response, Ok(response) if response.status().is_success())
    }

    /// Pull a full image payload off the camera module. Ferrying image
    /// bodies through the controller can exhaust its memory, which is why
    /// this path only exists behind the image relay feature.
    #[cfg(feature = "image-relay")]
    pub async fn request_photo_data(&mut self) -> Result<Vec<u8>, GateError> {
        let now_ms = self.clock.now_ms();
        if !self.throttle.permit(now_ms) {
            log::debug!("camera link {}: image request too soon, skipping", self.uuid);
            return Err(GateError::RemoteUnreachable(String::from(
                "image request inside throttle window",
            )));
        }

        let url = format!("http://{}/stream", self.config.host);
        let response = self
            .http
            .get(&url)
            .timeout(Duration::from_millis(self.config.stream_timeout_ms))
            .send()
            .await
            .map_err(|e| GateError::RemoteUnreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GateError::RemoteError(response.status().as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| GateError::RemoteUnreachable(e.to_string()))?;
        log::info!(
            "camera link {}: image payload received, {} bytes",
            self.uuid,
            body.len()
        );
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_file_path;
    use crate::utils::clock::ManualClock;
    use rstest::rstest;
    use serial_test::serial;
    use std::{
        fs::OpenOptions,
        net::SocketAddr,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    #[rstest]
    #[case(&[(0, true), (1999, false), (2000, true)])]
    #[case(&[(0, true), (500, false), (2500, true), (2600, false)])]
    #[case(&[(100, true), (2099, false), (2100, true)])]
    fn test_capture_throttle_window(#[case] schedule: &[(u64, bool)]) {
        let mut throttle = CaptureThrottle::new(2_000);
        for (now_ms, expected) in schedule {
            assert_eq!(
                throttle.permit(*now_ms),
                *expected,
                "Wrong verdict at t={now_ms}"
            );
        }
    }

    /// Minimal HTTP stub standing in for the camera module. Counts the
    /// requests it actually receives so tests can prove the throttle
    /// rejected a request without any network I/O.
    async fn stub_camera(status_line: &'static str, body: &'static str) -> (SocketAddr, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind stub camera");
        let addr = listener.local_addr().expect("Failed to read stub address");
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            loop {
                let (mut socket, _) = match listener.accept().await {
                    Ok(connection) => connection,
                    Err(_) => break,
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let mut request = [0u8; 1024];
                let _ = socket.read(&mut request).await;
                let response = format!(
                    "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        (addr, hits)
    }

    fn link_for(addr: SocketAddr) -> (CameraLink, ManualClock) {
        let clock = ManualClock::new();
        let link = CameraLink::new(CameraLinkConfig::new(addr.to_string()))
            .with_clock(Box::new(clock.clone()));
        (link, clock)
    }

    #[tokio::test]
    async fn test_capture_accepted_by_camera() {
        let (addr, hits) = stub_camera("200 OK", "{}").await;
        let (mut link, _clock) = link_for(addr);

        assert_eq!(link.request_capture().await, CaptureOutcome::Accepted);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    /// The second request inside the throttle window must be rejected
    /// locally: the stub camera sees exactly one request.
    async fn test_second_capture_inside_window_does_no_network_io() {
        let (addr, hits) = stub_camera("200 OK", "{}").await;
        let (mut link, clock) = link_for(addr);

        assert_eq!(link.request_capture().await, CaptureOutcome::Accepted);
        clock.advance(1_000);
        assert_eq!(link.request_capture().await, CaptureOutcome::Throttled);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        clock.advance(1_000);
        assert_eq!(link.request_capture().await, CaptureOutcome::Accepted);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_capture_failure_reports_status_code() {
        let (addr, _hits) = stub_camera("500 Internal Server Error", "{}").await;
        let (mut link, _clock) = link_for(addr);

        assert_eq!(
            link.request_capture().await,
            CaptureOutcome::Failed { code: Some(500) }
        );
    }

    #[tokio::test]
    async fn test_capture_against_unreachable_module() {
        // Nothing listens on the reserved discard port.
        let (mut link, _clock) = link_for("127.0.0.1:9".parse().expect("Bad address"));

        assert_eq!(
            link.request_capture().await,
            CaptureOutcome::Failed { code: None }
        );
    }

    #[tokio::test]
    async fn test_remote_status_passes_document_through() {
        let (addr, _hits) = stub_camera("200 OK", r#"{"sd_free_mb": 512}"#).await;
        let (link, _clock) = link_for(addr);

        let status = link.remote_status().await;
        assert_eq!(status["sd_free_mb"], 512);
    }

    #[tokio::test]
    async fn test_remote_status_failure_becomes_error_document() {
        let (addr, _hits) = stub_camera("503 Service Unavailable", "").await;
        let (link, _clock) = link_for(addr);

        let status = link.remote_status().await;
        assert_eq!(status["code"], 503);
        assert!(status["error"].is_string());
    }

    #[tokio::test]
    async fn test_reachability_probe() {
        let (addr, _hits) = stub_camera("200 OK", "{}").await;
        let (link, _clock) = link_for(addr);
        assert!(link.is_reachable().await);

        let (unreachable, _clock) = link_for("127.0.0.1:9".parse().expect("Bad address"));
        assert!(!unreachable.is_reachable().await);
    }

    #[tokio::test]
    async fn test_set_host_redirects_requests() {
        let (first, first_hits) = stub_camera("200 OK", "{}").await;
        let (second, second_hits) = stub_camera("200 OK", "{}").await;
        let (mut link, clock) = link_for(first);

        link.request_capture().await;
        clock.advance(2_000);
        link.set_host(second.to_string());
        link.request_capture().await;

        assert_eq!(first_hits.load(Ordering::SeqCst), 1);
        assert_eq!(second_hits.load(Ordering::SeqCst), 1);
    }

    #[cfg(feature = "image-relay")]
    #[tokio::test]
    async fn test_image_relay_returns_body_bytes() {
        let (addr, _hits) = stub_camera("200 OK", "notjpegbutbytes").await;
        let (mut link, _clock) = link_for(addr);

        let body = link.request_photo_data().await.expect("Failed to fetch image");
        assert_eq!(body, b"notjpegbutbytes");
    }

    #[test]
    #[serial]
    fn test_write_component_config_to_file() {
        let config = CameraLinkConfig::new("10.244.250.144");

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(test_file_path!(
                "/config/components/gate/remote/camera_link.yaml"
            ))
            .expect("Failed to open file");
        serde_yaml::to_writer(file, &config).expect("Failed to write yaml");

        let read_config = CameraLinkConfig::from_file(test_file_path!(
            "/config/components/gate/remote/camera_link.yaml"
        ));
        assert_eq!(config, read_config, "Failed to read write camera config");
    }
}

//! One capture: fetch → decode → encode → persist → emit.
//!
//! Every invocation emits exactly one measurement, whatever stage it
//! stopped at.  Stages that never ran leave their fields out of the
//! record instead of reporting zero.

use std::fs::{DirBuilder, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{NaiveDateTime, Utc};
use tracing::{debug, error, info, warn};

use ipeye_common::config::CaptureConfig;
use ipeye_common::metric::{Measurement, MetricSink};

use crate::codec::{self, SourceFormat};
use crate::error::{CaptureError, Severity};
use crate::fetch::Fetch;
use crate::timing::Timed;

pub const MEASUREMENT: &str = "ipcamera";

/// What one capture measured before it finished or failed.
#[derive(Debug)]
pub struct CaptureResult {
    pub tick: NaiveDateTime,
    pub output_path: PathBuf,
    pub request_time: Option<Duration>,
    pub status_code: Option<u16>,
    pub status: Option<String>,
    pub content_type: Option<String>,
    pub content_length: Option<usize>,
    pub decode_time: Option<Duration>,
    pub encode_time: Option<Duration>,
    pub output_size: Option<usize>,
    pub error: Option<CaptureError>,
}

impl CaptureResult {
    fn new(tick: NaiveDateTime, output_path: PathBuf) -> Self {
        Self {
            tick,
            output_path,
            request_time: None,
            status_code: None,
            status: None,
            content_type: None,
            content_length: None,
            decode_time: None,
            encode_time: None,
            output_size: None,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn to_measurement(&self, config: &CaptureConfig) -> Measurement {
        let mut m = Measurement::new(MEASUREMENT);
        for (key, value) in &config.extra_tags {
            m.add_tag(key, value);
        }
        m.add_tag("camera_name", &config.name)
            .add_tag("ipaddress", &config.ip_address());

        if let Some(status) = &self.status {
            m.add_tag("RequestStatus", status);
        }
        if let Some(content_type) = &self.content_type {
            m.add_tag("Content-Type", content_type);
        }
        if let Some(err) = &self.error {
            m.add_tag("FailureKind", err.kind());
        }

        if let Some(t) = self.request_time {
            m.add_float("RequestTime_s", t.as_secs_f64());
        }
        if let Some(code) = self.status_code {
            m.add_int("RequestStatusCode", i64::from(code));
        }
        if let Some(len) = self.content_length {
            m.add_int("RequestContentLength_b", len as i64);
        }
        if let Some(t) = self.decode_time {
            m.add_float("DecodeTime_s", t.as_secs_f64());
        }
        if let Some(t) = self.encode_time {
            m.add_float("EncodeTime_s", t.as_secs_f64());
        }
        if let Some(size) = self.output_size {
            m.add_int("OutputSize_b", size as i64);
        }
        m.add_bool("Success", self.is_success());
        m
    }
}

/// Runs captures against one camera with process-wide collaborators.
pub struct CaptureJob<'a> {
    config: &'a CaptureConfig,
    fetcher: &'a dyn Fetch,
    sink: &'a dyn MetricSink,
}

impl<'a> CaptureJob<'a> {
    pub fn new(config: &'a CaptureConfig, fetcher: &'a dyn Fetch, sink: &'a dyn MetricSink) -> Self {
        Self {
            config,
            fetcher,
            sink,
        }
    }

    /// Capture the image for `tick` (local wall-clock time).
    pub fn run(&self, tick: NaiveDateTime) -> CaptureResult {
        let mut result = CaptureResult::new(tick, self.config.output_path(tick));

        match self.execute(&mut result) {
            Ok(()) => info!("Wrote {}", result.output_path.display()),
            Err(e) => {
                match e.severity() {
                    Severity::Soft => warn!("Capture for {tick} failed: {e}"),
                    Severity::Hard => error!("Capture for {tick} failed: {e}"),
                }
                result.error = Some(e);
            }
        }

        self.emit(&result);
        result
    }

    fn execute(&self, result: &mut CaptureResult) -> Result<(), CaptureError> {
        let fetched = Timed::measure(|| self.fetcher.fetch(&self.config.url));
        result.request_time = Some(fetched.elapsed);
        let resp = fetched.value?;

        info!("{}", resp.status);
        if !resp.is_success() {
            warn!("Camera answered {} for {}", resp.status, self.config.url);
        }
        result.status_code = Some(resp.status_code);
        result.status = Some(resp.status.clone());
        result.content_type = resp.content_type.clone();
        result.content_length = Some(resp.body.len());

        let content_type = resp.content_type.as_deref().unwrap_or_default();
        let format = match SourceFormat::from_content_type(content_type) {
            SourceFormat::Supported(format) => format,
            SourceFormat::Unsupported(content_type) => {
                return Err(CaptureError::UnsupportedFormat(content_type))
            }
        };

        let decoded = codec::decode(&resp.body, format);
        result.decode_time = Some(decoded.elapsed);
        let image = decoded.value?;
        debug!(
            "Decoded {}x{} image in {:?}",
            image.width(),
            image.height(),
            decoded.elapsed
        );

        let encoded = codec::encode(&image, self.config.output_format);
        result.encode_time = Some(encoded.elapsed);
        let bytes = encoded.value?;
        result.output_size = Some(bytes.len());

        persist(&result.output_path, &bytes)
    }

    fn emit(&self, result: &CaptureResult) {
        let mut measurement = result.to_measurement(self.config);
        measurement.set_timestamp(Utc::now());
        match self.sink.write(&measurement) {
            Ok(()) => info!("Wrote {}", measurement.to_line_protocol()),
            Err(e) => warn!("Cannot send measurement: {e:#}"),
        }
    }
}

// ── persistence ──────────────────────────────────────────────────────────

/// Write `bytes` to `path` via a sibling temporary file and a rename, so a
/// crash never leaves a truncated image under the final name.
pub fn persist(path: &Path, bytes: &[u8]) -> Result<(), CaptureError> {
    let fail = |source: std::io::Error| CaptureError::Persist {
        path: path.to_path_buf(),
        source,
    };

    if let Some(dir) = path.parent() {
        create_dirs(dir).map_err(fail)?;
    }

    let tmp = tmp_path(path);
    if let Err(e) = write_file(&tmp, bytes).and_then(|()| std::fs::rename(&tmp, path)) {
        std::fs::remove_file(&tmp).ok();
        return Err(fail(e));
    }
    Ok(())
}

fn create_dirs(dir: &Path) -> std::io::Result<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o775);
    }
    builder.create(dir)
}

fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o664);
    }
    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

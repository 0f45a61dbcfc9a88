//! Test doubles shared by the capture modules.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use url::Url;

use ipeye_common::config::{self, CaptureConfig, OutputFormat};
use ipeye_common::metric::{Measurement, MetricSink};

use crate::error::CaptureError;
use crate::fetch::{Fetch, FetchResponse};

pub fn test_config(output_dir: &Path, format: OutputFormat) -> CaptureConfig {
    let map: HashMap<String, String> = [
        ("URL", "http://camera.local:8080/snapshot"),
        ("NAME", "cam01"),
        ("EXTRA_TAGS", "site=barn"),
        ("INTERVAL", "10m"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let mut config = config::from_map(&map).unwrap();
    config.output_dir = output_dir.to_path_buf();
    config.output_format = format;
    config
}

pub fn png_response(width: u32, height: u32) -> FetchResponse {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 77]));
    let mut body = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut body, ImageFormat::Png)
        .unwrap();
    FetchResponse {
        status_code: 200,
        status: "200 OK".into(),
        content_type: Some("image/png".into()),
        body: body.into_inner(),
    }
}

pub fn gif_response() -> FetchResponse {
    FetchResponse {
        status_code: 200,
        status: "200 OK".into(),
        content_type: Some("image/gif".into()),
        body: b"GIF89a".to_vec(),
    }
}

/// Answers every request with the same response, or the same transport error.
pub struct FakeFetcher {
    response: Result<FetchResponse, String>,
}

impl FakeFetcher {
    pub fn responding(response: FetchResponse) -> Self {
        Self {
            response: Ok(response),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            response: Err(message.to_string()),
        }
    }
}

impl Fetch for FakeFetcher {
    fn fetch(&self, _url: &Url) -> Result<FetchResponse, CaptureError> {
        self.response.clone().map_err(CaptureError::Network)
    }
}

/// Keeps every measurement written to it.
#[derive(Default)]
pub struct RecordingSink {
    measurements: RefCell<Vec<Measurement>>,
    broken: bool,
}

impl RecordingSink {
    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }

    pub fn measurements(&self) -> Vec<Measurement> {
        self.measurements.borrow().clone()
    }
}

impl MetricSink for RecordingSink {
    fn write(&self, measurement: &Measurement) -> anyhow::Result<()> {
        if self.broken {
            anyhow::bail!("telegraf unreachable");
        }
        self.measurements.borrow_mut().push(measurement.clone());
        Ok(())
    }
}

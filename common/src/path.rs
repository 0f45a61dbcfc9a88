//! Output path derivation.
//!
//! Images land in an hour-granular tree so no single directory grows
//! without bound:
//!
//! ```text
//! <root>/2024/2024_03/2024_03_05/2024_03_05_14/<name>_2024_03_05_14_22_00_00.tiff
//! ```

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::config::{CaptureConfig, OutputFormat};

/// Nested directory levels, outermost first.
const DIRECTORY_LAYOUT: [&str; 4] = ["%Y", "%Y_%m", "%Y_%m_%d", "%Y_%m_%d_%H"];

/// Timestamp embedded in each file name.
const TIMESTAMP_FORM: &str = "%Y_%m_%d_%H_%M_%S";

/// Sequence slot within a tick; only one shot per tick is taken.
const SEQUENCE: &str = "00";

/// Path for the image captured at `tick`.
pub fn output_path(root: &Path, name: &str, tick: NaiveDateTime, format: OutputFormat) -> PathBuf {
    let mut path = root.to_path_buf();
    for level in DIRECTORY_LAYOUT {
        path.push(tick.format(level).to_string());
    }
    path.push(format!(
        "{name}_{}_{SEQUENCE}.{}",
        tick.format(TIMESTAMP_FORM),
        format.extension()
    ));
    path
}

impl CaptureConfig {
    pub fn output_path(&self, tick: NaiveDateTime) -> PathBuf {
        output_path(&self.output_dir, &self.name, tick, self.output_format)
    }
}

//! Shared pieces of the ipeye camera capture daemon: configuration,
//! output path layout and metric records.

pub mod config;
pub mod metric;
pub mod path;

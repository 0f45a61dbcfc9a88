//! Fire-and-forget UDP transport for measurements.
//!
//! The target is resolved on every write so a telegraf container that
//! comes up after us, or moves, is still found.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use anyhow::{Context, Result};

use ipeye_common::metric::{Measurement, MetricSink};

pub struct UdpSink {
    host: String,
    v4: UdpSocket,
    v6: Option<UdpSocket>,
}

impl UdpSink {
    pub fn new(host: &str) -> Result<Self> {
        let v4 = UdpSocket::bind(("0.0.0.0", 0)).context("Cannot bind UDP socket")?;
        let v6 = UdpSocket::bind(("::", 0)).ok();
        Ok(Self {
            host: host.to_string(),
            v4,
            v6,
        })
    }
}

impl MetricSink for UdpSink {
    fn write(&self, measurement: &Measurement) -> Result<()> {
        let addr = self
            .host
            .to_socket_addrs()
            .with_context(|| format!("Cannot resolve {}", self.host))?
            .next()
            .with_context(|| format!("No address for {}", self.host))?;

        let socket = match addr {
            SocketAddr::V4(_) => &self.v4,
            SocketAddr::V6(_) => self.v6.as_ref().context("No IPv6 socket available")?,
        };

        let mut line = measurement.to_line_protocol();
        line.push('\n');
        socket
            .send_to(line.as_bytes(), addr)
            .with_context(|| format!("Cannot send measurement to {addr}"))?;
        Ok(())
    }
}

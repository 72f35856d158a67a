use anyhow::{anyhow, Context, Result};
use std::net::{SocketAddr, UdpSocket};

use super::{Dispatcher, WaveMetrics};

const ADDRESS_PREFIX: &str = "/wave";

/// Sends each metric as a single-float OSC message over UDP.
pub struct OscDispatcher {
    socket: UdpSocket,
    target: SocketAddr,
}

impl OscDispatcher {
    pub fn connect(addr: &str) -> Result<Self> {
        let target: SocketAddr = addr
            .parse()
            .map_err(|_| anyhow!("invalid OSC target address {}", addr))?;
        let bind = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind).context("bind OSC socket")?;
        log::info!("OSC dispatcher sending to {}", target);
        Ok(Self { socket, target })
    }
}

impl Dispatcher for OscDispatcher {
    fn name(&self) -> &'static str {
        "osc"
    }

    fn dispatch(&mut self, metrics: &WaveMetrics) -> Result<()> {
        for (key, value) in metrics.entries() {
            let address = format!("{}/{}", ADDRESS_PREFIX, key);
            let packet = encode_osc_float(&address, value as f32);
            self.socket
                .send_to(&packet, self.target)
                .with_context(|| format!("send OSC {} to {}", address, self.target))?;
        }
        Ok(())
    }
}

/// Encode an OSC 1.0 message carrying one `float32` argument.
pub fn encode_osc_float(address: &str, value: f32) -> Vec<u8> {
    let mut out = Vec::with_capacity(address.len() + 12);
    push_padded(&mut out, address.as_bytes());
    push_padded(&mut out, b",f");
    out.extend_from_slice(&value.to_be_bytes());
    out
}

/// OSC strings are NUL-terminated and padded to a multiple of four bytes.
fn push_padded(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(bytes);
    let pad = 4 - bytes.len() % 4;
    out.extend(std::iter::repeat(0u8).take(pad));
}

use std::io;

use sysinfo::Networks;

use crate::models::ByteCounters;

/// Source of cumulative sent/received byte counters.
pub trait CounterSource: Send {
    /// Read the current cumulative counters.
    fn read(&mut self) -> io::Result<ByteCounters>;
}

/// Reads counters from the OS via sysinfo, summed over non-loopback interfaces.
pub struct SysinfoCounters {
    networks: Networks,
}

impl SysinfoCounters {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

impl Default for SysinfoCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterSource for SysinfoCounters {
    fn read(&mut self) -> io::Result<ByteCounters> {
        self.networks.refresh();

        if self.networks.iter().next().is_none() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "no network interfaces reported",
            ));
        }

        let mut counters = ByteCounters::default();
        for (name, data) in self.networks.iter() {
            if is_loopback(name) {
                continue;
            }
            counters.sent = counters.sent.saturating_add(data.total_transmitted());
            counters.received = counters.received.saturating_add(data.total_received());
        }
        Ok(counters)
    }
}

fn is_loopback(name: &str) -> bool {
    name == "lo" || name.starts_with("lo0") || name.to_lowercase().contains("loopback")
}

// File: testing-framework/src/orchestrator/ports.rs
//
// Port allocation
//
// Every node needs distinct RPC and P2P ports. Ports are handed out in
// increasing order from a base, skipping anything another process already
// holds on the loopback interface.

use std::net::{Ipv4Addr, TcpListener};

use log::debug;
use parking_lot::Mutex;
use rand::Rng;

use crate::error::{HarnessError, Result};

/// Lowest base picked by `PortAllocator::random`
pub const RANDOM_BASE_MIN: u16 = 11_000;
/// Highest base picked by `PortAllocator::random`
pub const RANDOM_BASE_MAX: u16 = 40_000;

/// Hands out unused loopback ports
///
/// One allocator is shared by every environment of a run so concurrent
/// environments never collide. Allocation is monotonic: a port is never
/// handed out twice by the same allocator.
#[derive(Debug)]
pub struct PortAllocator {
    next: Mutex<u32>,
}

impl PortAllocator {
    /// Start allocating at `base`
    pub fn new(base: u16) -> Self {
        Self {
            next: Mutex::new(u32::from(base)),
        }
    }

    /// Start at a random base so parallel runs on one host rarely overlap
    pub fn random() -> Self {
        let base = rand::thread_rng().gen_range(RANDOM_BASE_MIN..=RANDOM_BASE_MAX);
        Self::new(base)
    }

    /// Next port that can currently be bound on 127.0.0.1
    pub fn next_port(&self) -> Result<u16> {
        let mut next = self.next.lock();
        loop {
            let candidate = u16::try_from(*next)
                .map_err(|_| HarnessError::Config("port range exhausted".to_string()))?;
            *next += 1;
            if is_port_free(candidate) {
                debug!("Allocated port {}", candidate);
                return Ok(candidate);
            }
            debug!("Port {} is busy, skipping", candidate);
        }
    }

    /// Allocate `count` ports in one go
    pub fn next_ports(&self, count: usize) -> Result<Vec<u16>> {
        (0..count).map(|_| self.next_port()).collect()
    }
}

fn is_port_free(port: u16) -> bool {
    TcpListener::bind((Ipv4Addr::LOCALHOST, port)).is_ok()
}

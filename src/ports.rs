//! # Port allocation for backend servers.
//!
//! [`PortAllocator`] hands out unique listening ports from declared ranges
//! and reclaims them on release.
//!
//! ## Rules
//! - A port stays taken from acquisition until explicit [`release`](PortAllocator::release),
//!   even if the acquiring spawn transaction later fails — releasing is the
//!   transaction's responsibility.
//! - [`acquire_in_range`](PortAllocator::acquire_in_range) returns the
//!   smallest free port; the per-port insert is atomic, so two concurrent
//!   callers can never be handed the same port.
//! - Release is idempotent.

use dashmap::DashSet;

use crate::error::{OrchestratorError, Result};

/// Set of taken ports shared by static and dynamic allocation.
pub struct PortAllocator {
    taken: DashSet<u16>,
}

impl PortAllocator {
    /// Creates an allocator with no ports taken.
    pub fn new() -> Self {
        Self {
            taken: DashSet::new(),
        }
    }

    /// Acquires the smallest free port in `[lo, hi]` (inclusive).
    ///
    /// Errors with [`OrchestratorError::PortsExhausted`] when every port in
    /// the range is taken.
    pub fn acquire_in_range(&self, lo: u16, hi: u16) -> Result<u16> {
        for port in lo..=hi {
            // insert() returns true only for the caller that newly inserted
            // the key, so the smallest-free scan is race-free per port.
            if self.taken.insert(port) {
                return Ok(port);
            }
        }
        Err(OrchestratorError::PortsExhausted { lo, hi })
    }

    /// Acquires a specific port, used for static servers with fixed ports.
    ///
    /// Returns `false` if the port was already taken.
    pub fn acquire(&self, port: u16) -> bool {
        self.taken.insert(port)
    }

    /// Releases a port back to the pool. Idempotent.
    pub fn release(&self, port: u16) {
        self.taken.remove(&port);
    }

    /// True if the port is currently taken.
    pub fn is_taken(&self, port: u16) -> bool {
        self.taken.contains(&port)
    }

    /// Number of currently taken ports.
    pub fn taken_count(&self) -> usize {
        self.taken.len()
    }

    /// Number of free ports remaining in `[lo, hi]`.
    pub fn free_in_range(&self, lo: u16, hi: u16) -> usize {
        (lo..=hi).filter(|p| !self.taken.contains(p)).count()
    }
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hands_out_smallest_free_port() {
        let alloc = PortAllocator::new();
        assert_eq!(alloc.acquire_in_range(6100, 6200).unwrap(), 6100);
        assert_eq!(alloc.acquire_in_range(6100, 6200).unwrap(), 6101);
        alloc.release(6100);
        assert_eq!(alloc.acquire_in_range(6100, 6200).unwrap(), 6100);
    }

    #[test]
    fn exhaustion_is_an_error() {
        let alloc = PortAllocator::new();
        assert_eq!(alloc.acquire_in_range(6100, 6101).unwrap(), 6100);
        assert_eq!(alloc.acquire_in_range(6100, 6101).unwrap(), 6101);
        let err = alloc.acquire_in_range(6100, 6101).unwrap_err();
        assert_eq!(err.as_label(), "ports_exhausted");
    }

    #[test]
    fn specific_acquisition_conflicts() {
        let alloc = PortAllocator::new();
        assert!(alloc.acquire(6000));
        assert!(!alloc.acquire(6000));
        alloc.release(6000);
        assert!(alloc.acquire(6000));
    }

    #[test]
    fn release_is_idempotent() {
        let alloc = PortAllocator::new();
        assert!(alloc.acquire(6005));
        alloc.release(6005);
        alloc.release(6005);
        assert!(!alloc.is_taken(6005));
        assert_eq!(alloc.taken_count(), 0);
    }

    #[test]
    fn free_in_range_counts_holes() {
        let alloc = PortAllocator::new();
        alloc.acquire(6101);
        alloc.acquire(6103);
        assert_eq!(alloc.free_in_range(6100, 6104), 3);
    }
}

//! `DeviceMetrics`, validation, and the bounded `Ring` history (§3, §4.4).

use crate::device::DeviceId;
use std::collections::VecDeque;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceMetrics {
    pub device_id: DeviceId,
    pub timestamp_ms: u64,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
    pub compute_util_pct: f32,
    pub temperature_c: Option<f32>,
    pub power_w: Option<f32>,
    pub clock_mhz: Option<u32>,
    pub is_throttling: bool,
}

/// Absolute zero, in Celsius; samples must never report below it (§3).
pub const ABSOLUTE_ZERO_C: f32 = -273.15;

impl DeviceMetrics {
    /// Validate the §3 sample invariants. Invalid samples must be dropped
    /// before they enter the event stream (§4.4), never panic.
    pub fn is_valid(&self) -> bool {
        if self.memory_used_bytes > self.memory_total_bytes {
            return false;
        }
        if !(0.0..=100.0).contains(&self.compute_util_pct) {
            return false;
        }
        if let Some(t) = self.temperature_c {
            if t <= ABSOLUTE_ZERO_C {
                return false;
            }
        }
        true
    }
}

/// Fixed-capacity FIFO with O(1) append and auto-eviction of the oldest
/// sample on overflow (§3 `TelemetryHistory`, §9 redesign note against
/// unbounded-list history).
#[derive(Debug, Clone)]
pub struct Ring<T> {
    capacity: usize,
    buf: VecDeque<T>,
}

impl<T> Ring<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring capacity must be positive");
        Ring {
            capacity,
            buf: VecDeque::with_capacity(capacity),
        }
    }

    /// Push a new sample, evicting the oldest if at capacity. O(1) amortized.
    pub fn push(&mut self, item: T) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&T> {
        self.buf.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buf.iter()
    }
}

pub type TelemetryHistory = Ring<DeviceMetrics>;

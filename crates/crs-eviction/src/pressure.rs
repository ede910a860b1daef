//! Memory-pressure sensing.
//!
//! A [`PressureSource`] reports free headroom as a fraction in `[0.0, 1.0]`.
//! The level is derived against a configured threshold:
//!
//! - **Normal** (headroom ≥ threshold): standard weights and batch floor
//! - **Elevated** (threshold/2 ≤ headroom < threshold): pressure weights,
//!   relaxed second pass allowed
//! - **Critical** (headroom < threshold/2): pressure weights, relaxed from
//!   the first pass

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

/// Memory-pressure level derived from headroom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PressureLevel {
    Normal = 0,
    Elevated = 1,
    Critical = 2,
}

impl PressureLevel {
    /// Classify `headroom` against `threshold` (both fractions).
    #[must_use]
    pub fn from_headroom(headroom: f64, threshold: f64) -> Self {
        if headroom >= threshold {
            Self::Normal
        } else if headroom >= threshold / 2.0 {
            Self::Elevated
        } else {
            Self::Critical
        }
    }

    /// Whether pressure-mode scoring applies.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Normal)
    }

    /// Bytes that must be freed from a tier of `capacity` to bring
    /// `headroom` back up to `threshold`.
    #[must_use]
    pub fn bytes_below_threshold(capacity: u64, headroom: f64, threshold: f64) -> u64 {
        if headroom >= threshold {
            return 0;
        }
        ((threshold - headroom) * capacity as f64).ceil() as u64
    }
}

impl std::fmt::Display for PressureLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Pluggable source of memory headroom.
pub trait PressureSource: Send + Sync {
    /// Free fraction of the monitored memory, in `[0.0, 1.0]`.
    fn headroom_fraction(&self) -> f64;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Headroom set by hand. Used by tests and by embedders that have their own
/// memory accounting.
#[derive(Debug)]
pub struct SimulatedPressure {
    headroom_bits: AtomicU64,
}

impl SimulatedPressure {
    pub fn new(headroom: f64) -> Self {
        Self {
            headroom_bits: AtomicU64::new(headroom.clamp(0.0, 1.0).to_bits()),
        }
    }

    pub fn set(&self, headroom: f64) {
        self.headroom_bits
            .store(headroom.clamp(0.0, 1.0).to_bits(), Ordering::SeqCst);
    }
}

impl Default for SimulatedPressure {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl PressureSource for SimulatedPressure {
    fn headroom_fraction(&self) -> f64 {
        f64::from_bits(self.headroom_bits.load(Ordering::SeqCst))
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

/// System-wide headroom from `/proc/meminfo` (`MemAvailable / MemTotal`).
///
/// Reports full headroom where the file is unavailable, so non-Linux hosts
/// simply never enter pressure mode from this source.
#[derive(Debug, Clone)]
pub struct SystemMemoryPressure {
    meminfo: PathBuf,
}

impl SystemMemoryPressure {
    pub fn new() -> Self {
        Self {
            meminfo: PathBuf::from("/proc/meminfo"),
        }
    }

    /// Read from an alternative meminfo-formatted file.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            meminfo: path.into(),
        }
    }
}

impl Default for SystemMemoryPressure {
    fn default() -> Self {
        Self::new()
    }
}

impl PressureSource for SystemMemoryPressure {
    fn headroom_fraction(&self) -> f64 {
        match fs::read_to_string(&self.meminfo) {
            Ok(text) => match parse_meminfo(&text) {
                Some((total, available)) if total > 0 => {
                    (available as f64 / total as f64).clamp(0.0, 1.0)
                }
                _ => {
                    debug!(path = ?self.meminfo, "meminfo lacks MemTotal/MemAvailable");
                    1.0
                }
            },
            Err(e) => {
                debug!(path = ?self.meminfo, error = %e, "meminfo unreadable");
                1.0
            }
        }
    }

    fn name(&self) -> &'static str {
        "system"
    }
}

/// Extract `(MemTotal, MemAvailable)` in kB.
fn parse_meminfo(text: &str) -> Option<(u64, u64)> {
    let mut total = None;
    let mut available = None;
    for line in text.lines() {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("MemTotal:") => total = parts.next().and_then(|v| v.parse().ok()),
            Some("MemAvailable:") => available = parts.next().and_then(|v| v.parse().ok()),
            _ => {}
        }
    }
    Some((total?, available?))
}

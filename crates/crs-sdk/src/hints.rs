use std::time::Duration;

use crs_types::PayloadFormat;

/// Optional per-entry hints supplied at ingestion.
///
/// Anything left unset falls back to the store configuration or the content
/// kind's defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreHints {
    /// Declared unit count, e.g. tokens.
    pub unit_count: Option<u64>,
    pub format: Option<PayloadFormat>,
    /// Overrides the configured default TTL.
    pub ttl: Option<Duration>,
    /// Overrides the configured durable kinds for this entry.
    pub durable: Option<bool>,
}

impl StoreHints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unit_count(mut self, units: u64) -> Self {
        self.unit_count = Some(units);
        self
    }

    pub fn with_format(mut self, format: PayloadFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_durable(mut self, durable: bool) -> Self {
        self.durable = Some(durable);
        self
    }
}

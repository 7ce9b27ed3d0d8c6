//! Peer configuration.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::node::Timestamp;

/// Default detection buffer around an AOI.
///
/// Rough estimate: average speed × 3 hops from detection to discovery × 2
/// for two nodes heading straight at each other.
pub const AOI_DETECTION_BUFFER: f64 = 32.0;

/// Multiplier on the detection buffer when deciding a neighbor no longer overlaps.
pub const NONOVERLAP_MULTIPLIER: f64 = 1.25;

/// Which neighbors get a discovery check on each maintenance pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscoveryMode {
    /// Only neighbors that sent a boundary MOVE since the last pass.
    #[default]
    Requesters,
    /// Every known neighbor, every pass.
    AllNeighbors,
}

/// Which of our own neighbors are evaluated for each checked neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscoveryScope {
    /// Our enclosing neighbors.
    #[default]
    EnclosingOnly,
    /// Everything in the neighbor directory.
    AllNeighbors,
}

/// Optional pruning of discovery notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscoveryPruning {
    #[default]
    None,
    /// Only announce neighbors on our right-hand side when facing the
    /// checked neighbor. Halves traffic when both sides run the check, at the
    /// cost of slower discovery when only one does.
    RightHandSide,
}

/// Configuration for a VON peer.
#[derive(Debug, Clone)]
pub struct VonConfig {
    /// Buffer added to AOI radii in relevance checks.
    pub aoi_buffer: f64,

    /// Extra tolerance applied to `aoi_buffer` before evicting a neighbor.
    pub nonoverlap_multiplier: f64,

    /// How long a neighbor may stay irrelevant before it is dropped.
    pub drop_grace: Duration,

    /// A neighbor silent for longer than this is no longer timely.
    /// Self re-announces its position after half of it.
    pub timely_period: Duration,

    /// Use exact site-in-circle overlap instead of the tolerant cell test.
    pub strict_aoi: bool,

    pub discovery_mode: DiscoveryMode,
    pub discovery_scope: DiscoveryScope,
    pub discovery_pruning: DiscoveryPruning,
}

impl Default for VonConfig {
    fn default() -> Self {
        Self {
            aoi_buffer: AOI_DETECTION_BUFFER,
            nonoverlap_multiplier: NONOVERLAP_MULTIPLIER,
            drop_grace: Duration::from_secs(2),
            timely_period: Duration::from_secs(60),
            strict_aoi: false,
            discovery_mode: DiscoveryMode::default(),
            discovery_scope: DiscoveryScope::default(),
            discovery_pruning: DiscoveryPruning::default(),
        }
    }
}

impl VonConfig {
    /// Config that checks every neighbor on every pass. Chattier, converges faster.
    #[must_use]
    pub fn exhaustive() -> Self {
        Self {
            discovery_mode: DiscoveryMode::AllNeighbors,
            discovery_scope: DiscoveryScope::AllNeighbors,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_aoi_buffer(mut self, buffer: f64) -> Self {
        self.aoi_buffer = buffer;
        self
    }

    #[must_use]
    pub fn with_nonoverlap_multiplier(mut self, multiplier: f64) -> Self {
        self.nonoverlap_multiplier = multiplier;
        self
    }

    #[must_use]
    pub fn with_drop_grace(mut self, grace: Duration) -> Self {
        self.drop_grace = grace;
        self
    }

    #[must_use]
    pub fn with_timely_period(mut self, period: Duration) -> Self {
        self.timely_period = period;
        self
    }

    #[must_use]
    pub fn with_strict_aoi(mut self, strict: bool) -> Self {
        self.strict_aoi = strict;
        self
    }

    #[must_use]
    pub fn with_discovery_mode(mut self, mode: DiscoveryMode) -> Self {
        self.discovery_mode = mode;
        self
    }

    #[must_use]
    pub fn with_discovery_scope(mut self, scope: DiscoveryScope) -> Self {
        self.discovery_scope = scope;
        self
    }

    #[must_use]
    pub fn with_discovery_pruning(mut self, pruning: DiscoveryPruning) -> Self {
        self.discovery_pruning = pruning;
        self
    }

    /// Reject values the protocol can't work with.
    pub fn validate(&self) -> Result<()> {
        if !self.aoi_buffer.is_finite() || self.aoi_buffer < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "aoi_buffer must be finite and non-negative, got {}",
                self.aoi_buffer
            )));
        }
        if !self.nonoverlap_multiplier.is_finite() || self.nonoverlap_multiplier < 1.0 {
            return Err(Error::InvalidConfig(format!(
                "nonoverlap_multiplier must be at least 1.0, got {}",
                self.nonoverlap_multiplier
            )));
        }
        if self.timely_period.is_zero() {
            return Err(Error::InvalidConfig("timely_period must be non-zero".into()));
        }
        Ok(())
    }

    /// Buffer used when deciding whether to evict.
    pub fn eviction_buffer(&self) -> f64 {
        self.aoi_buffer * self.nonoverlap_multiplier
    }

    /// Whether overlap checks run in tolerant mode.
    pub fn tolerant_overlap(&self) -> bool {
        !self.strict_aoi
    }
}

/// Convert a wall-clock window into timestamp units.
pub fn to_timestamp_units(window: Duration, timestamps_per_second: u64) -> Timestamp {
    let units = window.as_millis().saturating_mul(timestamps_per_second as u128) / 1000;
    units.min(Timestamp::MAX as u128) as Timestamp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = VonConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.aoi_buffer, 32.0);
        assert_eq!(config.eviction_buffer(), 40.0);
        assert!(config.tolerant_overlap());
    }

    #[test]
    fn builder_overrides() {
        let config = VonConfig::default()
            .with_aoi_buffer(10.0)
            .with_strict_aoi(true)
            .with_discovery_mode(DiscoveryMode::AllNeighbors)
            .with_drop_grace(Duration::from_millis(500));
        assert_eq!(config.aoi_buffer, 10.0);
        assert!(!config.tolerant_overlap());
        assert_eq!(config.discovery_mode, DiscoveryMode::AllNeighbors);
        assert_eq!(config.drop_grace, Duration::from_millis(500));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(VonConfig::default().with_aoi_buffer(-1.0).validate().is_err());
        assert!(VonConfig::default().with_nonoverlap_multiplier(0.5).validate().is_err());
        assert!(VonConfig::default()
            .with_timely_period(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn durations_convert_to_ticks() {
        assert_eq!(to_timestamp_units(Duration::from_secs(2), 10), 20);
        assert_eq!(to_timestamp_units(Duration::from_millis(250), 1000), 250);
        assert_eq!(to_timestamp_units(Duration::from_secs(60), 10), 600);
    }
}

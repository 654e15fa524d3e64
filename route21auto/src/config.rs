//!
//! # Routing Configuration
//!
//! Everything the engine reads as a knob rather than derives from the
//! design: saturation thresholds, the global-length threshold, reserved
//! edge tracks, and the negotiation/ripup limits.
//!

// Crates.io
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

// Local Imports
use crate::error::{AutoError, AutoResult};
use crate::gauge::RoutingGauge;
use route21db::{DbUnits, Dir, Technology};

/// Per-category ripup allowances before a segment is declared failed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RipupLimits {
    pub strap: u32,
    pub global_short: u32,
    pub global_long: u32,
    pub local: u32,
}
impl Default for RipupLimits {
    fn default() -> Self {
        Self {
            strap: 16,
            global_short: 16,
            global_long: 5,
            local: 9,
        }
    }
}

/// # Configuration
#[derive(Debug, Clone, Serialize, Deserialize, Builder, PartialEq)]
#[builder(default)]
pub struct Configuration {
    /// GCell density above which the grid reports saturation
    pub saturate_ratio: f64,
    /// Routing-pad count above which a gcell is RP-saturated
    pub saturate_rp: u32,
    /// Minimal length for a segment to be flagged global
    pub global_length_threshold: DbUnits,
    /// Name of the highest usable routing layer; caps `allowed_depth`
    pub top_routing_layer: Option<String>,
    /// Highest usable routing depth, resolved against the gauge
    pub allowed_depth: u8,
    /// Tracks reserved for local routing on each horizontal edge
    pub h_edge_reserved_local: u32,
    /// Tracks reserved for local routing on each vertical edge
    pub v_edge_reserved_local: u32,
    /// Hard ceiling on negotiation events
    pub events_limit: u64,
    /// Ripup allowances
    pub ripup_limits: RipupLimits,
}
impl Default for Configuration {
    fn default() -> Self {
        Self {
            saturate_ratio: 0.80,
            saturate_rp: 8,
            global_length_threshold: DbUnits(0),
            top_routing_layer: None,
            allowed_depth: 0,
            h_edge_reserved_local: 0,
            v_edge_reserved_local: 0,
            events_limit: 4_000_000,
            ripup_limits: RipupLimits::default(),
        }
    }
}
impl Configuration {
    /// Resolve gauge-dependent knobs: cap `allowed_depth` at
    /// `top_routing_layer` when set, at the gauge top otherwise.
    pub fn resolve(&mut self, tech: &Technology, gauge: &RoutingGauge) -> AutoResult<()> {
        if gauge.depth() == 0 {
            return AutoError::fail("Cannot resolve a configuration over an empty gauge");
        }
        self.allowed_depth = gauge.depth() - 1;
        if let Some(name) = &self.top_routing_layer {
            let key = tech
                .layers
                .keyname(name.clone())
                .ok_or_else(|| AutoError::msg(format!("Unknown top routing layer \"{}\"", name)))?;
            self.allowed_depth = gauge
                .layer_depth(key)
                .ok_or_else(|| AutoError::msg(format!("\"{}\" is not a routing layer", name)))?;
        }
        Ok(())
    }
    /// Derive the default edge capacities from the gauge: the number of
    /// same-direction tracks crossing one gcell side of `slice` length,
    /// summed over depths, less one boundary track per depth.
    pub fn edge_capacities(&self, gauge: &RoutingGauge, slice: DbUnits) -> AutoResult<(u32, u32)> {
        let mut h = 0u32;
        let mut v = 0u32;
        for depth in 0..=self.allowed_depth.min(gauge.depth().saturating_sub(1)) {
            let tracks = gauge.track_count(depth, slice)?.saturating_sub(1);
            match gauge.direction(depth)? {
                Dir::Horiz => h += tracks,
                Dir::Vert => v += tracks,
            }
        }
        Ok((h, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gauge::RoutingLayerGauge;
    use route21db::LayerKey;

    #[test]
    fn builder_defaults() {
        let config = ConfigurationBuilder::default()
            .saturate_ratio(0.9)
            .build()
            .unwrap();
        assert_eq!(config.saturate_ratio, 0.9);
        assert_eq!(config.saturate_rp, 8);
        assert_eq!(config.ripup_limits, RipupLimits::default());
    }
    #[test]
    fn resolve_against_gauge() -> AutoResult<()> {
        let mut tech = Technology::new("unit");
        let m1 = tech.add_basic("METAL1")?;
        let m2 = tech.add_basic("METAL2")?;
        let mk = |layer, dir| RoutingLayerGauge {
            layer,
            contact: LayerKey::default(),
            dir,
            pitch: DbUnits(10),
            offset: DbUnits(0),
            wire_width: DbUnits(4),
            via_width: DbUnits(4),
        };
        let gauge = RoutingGauge::new("g", vec![mk(m1, Dir::Horiz), mk(m2, Dir::Vert)]);

        let mut config = Configuration::default();
        config.resolve(&tech, &gauge)?;
        assert_eq!(config.allowed_depth, 1);

        config.top_routing_layer = Some("METAL1".to_string());
        config.resolve(&tech, &gauge)?;
        assert_eq!(config.allowed_depth, 0);
        Ok(())
    }
}

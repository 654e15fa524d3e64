//!
//! # Routing Gauge
//!
//! The per-depth description of the routing fabric: which layer routes at
//! each depth, in which direction, on what pitch, and through which contact
//! layer it reaches the depth above.
//!

// Crates.io
use serde::{Deserialize, Serialize};

// Local Imports
use crate::error::{AutoError, AutoResult};
use route21db::{DbUnits, Dir, LayerKey};

/// One routing plane of the gauge
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoutingLayerGauge {
    /// The conducting layer routed at this depth
    pub layer: LayerKey,
    /// The via layer joining this depth to the one above
    pub contact: LayerKey,
    /// Preferred routing direction
    pub dir: Dir,
    /// Track pitch
    pub pitch: DbUnits,
    /// First-track offset from the origin
    pub offset: DbUnits,
    /// Default wire width
    pub wire_width: DbUnits,
    /// Default via width
    pub via_width: DbUnits,
}

/// Pitch selection of [RoutingGauge::pitch_of]: the depth itself, or its
/// paired neighbour above/below (with boundary fallback to the other side).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PitchKind {
    Normal,
    Above,
    Below,
}

/// # Routing Gauge
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingGauge {
    /// Gauge Name
    pub name: String,
    /// Planes, bottom-up; index is the routing depth
    pub gauges: Vec<RoutingLayerGauge>,
}
impl RoutingGauge {
    pub fn new(name: impl Into<String>, gauges: Vec<RoutingLayerGauge>) -> Self {
        Self {
            name: name.into(),
            gauges,
        }
    }
    /// Number of routing depths
    pub fn depth(&self) -> u8 {
        self.gauges.len() as u8
    }
    /// The routing depth of `layer`, if it is a routing layer
    pub fn layer_depth(&self, layer: LayerKey) -> Option<u8> {
        self.gauges
            .iter()
            .position(|g| g.layer == layer)
            .map(|d| d as u8)
    }
    fn gauge(&self, depth: u8) -> AutoResult<&RoutingLayerGauge> {
        self.gauges
            .get(depth as usize)
            .ok_or_else(|| AutoError::msg(format!("No routing plane at depth {}", depth)))
    }
    /// The conducting layer at `depth`
    pub fn routing_layer(&self, depth: u8) -> AutoResult<LayerKey> {
        Ok(self.gauge(depth)?.layer)
    }
    /// The via layer joining `depth` to `depth + 1`
    pub fn contact_layer(&self, depth: u8) -> AutoResult<LayerKey> {
        Ok(self.gauge(depth)?.contact)
    }
    /// Preferred direction at `depth`
    pub fn direction(&self, depth: u8) -> AutoResult<Dir> {
        Ok(self.gauge(depth)?.dir)
    }
    pub fn pitch(&self, depth: u8) -> AutoResult<DbUnits> {
        Ok(self.gauge(depth)?.pitch)
    }
    pub fn offset(&self, depth: u8) -> AutoResult<DbUnits> {
        Ok(self.gauge(depth)?.offset)
    }
    pub fn wire_width(&self, depth: u8) -> AutoResult<DbUnits> {
        Ok(self.gauge(depth)?.wire_width)
    }
    pub fn via_width(&self, depth: u8) -> AutoResult<DbUnits> {
        Ok(self.gauge(depth)?.via_width)
    }
    /// Pitch of `depth`, or of its paired neighbour. Asking above the top
    /// (or below the bottom) falls back to the opposite side.
    pub fn pitch_of(&self, depth: u8, kind: PitchKind, allowed_depth: u8) -> AutoResult<DbUnits> {
        match kind {
            PitchKind::Normal => self.pitch(depth),
            PitchKind::Above => {
                if depth < allowed_depth {
                    self.pitch(depth + 1)
                } else if depth > 0 {
                    self.pitch(depth - 1)
                } else {
                    self.pitch(depth)
                }
            }
            PitchKind::Below => {
                if depth > 0 {
                    self.pitch(depth - 1)
                } else if depth < allowed_depth {
                    self.pitch(depth + 1)
                } else {
                    self.pitch(depth)
                }
            }
        }
    }
    /// The depth a dogleg's perpendicular leg routes on: the paired layer
    /// above when allowed, otherwise the one below.
    pub fn paired_depth(&self, depth: u8, allowed_depth: u8) -> AutoResult<u8> {
        if depth < allowed_depth {
            Ok(depth + 1)
        } else if depth > 0 {
            Ok(depth - 1)
        } else {
            Err(AutoError::msg("Single-depth gauge cannot pair layers"))
        }
    }
    /// Number of tracks of `depth` crossing a side of length `length`
    pub fn track_count(&self, depth: u8, length: DbUnits) -> AutoResult<u32> {
        let pitch = self.pitch(depth)?;
        if pitch <= DbUnits(0) {
            return Err(AutoError::msg("Non-positive pitch"));
        }
        Ok((length / pitch).max(0) as u32)
    }
    /// Snap `value` onto the track grid of `depth`, rounding to nearest
    pub fn snap(&self, depth: u8, value: DbUnits) -> AutoResult<DbUnits> {
        let pitch = self.pitch(depth)?;
        let offset = self.offset(depth)?;
        if pitch <= DbUnits(0) {
            return Ok(value);
        }
        let steps = (value - offset + pitch / 2) / pitch;
        Ok(offset + pitch * steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_plane() -> RoutingGauge {
        RoutingGauge::new(
            "unit",
            vec![
                RoutingLayerGauge {
                    layer: LayerKey::default(),
                    contact: LayerKey::default(),
                    dir: Dir::Horiz,
                    pitch: DbUnits(10),
                    offset: DbUnits(0),
                    wire_width: DbUnits(4),
                    via_width: DbUnits(4),
                },
                RoutingLayerGauge {
                    layer: LayerKey::default(),
                    contact: LayerKey::default(),
                    dir: Dir::Vert,
                    pitch: DbUnits(12),
                    offset: DbUnits(0),
                    wire_width: DbUnits(4),
                    via_width: DbUnits(4),
                },
            ],
        )
    }

    #[test]
    fn paired_pitches() -> AutoResult<()> {
        let g = two_plane();
        assert_eq!(g.pitch_of(0, PitchKind::Normal, 1)?, DbUnits(10));
        assert_eq!(g.pitch_of(0, PitchKind::Above, 1)?, DbUnits(12));
        // Below depth 0 falls back above
        assert_eq!(g.pitch_of(0, PitchKind::Below, 1)?, DbUnits(12));
        // Above the allowed top falls back below
        assert_eq!(g.pitch_of(1, PitchKind::Above, 1)?, DbUnits(10));
        Ok(())
    }
    #[test]
    fn snapping() -> AutoResult<()> {
        let g = two_plane();
        assert_eq!(g.snap(0, DbUnits(14))?, DbUnits(10));
        assert_eq!(g.snap(0, DbUnits(16))?, DbUnits(20));
        Ok(())
    }
}

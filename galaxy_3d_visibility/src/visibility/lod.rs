/// LOD selection and dissolve hysteresis.
///
/// `select_lod` maps a camera distance to a LOD index. `DissolveState`
/// holds a LOD change back until the camera has travelled one dissolve
/// band past the point where the change started, so a camera hovering on
/// a LOD boundary never makes the object pop back and forth.

use crate::config::SceneConfig;
use crate::scene::{BoundedObject, LodInfo, AABB};

/// Smallest divisor of the distance formula
const MIN_LOD_DENOMINATOR: f32 = 0.001;

/// LOD handed to the render submission path
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LodResolution {
    /// Committed LOD
    pub lod: u8,
    /// LOD being dissolved towards, if a transition is in progress
    pub next_lod: Option<u8>,
    /// Fraction of the transition travelled, in [0, 1]
    pub dissolve: f32,
}

impl LodResolution {
    pub fn stable(lod: u8) -> Self {
        Self {
            lod,
            next_lod: None,
            dissolve: 0.0,
        }
    }
}

/// Target LOD for `distance`, clamped to `[min_lod, lod_count - 1]`.
///
/// With a distance table (and `bbox_lod_only` unset) the LOD is the number
/// of thresholds at or below `distance`. Otherwise it comes from the
/// bounding-box formula
/// `distance * ratio_norm² / max(lod_ratio * min(radius, lod_comp_max_size), 0.001)`.
pub fn select_lod(config: &SceneConfig, info: &LodInfo, radius: f32, distance: f32) -> u8 {
    let max_lod = info.lod_count.saturating_sub(1);
    let min_lod = info.min_lod.min(max_lod);

    let raw = match &info.lod_distances {
        Some(table) if !info.bbox_lod_only => table
            .iter()
            .take(max_lod as usize)
            .filter(|threshold| **threshold <= distance)
            .count() as u32,
        _ => {
            let denominator = (config.lod_ratio * radius.min(config.lod_comp_max_size)).max(MIN_LOD_DENOMINATOR);
            let value = distance * info.lod_ratio_norm * info.lod_ratio_norm / denominator;
            // `as` saturates; NaN maps to 0
            value.max(0.0) as u32
        }
    };

    (raw.min(max_lod as u32) as u8).max(min_lod)
}

/// Per-object LOD transition state
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DissolveState {
    old_lod: u8,
    new_lod: u8,
    /// Camera distance where the transition started
    start_dist: f32,
    /// The transition moves to a coarser LOD (commits while moving away)
    far_side: bool,
    initialized: bool,
}

impl DissolveState {
    pub fn committed_lod(&self) -> u8 {
        self.old_lod
    }

    /// LOD the object is dissolving towards (the committed one when stable)
    pub fn target_lod(&self) -> u8 {
        self.new_lod
    }

    pub fn is_transitioning(&self) -> bool {
        self.initialized && self.old_lod != self.new_lod
    }

    /// Jump to `lod` without a transition
    pub fn reset_to(&mut self, lod: u8, distance: f32) {
        *self = Self {
            old_lod: lod,
            new_lod: lod,
            start_dist: distance,
            far_side: false,
            initialized: true,
        };
    }

    fn begin(&mut self, target: u8, distance: f32) {
        self.new_lod = target;
        self.start_dist = distance;
        self.far_side = target > self.old_lod;
    }

    /// Advance the state machine with this frame's target LOD
    pub fn update(&mut self, target: u8, distance: f32, band: f32) -> LodResolution {
        if !self.initialized {
            self.reset_to(target, distance);
            return LodResolution::stable(target);
        }

        if !self.is_transitioning() {
            if target == self.old_lod {
                return LodResolution::stable(self.old_lod);
            }
            self.begin(target, distance);
            return LodResolution {
                lod: self.old_lod,
                next_lod: Some(target),
                dissolve: 0.0,
            };
        }

        if target != self.new_lod && target != self.old_lod {
            self.begin(target, distance);
            return LodResolution {
                lod: self.old_lod,
                next_lod: Some(target),
                dissolve: 0.0,
            };
        }

        let travelled = if self.far_side {
            distance - self.start_dist
        } else {
            self.start_dist - distance
        };

        if target == self.old_lod || travelled < 0.0 {
            self.new_lod = self.old_lod;
            return LodResolution::stable(self.old_lod);
        }
        if travelled >= band {
            self.old_lod = self.new_lod;
            return LodResolution::stable(self.old_lod);
        }

        LodResolution {
            lod: self.old_lod,
            next_lod: Some(self.new_lod),
            dissolve: (travelled / band).clamp(0.0, 1.0),
        }
    }
}

/// Resolve the LOD of `object` at `distance`, driving `dissolve` when given
pub fn resolve_lod(
    config: &SceneConfig,
    object: &dyn BoundedObject,
    bbox: &AABB,
    distance: f32,
    dissolve: Option<&mut DissolveState>,
) -> LodResolution {
    let Some(info) = object.lod_info() else {
        return LodResolution::stable(0);
    };
    let target = select_lod(config, &info, bbox.radius(), distance);

    match dissolve {
        Some(state) if config.dissolve_enabled && info.lod_count > 1 => {
            state.update(target, distance, config.dissolve_dist_band)
        }
        Some(state) => {
            state.reset_to(target, distance);
            LodResolution::stable(target)
        }
        None => LodResolution::stable(target),
    }
}

#[cfg(test)]
#[path = "lod_tests.rs"]
mod tests;

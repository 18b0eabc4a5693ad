// Velocity lookup for planned segments
// Short segments and long segments get different speeds per gear / steering.

use crate::config::VelocityTable;
use crate::messages::{Gear, Steering};

/// Distance bucket of a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceClass {
    Short,
    Long,
}

/// Total (gear, steering, distance) -> velocity function
#[derive(Debug, Clone, Copy)]
pub struct VelocityPolicy {
    table: VelocityTable,
    short_threshold: f64,
}

impl VelocityPolicy {
    pub fn new(table: VelocityTable, short_threshold: f64) -> Self {
        Self {
            table,
            short_threshold,
        }
    }

    pub fn classify(&self, distance: f64) -> DistanceClass {
        if distance < self.short_threshold {
            DistanceClass::Short
        } else {
            DistanceClass::Long
        }
    }

    /// Velocity in m/s; 0 means the segment does not move (neutral gear)
    pub fn velocity(&self, gear: Gear, steering: Steering, distance: f64) -> f64 {
        let Some(per_steering) = self.table.for_gear(gear) else {
            return 0.0;
        };
        let bucket = per_steering.get(steering);
        match self.classify(distance) {
            DistanceClass::Short => bucket.short,
            DistanceClass::Long => bucket.long,
        }
    }
}

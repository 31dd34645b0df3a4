//! Static zone reference sets.
//!
//! The congestion zone approximates Manhattan south of 60th St as a fixed
//! list of TLC location ids; there is no shapefile lookup. The border set
//! is only consumed by downstream analysis.

use std::collections::HashSet;

use lazy_static::lazy_static;

/// Location ids inside the tolled congestion zone.
pub const CONGESTION_ZONE_IDS: [i32; 67] = [
    4, 12, 13, 24, 41, 42, 43, 45, 48, 50, 68, 74, 75, 79, 87, 88, 90, 100, 107, 113, 114, 116,
    120, 125, 127, 128, 137, 140, 141, 142, 143, 144, 148, 151, 158, 161, 162, 163, 164, 166, 170,
    186, 194, 202, 209, 211, 224, 229, 230, 231, 232, 233, 234, 236, 237, 238, 239, 240, 241, 242,
    243, 244, 246, 249, 261, 262, 263,
];

/// Location ids bordering the 60th St cutoff.
pub const BORDER_ZONE_IDS: [i32; 14] = [68, 74, 75, 79, 87, 88, 90, 100, 107, 113, 114, 116, 120, 125];

lazy_static! {
    static ref CONGESTION_ZONE: HashSet<i32> = CONGESTION_ZONE_IDS.iter().copied().collect();
    static ref BORDER_ZONE: HashSet<i32> = BORDER_ZONE_IDS.iter().copied().collect();
}

/// True if the location id lies inside the congestion zone.
#[inline]
pub fn is_in_congestion_zone(location_id: i32) -> bool {
    CONGESTION_ZONE.contains(&location_id)
}

/// True if the location id is one of the border zones.
#[inline]
pub fn is_border_zone(location_id: i32) -> bool {
    BORDER_ZONE.contains(&location_id)
}

/// Congestion zone ids in ascending order.
pub fn congestion_zone_locations() -> &'static [i32] {
    &CONGESTION_ZONE_IDS
}

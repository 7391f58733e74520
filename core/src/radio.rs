//! Block-size profiles and modulation-and-coding tables.
//!
//! The numerology values are illustrative: the frequency extent doubles and
//! the time extent halves across the set, so every next-generation block
//! covers the same number of base units. Legacy blocks use a single fixed
//! shape with a different raw size.

use serde::{Deserialize, Serialize};

use crate::grid::StationKind;

/// Named block-size profile for next-generation resource blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Numerology {
    N0,
    N1,
    N2,
    N3,
    N4,
}

impl Numerology {
    pub const ALL: [Numerology; 5] = [
        Numerology::N0,
        Numerology::N1,
        Numerology::N2,
        Numerology::N3,
        Numerology::N4,
    ];

    pub fn index(self) -> usize {
        match self {
            Numerology::N0 => 0,
            Numerology::N1 => 1,
            Numerology::N2 => 2,
            Numerology::N3 => 3,
            Numerology::N4 => 4,
        }
    }

    pub fn from_index(index: usize) -> Option<Numerology> {
        Numerology::ALL.get(index).copied()
    }

    /// Block footprint: frequency extent doubles, time extent halves.
    pub fn shape(self) -> BlockShape {
        let index = self.index();
        BlockShape {
            freq: 1 << index,
            time: 16 >> index,
        }
    }
}

/// Rectangular block footprint in base units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockShape {
    pub freq: usize,
    pub time: usize,
}

impl BlockShape {
    pub fn units(self) -> usize {
        self.freq * self.time
    }
}

/// Legacy stations use one fixed block shape; next-generation blocks are
/// sized by the numerology the UE is currently using.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    Legacy,
    NextGen(Numerology),
}

impl BlockKind {
    pub fn shape(self) -> BlockShape {
        match self {
            BlockKind::Legacy => BlockShape { freq: 4, time: 8 },
            BlockKind::NextGen(numerology) => numerology.shape(),
        }
    }

    pub fn station(self) -> StationKind {
        match self {
            BlockKind::Legacy => StationKind::Legacy,
            BlockKind::NextGen(_) => StationKind::NextGen,
        }
    }

    pub fn numerology(self) -> Option<Numerology> {
        match self {
            BlockKind::Legacy => None,
            BlockKind::NextGen(numerology) => Some(numerology),
        }
    }
}

/// SINR breakpoints (dB) for the legacy station, fifteen usable levels.
const LEGACY_SINR_STEPS_DB: [f64; 15] = [
    -6.7, -4.7, -2.3, 0.2, 2.4, 4.3, 5.9, 8.1, 10.3, 11.7, 14.1, 16.3, 18.7, 21.0, 22.7,
];

/// Next-generation coding gains shift every breakpoint down half a decibel.
const NEXTGEN_SINR_STEPS_DB: [f64; 15] = [
    -7.2, -5.2, -2.8, -0.3, 1.9, 3.8, 5.4, 7.6, 9.8, 11.2, 13.6, 15.8, 18.2, 20.5, 22.2,
];

/// Spectral efficiency in bits per resource element, per usable level.
const EFFICIENCY_BITS_PER_RE: [f64; 15] = [
    0.1523, 0.2344, 0.3770, 0.6016, 0.8770, 1.1758, 1.4766, 1.9141, 2.4063, 2.7305, 3.3223,
    3.9023, 4.5234, 5.1152, 5.5547,
];

/// Resource elements carried by one base unit.
const RE_PER_UNIT: f64 = 84.0;

/// Modulation-and-coding level. Level 0 is the "unusable" sentinel produced
/// when SINR falls below the lowest breakpoint; it carries no throughput and
/// triggers block rejection upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Mcs(u8);

impl Mcs {
    pub const UNUSABLE: Mcs = Mcs(0);

    /// Checked constructor: callers decide what an out-of-range raw level
    /// means instead of silently falling back to the sentinel.
    pub fn from_level(level: u8) -> Option<Mcs> {
        (level <= 15).then_some(Mcs(level))
    }

    /// Monotonic step function over the per-generation SINR breakpoints.
    pub fn from_sinr(station: StationKind, sinr_db: f64) -> Mcs {
        let steps = match station {
            StationKind::Legacy => &LEGACY_SINR_STEPS_DB,
            StationKind::NextGen => &NEXTGEN_SINR_STEPS_DB,
        };
        let level = steps.iter().take_while(|&&step| sinr_db >= step).count();
        Mcs(level as u8)
    }

    pub fn level(self) -> u8 {
        self.0
    }

    pub fn is_usable(self) -> bool {
        self.0 > 0
    }

    /// Throughput contribution of one base unit, in bits per frame.
    pub fn bits_per_unit(self) -> f64 {
        if self.0 == 0 {
            0.0
        } else {
            EFFICIENCY_BITS_PER_RE[self.0 as usize - 1] * RE_PER_UNIT
        }
    }

    /// Throughput of one whole block of the given kind, in bits per frame.
    pub fn bits_per_block(self, kind: BlockKind) -> f64 {
        self.bits_per_unit() * kind.shape().units() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numerology_shapes_cover_equal_units() {
        for numerology in Numerology::ALL {
            assert_eq!(numerology.shape().units(), 16);
        }
        assert_eq!(Numerology::N2.shape(), BlockShape { freq: 4, time: 4 });
        assert_eq!(BlockKind::Legacy.shape().units(), 32);
    }

    #[test]
    fn from_level_rejects_out_of_range() {
        assert_eq!(Mcs::from_level(15), Some(Mcs(15)));
        assert_eq!(Mcs::from_level(16), None);
        assert!(!Mcs::from_level(0).unwrap().is_usable());
    }

    #[test]
    fn sinr_mapping_is_monotonic() {
        let low = Mcs::from_sinr(StationKind::Legacy, -10.0);
        assert_eq!(low, Mcs::UNUSABLE);
        let mut previous = low;
        for sinr in -8..30 {
            let mcs = Mcs::from_sinr(StationKind::Legacy, sinr as f64);
            assert!(mcs >= previous);
            previous = mcs;
        }
        assert_eq!(Mcs::from_sinr(StationKind::Legacy, 40.0).level(), 15);
    }

    #[test]
    fn nextgen_steps_are_more_permissive() {
        let at_edge = -7.0;
        assert_eq!(Mcs::from_sinr(StationKind::Legacy, at_edge), Mcs::UNUSABLE);
        assert!(Mcs::from_sinr(StationKind::NextGen, at_edge).is_usable());
    }

    #[test]
    fn block_value_scales_with_raw_size() {
        let mcs = Mcs::from_level(15).unwrap();
        let legacy = mcs.bits_per_block(BlockKind::Legacy);
        let nextgen = mcs.bits_per_block(BlockKind::NextGen(Numerology::N2));
        assert!((legacy - 2.0 * nextgen).abs() < 1e-9);
    }
}

//! Phase 2 of the zone pipeline: bin packing onto layers and the physical
//! grid writes.
//!
//! Wide zones are packed first-fit-decreasing into [`ZoneGroup`]s, one
//! [`Bin`] per layer in use. Groups are ordered so the hardest-to-place ones
//! claim spectrum first, then written sequentially from each layer's
//! available offset.

use log::debug;

use super::Zone;
use crate::alloc::Allocator;
use crate::grid::{LayerRef, StationKind};
use crate::journal::{Journal, UndoOp};
use crate::network::UeId;
use crate::radio::BlockKind;

/// One layer's share of a zone group, measured in frequency units.
#[derive(Debug, Clone)]
pub struct Bin {
    pub capacity: usize,
    pub used: usize,
    pub zones: Vec<Zone>,
}

impl Bin {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            used: 0,
            zones: Vec::new(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.used
    }

    fn push(&mut self, zone: Zone) {
        debug_assert!(zone.freq_width() <= self.remaining());
        self.used += zone.freq_width();
        self.zones.push(zone);
    }
}

/// Same-kind zones packed across the layers in use.
#[derive(Debug, Clone)]
pub struct ZoneGroup {
    pub kind: BlockKind,
    pub bins: Vec<Bin>,
}

impl ZoneGroup {
    fn new(kind: BlockKind, bin_count: usize, capacity: usize) -> Self {
        Self {
            kind,
            bins: vec![Bin::new(capacity); bin_count],
        }
    }

    /// The earliest bin that still has unused capacity.
    fn open_bin_mut(&mut self) -> Option<&mut Bin> {
        self.bins.iter_mut().find(|bin| bin.used < bin.capacity)
    }

    fn accepts(&self, zone: &Zone) -> bool {
        if self.kind != zone.kind {
            return false;
        }
        self.bins
            .iter()
            .find(|bin| bin.used < bin.capacity)
            .is_some_and(|bin| bin.remaining() >= zone.freq_width())
    }

    /// Leftover capacity weighted toward the earliest bins: a group with a
    /// tight first bin is hard to place elsewhere and goes early.
    pub fn residual_degree(&self) -> f64 {
        self.bins
            .iter()
            .enumerate()
            .map(|(index, bin)| bin.remaining() as f64 / (index + 1) as f64)
            .sum()
    }

    /// Width of the widest zone, which first-fit-decreasing put at the
    /// front of the first bin.
    fn lead_width(&self) -> usize {
        self.bins
            .first()
            .and_then(|bin| bin.zones.first())
            .map_or(0, Zone::freq_width)
    }

    pub fn ue_ids(&self) -> impl Iterator<Item = UeId> + '_ {
        self.bins
            .iter()
            .flat_map(|bin| bin.zones.iter().flat_map(Zone::ue_ids))
    }
}

/// Layers the wide zones need: capped ceiling of total width over one
/// frame's bandwidth.
pub fn layers_needed(wide: &[Zone], frame_freq: usize, layer_count: usize) -> usize {
    let total: usize = wide.iter().map(Zone::freq_width).sum();
    total.div_ceil(frame_freq).min(layer_count).max(1)
}

/// First-fit-decreasing packing of wide zones into same-kind groups with
/// `bin_count` bins of `frame_freq` capacity each.
pub fn form_groups(mut wide: Vec<Zone>, frame_freq: usize, bin_count: usize) -> Vec<ZoneGroup> {
    wide.sort_by(|a, b| b.freq_width().cmp(&a.freq_width()));
    let mut groups: Vec<ZoneGroup> = Vec::new();
    for zone in wide {
        match groups.iter_mut().find(|group| group.accepts(&zone)) {
            Some(group) => group
                .open_bin_mut()
                .expect("accepting group lost its open bin")
                .push(zone),
            None => {
                let mut group = ZoneGroup::new(zone.kind, bin_count, frame_freq);
                group.bins[0].push(zone);
                groups.push(group);
            }
        }
    }
    groups
}

/// Orders groups hardest-to-place first: ascending residual degree, ties
/// broken by the widest lead zone.
pub fn order_groups(groups: &mut [ZoneGroup]) {
    groups.sort_by(|a, b| {
        a.residual_degree()
            .total_cmp(&b.residual_degree())
            .then(b.lead_width().cmp(&a.lead_width()))
    });
}

/// Writes ordered groups to the next-generation station's layers, bin `i`
/// onto layer `i`, each starting at the layer's available offset.
///
/// The first group whose first bin no longer fits the first layer's
/// remaining bandwidth stops the walk; its UEs and every later group's UEs
/// are returned unallocated.
pub fn allocate_zone_groups(
    allocator: &mut Allocator<'_>,
    groups: Vec<ZoneGroup>,
    journal: &mut Journal,
) -> Vec<UeId> {
    let mut unallocated = Vec::new();
    let mut groups = groups.into_iter();
    for group in groups.by_ref() {
        let first_layer = allocator.network.gnb.frame.layer(0);
        let remaining = first_layer.freq_units() - first_layer.available_offset;
        if group.bins[0].used > remaining {
            debug!(
                "group of {:?} needs {} freq units, first layer has {}",
                group.kind, group.bins[0].used, remaining
            );
            unallocated.extend(group.ue_ids());
            break;
        }
        for (index, bin) in group.bins.into_iter().enumerate() {
            let layer = LayerRef {
                station: StationKind::NextGen,
                index,
            };
            for zone in bin.zones {
                write_zone(allocator, &zone, layer, journal);
            }
        }
    }
    for group in groups {
        unallocated.extend(group.ue_ids());
    }
    unallocated
}

/// Overflow of the single-layer placement, split by connection type: dual
/// UEs still have a second station to try.
#[derive(Debug, Default)]
pub struct LegacyOverflow {
    pub single: Vec<UeId>,
    pub dual: Vec<UeId>,
}

/// Places zones into the legacy station's lone layer from its available
/// offset; the first zone that no longer fits stops the walk and the rest
/// overflow.
pub fn allocate_zones_single_layer(
    allocator: &mut Allocator<'_>,
    zones: Vec<Zone>,
    journal: &mut Journal,
) -> LegacyOverflow {
    let layer = LayerRef {
        station: StationKind::Legacy,
        index: 0,
    };
    let mut overflow = LegacyOverflow::default();
    let mut zones = zones.into_iter();
    for zone in zones.by_ref() {
        let grid = allocator.network.layer(layer);
        if zone.freq_width() > grid.freq_units() - grid.available_offset {
            spill(allocator, &zone, &mut overflow);
            break;
        }
        write_zone(allocator, &zone, layer, journal);
    }
    for zone in zones {
        spill(allocator, &zone, &mut overflow);
    }
    overflow
}

fn spill(allocator: &Allocator<'_>, zone: &Zone, overflow: &mut LegacyOverflow) {
    for ue in zone.ue_ids() {
        if allocator.network.ue(ue).connection.is_dual() {
            overflow.dual.push(ue);
        } else {
            overflow.single.push(ue);
        }
    }
}

/// Writes one zone's blocks into `layer` starting at its available offset,
/// row-major within the zone's footprint, then advances the offset.
///
/// The footprint sits above the available offset and is free by
/// construction; a collision or a cursor landing off the expected offset is
/// an internal-consistency violation, not a recoverable condition.
pub fn write_zone(allocator: &mut Allocator<'_>, zone: &Zone, layer: LayerRef, journal: &mut Journal) {
    assert_eq!(
        zone.kind.station(),
        layer.station,
        "zone kind does not match the target station"
    );
    let shape = zone.kind.shape();
    let frame_time = zone.frame_time;
    let start = {
        let grid = allocator.network.layer(layer);
        assert_eq!(grid.time_units(), frame_time, "zone formed for another frame");
        assert!(
            grid.available_offset + zone.freq_width() <= grid.freq_units(),
            "zone write escapes the layer's bandwidth"
        );
        grid.available_offset
    };

    let mut freq = start;
    let mut time = 0;
    for member in &zone.members {
        for _ in 0..member.blocks {
            allocator
                .place_block(member.ue, layer, freq, time, zone.kind, journal)
                .unwrap_or_else(|| {
                    panic!(
                        "zone write collided with an occupied cell at ({freq}, {time}) on {:?}[{}]",
                        layer.station, layer.index
                    )
                });
            time += shape.time;
            if time + shape.time > frame_time {
                time = 0;
                freq += shape.freq;
            }
        }
    }

    // The cursor must land exactly where the footprint arithmetic says.
    let (expected_freq, expected_time) = match zone.last_row_duration() {
        0 => (start + zone.rows() * shape.freq, 0),
        partial => (start + (zone.rows() - 1) * shape.freq, partial),
    };
    assert!(
        freq == expected_freq && time == expected_time,
        "zone write cursor ({freq}, {time}) is off the expected ({expected_freq}, {expected_time})"
    );

    journal.record(UndoOp::RestoreAvailableOffset {
        layer,
        offset: start,
    });
    allocator.network.layer_mut(layer).available_offset = start + zone.freq_width();
    debug!(
        "wrote zone of {} blocks at {:?}[{}] rows {}..{}",
        zone.block_count(),
        layer.station,
        layer.index,
        start,
        start + zone.freq_width()
    );
}

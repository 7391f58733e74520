//! Phase 1 of the zone pipeline: numerology selection and zone forming.
//!
//! A zone aggregates same-block-kind demand into a rectangular footprint of
//! whole frame rows plus a possibly partial last row. Zones are transient:
//! they exist only between forming and the physical grid write.

pub mod group;

use log::debug;

use crate::channel::ChannelModel;
use crate::grid::StationKind;
use crate::journal::{Journal, UndoOp};
use crate::network::{Network, UeId};
use crate::radio::{BlockKind, Numerology};

/// Interference-footprint discount for dual-connection UEs: only part of
/// their traffic lands on this station.
const DUAL_CONNECTION_WEIGHT: f64 = 0.5;

/// One UE's share of a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneMember {
    pub ue: UeId,
    pub blocks: usize,
}

/// Rectangular aggregate of same-kind block demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    pub kind: BlockKind,
    /// Time extent of one frame row, in base units.
    pub frame_time: usize,
    pub members: Vec<ZoneMember>,
}

impl Zone {
    pub fn new(kind: BlockKind, frame_time: usize, member: ZoneMember) -> Self {
        Self {
            kind,
            frame_time,
            members: vec![member],
        }
    }

    pub fn block_count(&self) -> usize {
        self.members.iter().map(|member| member.blocks).sum()
    }

    /// Total time extent of the demand laid out end to end.
    pub fn total_time(&self) -> usize {
        self.block_count() * self.kind.shape().time
    }

    /// Frame rows the footprint covers, counting a partial last row.
    pub fn rows(&self) -> usize {
        self.total_time().div_ceil(self.frame_time)
    }

    /// Occupied duration of the last row; zero means it is exactly full.
    pub fn last_row_duration(&self) -> usize {
        self.total_time() % self.frame_time
    }

    /// Frequency width of the whole footprint.
    pub fn freq_width(&self) -> usize {
        self.rows() * self.kind.shape().freq
    }

    /// A zone fits when it needs more than one frame row, or exactly fills
    /// its last (only) row.
    pub fn is_fit(&self) -> bool {
        self.total_time() > self.frame_time || self.last_row_duration() == 0
    }

    fn last_row_utilization(&self) -> usize {
        match self.last_row_duration() {
            0 => self.frame_time,
            partial => partial,
        }
    }

    /// Wide zones utilize at least half the frame's time extent in their
    /// last row; narrow ones are held back for a lower-priority attempt.
    pub fn is_wide(&self) -> bool {
        self.last_row_utilization() * 2 >= self.frame_time
    }

    pub fn absorb(&mut self, other: Zone) {
        assert_eq!(self.kind, other.kind, "merging zones of different kinds");
        self.members.extend(other.members);
    }

    pub fn ue_ids(&self) -> impl Iterator<Item = UeId> + '_ {
        self.members.iter().map(|member| member.ue)
    }
}

/// Accumulated per-numerology interference estimate across the UEs able to
/// reach the next-generation station. Numerologies compatible with fewer
/// UEs score lower and end up deprioritized.
pub fn interference_estimates(network: &Network) -> [f64; 5] {
    let total = Numerology::ALL.len();
    let mut estimates = [0.0; 5];
    for ue in &network.ues {
        if ue.link(StationKind::NextGen).is_none() {
            continue;
        }
        let weight = if ue.connection.is_dual() {
            DUAL_CONNECTION_WEIGHT
        } else {
            1.0
        };
        let contribution = (total - ue.candidates.len()) as f64 * weight;
        for &candidate in &ue.candidates {
            estimates[candidate.index()] += contribution;
        }
    }
    estimates
}

/// Greedy initial numerology choice: each UE colocates on the busiest
/// numerology of its candidate set rather than fragmenting usage.
pub fn select_init_numerology(
    network: &mut Network,
    ues: &[UeId],
    estimates: &[f64; 5],
    journal: &mut Journal,
) {
    for &id in ues {
        let ue = network.ue(id);
        assert!(
            !ue.candidates.is_empty(),
            "numerology selection for a UE with no candidates"
        );
        let chosen = ue
            .candidates
            .iter()
            .copied()
            .max_by(|a, b| {
                estimates[a.index()]
                    .total_cmp(&estimates[b.index()])
                    // Ties break toward the lower index, deterministically.
                    .then(b.index().cmp(&a.index()))
            })
            .expect("non-empty candidate set");
        let previous = network.ue(id).numerology;
        if previous != chosen {
            journal.record(UndoOp::RestoreNumerology {
                ue: id,
                numerology: previous,
            });
            network.ue_mut(id).numerology = chosen;
        }
    }
}

/// Blocks needed to cover the UE's per-station target at its bootstrap
/// channel estimate; `None` when even the estimate is unusable.
pub fn block_demand(
    network: &Network,
    channel: &ChannelModel,
    ue: UeId,
    station: StationKind,
) -> Option<usize> {
    let mcs = channel.estimated_mcs(network, ue, station);
    if !mcs.is_usable() {
        return None;
    }
    let kind = match station {
        StationKind::Legacy => BlockKind::Legacy,
        StationKind::NextGen => BlockKind::NextGen(network.ue(ue).numerology),
    };
    let link = network
        .ue(ue)
        .link(station)
        .expect("block demand for a station the UE cannot reach");
    let target = if link.request_split > 0.0 {
        link.request_split
    } else {
        network.ue(ue).request_rate
    };
    Some((target / mcs.bits_per_block(kind)).ceil().max(1.0) as usize)
}

/// Result of forming single-UE zones for one station.
#[derive(Debug, Default)]
pub struct ZoneFormation {
    pub fit: Vec<Zone>,
    pub undersized: Vec<Zone>,
    /// UEs whose bootstrap estimate is already unusable.
    pub unservable: Vec<UeId>,
}

/// Each UE becomes its own zone sized to its numerology and block demand.
pub fn form_zones(
    network: &Network,
    channel: &ChannelModel,
    ues: &[UeId],
    station: StationKind,
) -> ZoneFormation {
    let frame_time = network.station(station).frame.time_units;
    let mut formation = ZoneFormation::default();
    for &id in ues {
        let Some(blocks) = block_demand(network, channel, id, station) else {
            formation.unservable.push(id);
            continue;
        };
        let kind = match station {
            StationKind::Legacy => BlockKind::Legacy,
            StationKind::NextGen => BlockKind::NextGen(network.ue(id).numerology),
        };
        let zone = Zone::new(kind, frame_time, ZoneMember { ue: id, blocks });
        if zone.is_fit() {
            formation.fit.push(zone);
        } else {
            formation.undersized.push(zone);
        }
    }
    debug!(
        "formed {} fit / {} undersized zones at {:?} ({} unservable)",
        formation.fit.len(),
        formation.undersized.len(),
        station,
        formation.unservable.len()
    );
    formation
}

/// Greedy merge of undersized zones, largest remainder first. An undersized
/// zone joins the first already-merged zone of the same kind whose combined
/// leftover still fits within one frame row (optionally bounded by
/// `row_limit` rows); unmergeable zones stay singleton.
pub fn merge_zones(
    fit: Vec<Zone>,
    mut undersized: Vec<Zone>,
    row_limit: Option<usize>,
) -> Vec<Zone> {
    let mut merged = fit;
    undersized.sort_by(|a, b| b.last_row_duration().cmp(&a.last_row_duration()));
    for zone in undersized {
        let target = merged.iter_mut().find(|candidate| {
            if candidate.kind != zone.kind {
                return false;
            }
            let combined_leftover = candidate.last_row_duration() + zone.last_row_duration();
            if combined_leftover > candidate.frame_time {
                return false;
            }
            match row_limit {
                Some(limit) => {
                    (candidate.total_time() + zone.total_time()).div_ceil(candidate.frame_time)
                        <= limit
                }
                None => true,
            }
        });
        match target {
            Some(candidate) => candidate.absorb(zone),
            None => merged.push(zone),
        }
    }
    merged
}

/// Splits zones into wide (packed by Phase 2) and narrow (held back).
pub fn categorize_zones(zones: Vec<Zone>) -> (Vec<Zone>, Vec<Zone>) {
    zones.into_iter().partition(|zone| zone.is_wide())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::testing::*;

    fn zone_of(kind: BlockKind, frame_time: usize, blocks: usize) -> Zone {
        Zone::new(
            kind,
            frame_time,
            ZoneMember {
                ue: UeId(0),
                blocks,
            },
        )
    }

    #[test]
    fn exact_row_fill_classifies_as_fit() {
        // Four N2 blocks fill one 16-unit row exactly.
        let kind = BlockKind::NextGen(Numerology::N2);
        assert!(zone_of(kind, 16, 4).is_fit());
        // Eight blocks fill two whole rows.
        assert!(zone_of(kind, 16, 8).is_fit());
        // Twelve time units leave the single row short: undersized.
        assert!(!zone_of(kind, 16, 3).is_fit());
        // More than one row is fit even with a partial last row.
        assert!(zone_of(kind, 16, 7).is_fit());
    }

    #[test]
    fn wide_threshold_is_half_the_frame_time() {
        let kind = BlockKind::NextGen(Numerology::N2);
        assert!(zone_of(kind, 16, 2).is_wide()); // 8 of 16 units
        assert!(!zone_of(kind, 16, 1).is_wide()); // 4 of 16 units
        assert!(zone_of(kind, 16, 4).is_wide()); // exact fill
    }

    #[test]
    fn footprint_geometry() {
        let kind = BlockKind::NextGen(Numerology::N1); // 2 x 8
        let zone = zone_of(kind, 16, 5);
        assert_eq!(zone.total_time(), 40);
        assert_eq!(zone.rows(), 3);
        assert_eq!(zone.last_row_duration(), 8);
        assert_eq!(zone.freq_width(), 6);
    }

    #[test]
    fn estimates_prefer_broadly_compatible_numerologies() {
        let mut network = network(2, 0);
        add_nextgen_ue(&mut network, 60.0, 1000.0, vec![Numerology::N1]);
        add_nextgen_ue(
            &mut network,
            80.0,
            1000.0,
            vec![Numerology::N1, Numerology::N2],
        );
        add_dual_ue(&mut network, 90.0, 1000.0, vec![Numerology::N2]);
        let estimates = interference_estimates(&network);
        // N1: (5-1)*1 + (5-2)*1 = 7; N2: (5-2)*1 + (5-1)*0.5 = 5.
        assert_eq!(estimates[Numerology::N1.index()], 7.0);
        assert_eq!(estimates[Numerology::N2.index()], 5.0);
        assert_eq!(estimates[Numerology::N0.index()], 0.0);
    }

    #[test]
    fn numerology_selection_takes_highest_estimate() {
        let mut network = network(2, 0);
        let a = add_nextgen_ue(&mut network, 60.0, 1000.0, vec![Numerology::N2]);
        let b = add_nextgen_ue(
            &mut network,
            80.0,
            1000.0,
            vec![Numerology::N1, Numerology::N2],
        );
        // N2 accumulates 4 + 3; N1 only 3, so both UEs land on N2.
        let estimates = interference_estimates(&network);
        let mut journal = Journal::new();
        select_init_numerology(&mut network, &[a, b], &estimates, &mut journal);
        assert_eq!(network.ue(a).numerology, Numerology::N2);
        assert_eq!(network.ue(b).numerology, Numerology::N2);
        journal.undo(&mut network);
        assert_eq!(network.ue(b).numerology, Numerology::N1);
    }

    #[test]
    fn merge_prefers_largest_remainders_and_matching_kind() {
        let kind = BlockKind::NextGen(Numerology::N2);
        let other_kind = BlockKind::NextGen(Numerology::N1);
        // Leftovers of 12 and 4 units combine into one full row; the N1
        // zone's 8-unit leftover would also fit but the kinds differ.
        let a = zone_of(kind, 16, 3);
        let b = zone_of(kind, 16, 1);
        let c = zone_of(other_kind, 16, 1);
        let merged = merge_zones(Vec::new(), vec![a, b, c], None);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].block_count(), 4);
        assert!(merged[0].is_fit());
    }

    #[test]
    fn row_limit_blocks_oversized_merges() {
        let kind = BlockKind::NextGen(Numerology::N2);
        let fit = vec![zone_of(kind, 16, 7)]; // 2 rows, partial last
        let undersized = vec![zone_of(kind, 16, 1)];
        let merged = merge_zones(fit, undersized, Some(2));
        // 7 + 1 blocks = 32 units = exactly 2 rows: allowed.
        assert_eq!(merged.len(), 1);
        let fit = vec![zone_of(kind, 16, 7)];
        let undersized = vec![zone_of(kind, 16, 3)];
        let merged = merge_zones(fit, undersized, Some(2));
        // 10 blocks = 40 units = 3 rows: the limit forbids the merge.
        assert_eq!(merged.len(), 2);
    }
}

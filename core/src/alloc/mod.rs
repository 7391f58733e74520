//! Allocation primitives.
//!
//! The [`Allocator`] borrows the network state and the channel model for
//! the duration of one allocation call and owns the journaling discipline:
//! every mutation it performs lands in the caller's [`Journal`], so a caller
//! that rolls back gets the grid, the UE records, and the SINR caches back
//! bit-exactly.

mod adjust;
mod placement;

use log::debug;
use serde::Serialize;

use crate::channel::ChannelModel;
use crate::grid::{BlockId, CellAddr, LayerRef, ResourceBlock, StationKind};
use crate::journal::{Journal, PurgeOp, UndoOp};
use crate::network::{Network, UeId};
use crate::radio::BlockKind;

/// Governs whether a placement or adjustment may retroactively worsen an
/// already-allocated UE's MCS.
#[derive(Debug, Clone, Copy)]
pub struct AllocationPolicy {
    pub allow_lower_mcs: bool,
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        Self {
            allow_lower_mcs: true,
        }
    }
}

/// Run counters surfaced in reports.
#[derive(Debug, Default, Clone, Serialize)]
pub struct AllocatorStats {
    pub blocks_placed: usize,
    pub positions_rejected: usize,
    pub rollbacks: usize,
    pub evictions: usize,
}

/// Facade over the shared grid for one allocation run.
pub struct Allocator<'a> {
    pub network: &'a mut Network,
    pub channel: &'a ChannelModel,
    /// UEs evicted by MCS adjustment; the driver folds these into its
    /// unallocated collection.
    pub evicted: Vec<UeId>,
    pub stats: AllocatorStats,
}

impl<'a> Allocator<'a> {
    pub fn new(network: &'a mut Network, channel: &'a ChannelModel) -> Self {
        Self {
            network,
            channel,
            evicted: Vec::new(),
            stats: AllocatorStats::default(),
        }
    }

    /// Writes one resource block for `ue` at `(freq, time)` of `layer`.
    ///
    /// Fails (returns `None`) when any covered cell is occupied; a UE whose
    /// own blocks would overlap is caught the same way. On success returns
    /// the new block id plus the allocated UEs whose interference
    /// environment the write disturbed.
    pub fn place_block(
        &mut self,
        ue: UeId,
        layer: LayerRef,
        freq: usize,
        time: usize,
        kind: BlockKind,
        journal: &mut Journal,
    ) -> Option<(BlockId, Vec<UeId>)> {
        assert_eq!(
            kind.station(),
            layer.station,
            "block kind does not match the target station"
        );
        let shape = kind.shape();
        {
            let grid = self.network.layer(layer);
            assert!(
                freq + shape.freq <= grid.freq_units() && time + shape.time <= grid.time_units(),
                "block position escapes the frame"
            );
            for df in 0..shape.freq {
                for dt in 0..shape.time {
                    if !grid.is_free(freq + df, time + dt) {
                        return None;
                    }
                }
            }
        }

        let block = ResourceBlock::new(ue, layer, freq, time, kind);
        let cells: Vec<(usize, usize)> = block.cells().collect();
        let id = self.network.blocks.insert(block);
        journal.record(UndoOp::DiscardBlock { id });

        for (offset, &(f, t)) in cells.iter().enumerate() {
            let at = CellAddr {
                layer,
                freq: f,
                time: t,
            };
            let cell = self.network.layer(layer).cell(f, t);
            journal.record(UndoOp::RestoreCell {
                at,
                block: cell.block,
                offset_in_block: cell.offset_in_block,
            });
            journal.record(UndoOp::RestoreSinrCache {
                at,
                sinr_db: cell.sinr_db,
                valid: cell.sinr_valid,
            });
            let cell = self.network.layer_mut(layer).cell_mut(f, t);
            cell.block = Some(id);
            cell.offset_in_block = offset;
            cell.sinr_valid = false;
        }

        let affected = self.invalidate_neighbours(layer, &cells, ue, journal);

        let target = self.network.ue_mut(ue);
        let link = target
            .connection
            .link_mut(layer.station)
            .expect("placing a block for a UE without a link to this station");
        link.blocks.push(id);
        if !target.is_allocated {
            journal.record(UndoOp::RestoreUeStatus {
                ue,
                is_allocated: target.is_allocated,
                throughput: target.throughput,
                needs_recalc: target.needs_recalc,
            });
            target.is_allocated = true;
        }
        debug!(
            "placed block {:?} for UE {} at {:?}[{}] ({}, {})",
            kind, ue.0, layer.station, layer.index, freq, time
        );
        Some((id, affected))
    }

    /// Removes a block, restoring every covered cell; the arena slot stays
    /// reserved until the journal is purged.
    pub fn remove_block(&mut self, id: BlockId, journal: &mut Journal) {
        let (layer, owner, cells) = {
            let block = self.network.blocks.get(id);
            (block.layer, block.ue, block.cells().collect::<Vec<_>>())
        };

        for &(f, t) in &cells {
            let at = CellAddr {
                layer,
                freq: f,
                time: t,
            };
            let cell = self.network.layer(layer).cell(f, t);
            journal.record(UndoOp::RestoreCell {
                at,
                block: cell.block,
                offset_in_block: cell.offset_in_block,
            });
            journal.record(UndoOp::RestoreSinrCache {
                at,
                sinr_db: cell.sinr_db,
                valid: cell.sinr_valid,
            });
            let cell = self.network.layer_mut(layer).cell_mut(f, t);
            cell.block = None;
            cell.offset_in_block = 0;
            cell.sinr_valid = false;
        }

        self.invalidate_neighbours(layer, &cells, owner, journal);

        let link = self
            .network
            .ue_mut(owner)
            .link_mut(layer.station)
            .expect("removing a block from a UE without a link to this station");
        let position = link
            .blocks
            .iter()
            .position(|&held| held == id)
            .expect("removing a block missing from its link list");
        link.blocks.remove(position);
        let block = self.network.blocks.take(id);
        journal.record(UndoOp::ReinsertBlock {
            id,
            block,
            position,
        });
        journal.record_purge(PurgeOp::ReleaseSlot { id });
    }

    /// Invalidates the cached SINR of every cell whose interference sum the
    /// mutation at `cells` changed, and flags the owning UEs for
    /// recalculation. Returns the disturbed allocated UEs.
    fn invalidate_neighbours(
        &mut self,
        layer: LayerRef,
        cells: &[(usize, usize)],
        skip: UeId,
        journal: &mut Journal,
    ) -> Vec<UeId> {
        let mut touched: Vec<(CellAddr, UeId)> = Vec::new();
        {
            let station = self.network.station(layer.station);
            let other_station = self.network.station(layer.station.other());
            for &(f, t) in cells {
                for other_layer in &station.frame.layers {
                    if other_layer.id.index == layer.index {
                        continue;
                    }
                    if let Some(block) = other_layer.cell(f, t).block {
                        let owner = self.network.blocks.get(block).ue;
                        if owner != skip {
                            touched.push((
                                CellAddr {
                                    layer: other_layer.id,
                                    freq: f,
                                    time: t,
                                },
                                owner,
                            ));
                        }
                    }
                }
                if let Some(partner_freq) = station.frame.layer(layer.index).cell(f, t).cochannel {
                    for other_layer in &other_station.frame.layers {
                        if let Some(block) = other_layer.cell(partner_freq, t).block {
                            let owner = self.network.blocks.get(block).ue;
                            if owner != skip {
                                touched.push((
                                    CellAddr {
                                        layer: other_layer.id,
                                        freq: partner_freq,
                                        time: t,
                                    },
                                    owner,
                                ));
                            }
                        }
                    }
                }
            }
        }

        let mut affected = Vec::new();
        for (at, owner) in touched {
            let cell = self.network.layer(at.layer).cell(at.freq, at.time);
            if cell.sinr_valid {
                journal.record(UndoOp::RestoreSinrCache {
                    at,
                    sinr_db: cell.sinr_db,
                    valid: cell.sinr_valid,
                });
                self.network
                    .layer_mut(at.layer)
                    .cell_mut(at.freq, at.time)
                    .sinr_valid = false;
            }
            if !affected.contains(&owner) {
                affected.push(owner);
                let target = self.network.ue_mut(owner);
                if !target.needs_recalc {
                    journal.record(UndoOp::RestoreUeStatus {
                        ue: owner,
                        is_allocated: target.is_allocated,
                        throughput: target.throughput,
                        needs_recalc: target.needs_recalc,
                    });
                    target.needs_recalc = true;
                }
            }
        }
        affected
    }

    /// Writes the final per-link MCS (worst among held blocks), the total
    /// throughput, and the allocation flag of one UE.
    pub fn finalize_ue(&mut self, ue: UeId, journal: &mut Journal) {
        let stations = self.network.ue(ue).connection.stations();
        let mut total = 0.0;
        let mut any_blocks = false;
        for &station in stations {
            let (old_mcs, worst, empty) = {
                let link = self
                    .network
                    .ue(ue)
                    .link(station)
                    .expect("finalizing a link the UE does not have");
                let worst = link
                    .blocks
                    .iter()
                    .map(|&id| self.network.blocks.get(id).mcs)
                    .min();
                (link.mcs, worst, link.blocks.is_empty())
            };
            journal.record(UndoOp::RestoreLinkMcs {
                ue,
                station,
                mcs: old_mcs,
            });
            let link = self
                .network
                .ue_mut(ue)
                .link_mut(station)
                .expect("finalizing a link the UE does not have");
            link.mcs = worst.unwrap_or(crate::radio::Mcs::UNUSABLE);
            any_blocks |= !empty;
            total += self.network.link_throughput(ue, station);
        }
        let target = self.network.ue_mut(ue);
        journal.record(UndoOp::RestoreUeStatus {
            ue,
            is_allocated: target.is_allocated,
            throughput: target.throughput,
            needs_recalc: target.needs_recalc,
        });
        target.throughput = total;
        target.is_allocated = any_blocks;
        target.needs_recalc = false;
    }

    /// Removes every block of the UE and marks it unallocated. The system
    /// reaches a consistent state even though this UE loses service.
    pub(crate) fn evict_ue(&mut self, ue: UeId, journal: &mut Journal) {
        let mut ids: Vec<BlockId> = Vec::new();
        for &station in self.network.ue(ue).connection.stations() {
            if let Some(link) = self.network.ue(ue).link(station) {
                ids.extend(link.blocks.iter().copied());
            }
        }
        for id in ids {
            self.remove_block(id, journal);
        }
        self.finalize_ue(ue, journal);
        self.evicted.push(ue);
        self.stats.evictions += 1;
        debug!("evicted UE {}", ue.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::testing::*;
    use crate::radio::Numerology;

    #[test]
    fn placement_rejects_occupied_cells() {
        let mut network = network(1, 0);
        let a = add_nextgen_ue(&mut network, 60.0, 1000.0, vec![Numerology::N2]);
        let b = add_nextgen_ue(&mut network, 80.0, 1000.0, vec![Numerology::N2]);
        let channel = ChannelModel::new(&network);
        let mut allocator = Allocator::new(&mut network, &channel);
        let layer = LayerRef {
            station: StationKind::NextGen,
            index: 0,
        };
        let mut journal = Journal::new();
        let kind = BlockKind::NextGen(Numerology::N2);
        assert!(allocator
            .place_block(a, layer, 0, 0, kind, &mut journal)
            .is_some());
        // Overlapping placement by another UE fails without corrupting the owner.
        assert!(allocator
            .place_block(b, layer, 2, 2, kind, &mut journal)
            .is_none());
        assert_eq!(
            allocator.network.layer(layer).cell(0, 0).block.is_some(),
            true
        );
        journal.purge(&mut network);
    }

    #[test]
    fn self_overlap_fails_like_any_other_overlap() {
        let mut network = network(1, 0);
        let ue = add_nextgen_ue(&mut network, 60.0, 1000.0, vec![Numerology::N2]);
        let channel = ChannelModel::new(&network);
        let mut allocator = Allocator::new(&mut network, &channel);
        let layer = LayerRef {
            station: StationKind::NextGen,
            index: 0,
        };
        let mut journal = Journal::new();
        let kind = BlockKind::NextGen(Numerology::N2);
        let (first, _) = allocator
            .place_block(ue, layer, 0, 0, kind, &mut journal)
            .expect("first placement");
        assert!(allocator
            .place_block(ue, layer, 0, 0, kind, &mut journal)
            .is_none());
        assert_eq!(allocator.network.layer(layer).cell(0, 0).block, Some(first));
        journal.purge(&mut network);
    }

    #[test]
    fn place_then_undo_restores_everything() {
        let mut network = network(2, 0);
        let ue = add_nextgen_ue(&mut network, 60.0, 1000.0, vec![Numerology::N1]);
        let channel = ChannelModel::new(&network);
        let before = network.clone();
        {
            let mut allocator = Allocator::new(&mut network, &channel);
            let layer = LayerRef {
                station: StationKind::NextGen,
                index: 0,
            };
            let mut journal = Journal::new();
            allocator
                .place_block(ue, layer, 0, 0, BlockKind::NextGen(Numerology::N1), &mut journal)
                .expect("placement");
            journal.undo(&mut network);
        }
        assert_eq!(network.ue(ue), before.ue(ue));
        assert!(network.blocks.is_empty());
        for (layer_before, layer_after) in before
            .gnb
            .frame
            .layers
            .iter()
            .zip(network.gnb.frame.layers.iter())
        {
            for f in 0..layer_before.freq_units() {
                for t in 0..layer_before.time_units() {
                    assert_eq!(layer_before.cell(f, t), layer_after.cell(f, t));
                }
            }
        }
    }

    #[test]
    fn remove_then_undo_reinstates_block() {
        let mut network = network(1, 0);
        let ue = add_nextgen_ue(&mut network, 60.0, 1000.0, vec![Numerology::N1]);
        let channel = ChannelModel::new(&network);
        let layer = LayerRef {
            station: StationKind::NextGen,
            index: 0,
        };
        let mut setup = Journal::new();
        let id = {
            let mut allocator = Allocator::new(&mut network, &channel);
            let (id, _) = allocator
                .place_block(ue, layer, 4, 0, BlockKind::NextGen(Numerology::N1), &mut setup)
                .expect("placement");
            id
        };
        setup.purge(&mut network);

        let mut journal = Journal::new();
        {
            let mut allocator = Allocator::new(&mut network, &channel);
            allocator.remove_block(id, &mut journal);
            assert!(allocator.network.layer(layer).is_free(4, 0));
        }
        journal.undo(&mut network);
        assert_eq!(network.layer(layer).cell(4, 0).block, Some(id));
        assert_eq!(network.ue(ue).link(StationKind::NextGen).unwrap().blocks, vec![id]);
    }
}

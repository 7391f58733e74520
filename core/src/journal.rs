//! Journaled undo for allocation transactions.
//!
//! Every mutating primitive records an enum-tagged compensating operation
//! into the caller's [`Journal`]. Rolling a transaction back replays the
//! undo operations in reverse; accepting it runs the purge operations
//! (bookkeeping cleanup such as freeing arena slots) and drops the undo
//! history. Rollback is a value, not control flow: failed placements are an
//! expected outcome, so nothing here unwinds the stack.
//!
//! A nested transaction on another object is merged as a single child entry,
//! so undoing the parent transitively unwinds the child in the right order.

use crate::grid::{BlockId, CellAddr, LayerRef, ResourceBlock};
use crate::network::{Network, UeId};
use crate::radio::{Mcs, Numerology};
use crate::grid::StationKind;

/// Compensating operation restoring one piece of prior state.
#[derive(Debug)]
pub enum UndoOp {
    /// Put a cell's ownership fields back.
    RestoreCell {
        at: CellAddr,
        block: Option<BlockId>,
        offset_in_block: usize,
    },
    /// Put a cell's cached SINR back.
    RestoreSinrCache {
        at: CellAddr,
        sinr_db: f64,
        valid: bool,
    },
    /// Undo of a block insertion: drop it from its link list and the arena.
    DiscardBlock { id: BlockId },
    /// Undo of a block removal: reinstate the block value at its old slot
    /// and list position.
    ReinsertBlock {
        id: BlockId,
        block: ResourceBlock,
        position: usize,
    },
    /// Put a block's computed SINR/MCS back.
    RestoreBlockQuality {
        id: BlockId,
        sinr_db: f64,
        mcs: Mcs,
    },
    /// Put a UE's allocation flags back.
    RestoreUeStatus {
        ue: UeId,
        is_allocated: bool,
        throughput: f64,
        needs_recalc: bool,
    },
    RestoreLinkMcs {
        ue: UeId,
        station: StationKind,
        mcs: Mcs,
    },
    RestoreLinkSplit {
        ue: UeId,
        station: StationKind,
        request_split: f64,
    },
    RestoreNumerology { ue: UeId, numerology: Numerology },
    RestoreAvailableOffset { layer: LayerRef, offset: usize },
}

/// Cleanup run when a transaction is accepted permanently.
#[derive(Debug)]
pub enum PurgeOp {
    /// A removed block's arena slot may be recycled once the removal can no
    /// longer be undone.
    ReleaseSlot { id: BlockId },
}

#[derive(Debug)]
enum Entry {
    Undo(UndoOp),
    Purge(PurgeOp),
    /// A committed sub-transaction: undone or purged together with us.
    Child(Journal),
}

/// Append-only log of reversible operations for one transaction scope.
#[derive(Debug, Default)]
pub struct Journal {
    entries: Vec<Entry>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn record(&mut self, op: UndoOp) {
        self.entries.push(Entry::Undo(op));
    }

    pub fn record_purge(&mut self, op: PurgeOp) {
        self.entries.push(Entry::Purge(op));
    }

    /// Adopts a completed child transaction as one entry of this journal.
    pub fn merge_child(&mut self, child: Journal) {
        if !child.is_empty() {
            self.entries.push(Entry::Child(child));
        }
    }

    /// Replays the undo log in reverse; purge entries are dropped, since a
    /// purge only makes sense for a change that is being kept.
    pub fn undo(self, network: &mut Network) {
        for entry in self.entries.into_iter().rev() {
            match entry {
                Entry::Undo(op) => apply_undo(op, network),
                Entry::Purge(_) => {}
                Entry::Child(child) => child.undo(network),
            }
        }
    }

    /// Accepts the transaction: runs cleanup and drops the undo history.
    pub fn purge(self, network: &mut Network) {
        for entry in self.entries {
            match entry {
                Entry::Undo(_) => {}
                Entry::Purge(op) => apply_purge(op, network),
                Entry::Child(child) => child.purge(network),
            }
        }
    }
}

fn apply_undo(op: UndoOp, network: &mut Network) {
    match op {
        UndoOp::RestoreCell {
            at,
            block,
            offset_in_block,
        } => {
            let cell = network.layer_mut(at.layer).cell_mut(at.freq, at.time);
            cell.block = block;
            cell.offset_in_block = offset_in_block;
        }
        UndoOp::RestoreSinrCache { at, sinr_db, valid } => {
            let cell = network.layer_mut(at.layer).cell_mut(at.freq, at.time);
            cell.sinr_db = sinr_db;
            cell.sinr_valid = valid;
        }
        UndoOp::DiscardBlock { id } => {
            let (ue, station) = {
                let block = network.blocks.get(id);
                (block.ue, block.layer.station)
            };
            let link = network
                .ue_mut(ue)
                .link_mut(station)
                .expect("journaled block belongs to a missing link");
            let position = link
                .blocks
                .iter()
                .position(|&held| held == id)
                .expect("journaled block missing from its link list");
            link.blocks.remove(position);
            network.blocks.discard(id);
        }
        UndoOp::ReinsertBlock {
            id,
            block,
            position,
        } => {
            let ue = block.ue;
            let station = block.layer.station;
            network.blocks.restore(id, block);
            let link = network
                .ue_mut(ue)
                .link_mut(station)
                .expect("journaled block belongs to a missing link");
            link.blocks.insert(position, id);
        }
        UndoOp::RestoreBlockQuality { id, sinr_db, mcs } => {
            let block = network.blocks.get_mut(id);
            block.sinr_db = sinr_db;
            block.mcs = mcs;
        }
        UndoOp::RestoreUeStatus {
            ue,
            is_allocated,
            throughput,
            needs_recalc,
        } => {
            let ue = network.ue_mut(ue);
            ue.is_allocated = is_allocated;
            ue.throughput = throughput;
            ue.needs_recalc = needs_recalc;
        }
        UndoOp::RestoreLinkMcs { ue, station, mcs } => {
            network
                .ue_mut(ue)
                .link_mut(station)
                .expect("journaled MCS belongs to a missing link")
                .mcs = mcs;
        }
        UndoOp::RestoreLinkSplit {
            ue,
            station,
            request_split,
        } => {
            network
                .ue_mut(ue)
                .link_mut(station)
                .expect("journaled split belongs to a missing link")
                .request_split = request_split;
        }
        UndoOp::RestoreNumerology { ue, numerology } => {
            network.ue_mut(ue).numerology = numerology;
        }
        UndoOp::RestoreAvailableOffset { layer, offset } => {
            network.layer_mut(layer).available_offset = offset;
        }
    }
}

fn apply_purge(op: PurgeOp, network: &mut Network) {
    match op {
        PurgeOp::ReleaseSlot { id } => network.blocks.release(id),
    }
}

//! Frequency-time resource grids.
//!
//! Each station owns a [`Frame`] of one or more [`Layer`]s; a layer is a
//! `freq x time` grid of [`BaseUnit`] cells. A cell belongs to at most one
//! [`ResourceBlock`], and blocks live in a slot arena so removed blocks can
//! be reinstated by the undo journal without invalidating their ids.

pub mod space;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::geometry::CircularRegion;
use crate::network::UeId;
use crate::radio::{BlockKind, Mcs};
use space::{scan_layer, Space};

/// Station generation: legacy ("E") or next-generation ("G").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StationKind {
    Legacy,
    NextGen,
}

impl StationKind {
    pub fn other(self) -> StationKind {
        match self {
            StationKind::Legacy => StationKind::NextGen,
            StationKind::NextGen => StationKind::Legacy,
        }
    }
}

/// Stable identity of one layer: owning station plus index within the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerRef {
    pub station: StationKind,
    pub index: usize,
}

/// One grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellAddr {
    pub layer: LayerRef,
    pub freq: usize,
    pub time: usize,
}

/// Arena handle of a resource block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId(pub usize);

/// One grid cell: optional owning block, cached SINR, and the co-channel
/// partner frequency in the other station's frame when the cell sits inside
/// the overlap region.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseUnit {
    pub block: Option<BlockId>,
    /// Row-major offset of this cell within its owning block.
    pub offset_in_block: usize,
    pub sinr_db: f64,
    pub sinr_valid: bool,
    pub cochannel: Option<usize>,
}

impl Default for BaseUnit {
    fn default() -> Self {
        Self {
            block: None,
            offset_in_block: 0,
            sinr_db: f64::NEG_INFINITY,
            sinr_valid: false,
            cochannel: None,
        }
    }
}

impl BaseUnit {
    pub fn is_free(&self) -> bool {
        self.block.is_none()
    }
}

/// A fixed-size grid of base units plus the bookkeeping the zone fast path
/// and the space scanner rely on.
#[derive(Debug, Clone)]
pub struct Layer {
    pub id: LayerRef,
    cells: Array2<BaseUnit>,
    /// Next free frequency row for sequential zone writes; only ever grows
    /// within one allocation run (journal rollback aside).
    pub available_offset: usize,
    scan_dirty: bool,
    scan_cache: Vec<Space>,
}

impl Layer {
    fn new(id: LayerRef, freq_units: usize, time_units: usize) -> Self {
        Self {
            id,
            cells: Array2::default((freq_units, time_units)),
            available_offset: 0,
            scan_dirty: true,
            scan_cache: Vec::new(),
        }
    }

    pub fn freq_units(&self) -> usize {
        self.cells.nrows()
    }

    pub fn time_units(&self) -> usize {
        self.cells.ncols()
    }

    pub fn cell(&self, freq: usize, time: usize) -> &BaseUnit {
        &self.cells[(freq, time)]
    }

    /// Mutable cell access; invalidates the cached space scan.
    pub fn cell_mut(&mut self, freq: usize, time: usize) -> &mut BaseUnit {
        self.scan_dirty = true;
        &mut self.cells[(freq, time)]
    }

    pub fn is_free(&self, freq: usize, time: usize) -> bool {
        self.cells[(freq, time)].is_free()
    }

    /// Maximal free rectangles, recomputed only after occupancy changed.
    pub fn empty_spaces(&mut self) -> Vec<Space> {
        if self.scan_dirty {
            self.scan_cache = scan_layer(self);
            self.scan_dirty = false;
        }
        self.scan_cache.clone()
    }

    pub fn occupied_units(&self) -> usize {
        self.cells.iter().filter(|cell| !cell.is_free()).count()
    }
}

/// Ordered list of layers sharing one frequency-time extent.
#[derive(Debug, Clone)]
pub struct Frame {
    pub freq_units: usize,
    pub time_units: usize,
    pub layers: Vec<Layer>,
}

impl Frame {
    pub fn new(
        station: StationKind,
        freq_units: usize,
        time_units: usize,
        layer_count: usize,
    ) -> Self {
        let layers = (0..layer_count)
            .map(|index| Layer::new(LayerRef { station, index }, freq_units, time_units))
            .collect();
        Self {
            freq_units,
            time_units,
            layers,
        }
    }

    pub fn layer(&self, index: usize) -> &Layer {
        &self.layers[index]
    }

    pub fn layer_mut(&mut self, index: usize) -> &mut Layer {
        &mut self.layers[index]
    }
}

/// Radio station: coverage geometry, transmit power, and its frame.
/// Created once per run and never relocated.
#[derive(Debug, Clone)]
pub struct Station {
    pub kind: StationKind,
    pub region: CircularRegion,
    pub tx_power_dbm: f64,
    pub frame: Frame,
}

impl Station {
    pub fn new(
        kind: StationKind,
        region: CircularRegion,
        tx_power_dbm: f64,
        freq_units: usize,
        time_units: usize,
        layer_count: usize,
    ) -> Self {
        Self {
            kind,
            region,
            tx_power_dbm,
            frame: Frame::new(kind, freq_units, time_units, layer_count),
        }
    }
}

/// A rectangular run of base units assigned to one UE.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceBlock {
    pub ue: UeId,
    pub layer: LayerRef,
    pub freq: usize,
    pub time: usize,
    pub kind: BlockKind,
    /// Minimum SINR over the block's cells, dB.
    pub sinr_db: f64,
    /// MCS last assigned from that SINR.
    pub mcs: Mcs,
}

impl ResourceBlock {
    pub fn new(ue: UeId, layer: LayerRef, freq: usize, time: usize, kind: BlockKind) -> Self {
        Self {
            ue,
            layer,
            freq,
            time,
            kind,
            sinr_db: f64::NEG_INFINITY,
            mcs: Mcs::UNUSABLE,
        }
    }

    /// Covered cell coordinates in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let shape = self.kind.shape();
        (0..shape.freq)
            .flat_map(move |df| (0..shape.time).map(move |dt| (self.freq + df, self.time + dt)))
    }
}

/// Slot arena for resource blocks.
///
/// A removed block leaves a tombstone until the journal either reinstates it
/// (undo) or releases the slot for reuse (purge); ids therefore stay valid
/// across a pending transaction.
#[derive(Debug, Default, Clone)]
pub struct BlockArena {
    slots: Vec<Option<ResourceBlock>>,
    free: Vec<usize>,
}

impl BlockArena {
    pub fn insert(&mut self, block: ResourceBlock) -> BlockId {
        if let Some(index) = self.free.pop() {
            debug_assert!(self.slots[index].is_none());
            self.slots[index] = Some(block);
            BlockId(index)
        } else {
            self.slots.push(Some(block));
            BlockId(self.slots.len() - 1)
        }
    }

    pub fn get(&self, id: BlockId) -> &ResourceBlock {
        self.slots[id.0]
            .as_ref()
            .expect("resource block id refers to a vacant slot")
    }

    pub fn get_mut(&mut self, id: BlockId) -> &mut ResourceBlock {
        self.slots[id.0]
            .as_mut()
            .expect("resource block id refers to a vacant slot")
    }

    /// Removes the block but keeps the slot reserved for a possible undo.
    pub fn take(&mut self, id: BlockId) -> ResourceBlock {
        self.slots[id.0]
            .take()
            .expect("taking a resource block from a vacant slot")
    }

    /// Undo counterpart of [`BlockArena::take`].
    pub fn restore(&mut self, id: BlockId, block: ResourceBlock) {
        debug_assert!(self.slots[id.0].is_none());
        self.slots[id.0] = Some(block);
    }

    /// Purge counterpart of [`BlockArena::take`]: frees the slot for reuse.
    pub fn release(&mut self, id: BlockId) {
        debug_assert!(self.slots[id.0].is_none());
        self.free.push(id.0);
    }

    /// Undo counterpart of [`BlockArena::insert`].
    pub fn discard(&mut self, id: BlockId) {
        self.slots[id.0]
            .take()
            .expect("discarding a resource block from a vacant slot");
        self.free.push(id.0);
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (BlockId, &ResourceBlock)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|block| (BlockId(index), block)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Coordinate;
    use crate::radio::Numerology;

    fn station() -> Station {
        Station::new(
            StationKind::NextGen,
            CircularRegion::new(Coordinate::new(0.0, 0.0), 200.0),
            40.0,
            16,
            16,
            2,
        )
    }

    #[test]
    fn frame_builds_requested_layers() {
        let station = station();
        assert_eq!(station.frame.layers.len(), 2);
        assert_eq!(station.frame.layer(1).id.index, 1);
        assert!(station.frame.layer(0).is_free(0, 0));
    }

    #[test]
    fn block_cells_walk_row_major() {
        let block = ResourceBlock::new(
            UeId(0),
            LayerRef {
                station: StationKind::NextGen,
                index: 0,
            },
            2,
            4,
            BlockKind::NextGen(Numerology::N1),
        );
        let cells: Vec<_> = block.cells().collect();
        assert_eq!(cells.len(), 16);
        assert_eq!(cells[0], (2, 4));
        assert_eq!(cells[7], (2, 11));
        assert_eq!(cells[8], (3, 4));
    }

    #[test]
    fn arena_take_reserves_slot_until_released() {
        let mut arena = BlockArena::default();
        let layer = LayerRef {
            station: StationKind::Legacy,
            index: 0,
        };
        let a = arena.insert(ResourceBlock::new(UeId(0), layer, 0, 0, BlockKind::Legacy));
        let removed = arena.take(a);
        // The reserved slot must not be handed out while the undo is pending.
        let b = arena.insert(ResourceBlock::new(UeId(1), layer, 4, 0, BlockKind::Legacy));
        assert_ne!(a, b);
        arena.restore(a, removed);
        assert_eq!(arena.get(a).ue, UeId(0));
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn arena_release_recycles_slot() {
        let mut arena = BlockArena::default();
        let layer = LayerRef {
            station: StationKind::Legacy,
            index: 0,
        };
        let a = arena.insert(ResourceBlock::new(UeId(0), layer, 0, 0, BlockKind::Legacy));
        arena.take(a);
        arena.release(a);
        let b = arena.insert(ResourceBlock::new(UeId(1), layer, 4, 0, BlockKind::Legacy));
        assert_eq!(a, b);
    }
}

//! Convenience re-exports for downstream drivers.

pub use crate::alloc::{AllocationPolicy, Allocator, AllocatorStats};
pub use crate::channel::ChannelModel;
pub use crate::geometry::{CircularRegion, Coordinate};
pub use crate::grid::space::Space;
pub use crate::grid::{
    BaseUnit, BlockId, CellAddr, Frame, Layer, LayerRef, ResourceBlock, Station, StationKind,
};
pub use crate::journal::Journal;
pub use crate::network::{Connection, LinkInfo, Network, UeId, UserEquipment};
pub use crate::radio::{BlockKind, BlockShape, Mcs, Numerology};
pub use crate::strategy::{
    by_name, strategy_names, AllocationStrategy, DcRa, Frsa, Intuitive, Msema, StrategyReport,
};
pub use crate::{ModelError, ModelResult};

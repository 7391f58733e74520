//! User equipment and the root network state.
//!
//! Connection capability is a closed tagged variant: a legacy-only UE has no
//! next-generation link record at all, so "which stations can this UE use"
//! is answered by pattern matching rather than presence checks.

use serde::Serialize;

use crate::geometry::Coordinate;
use crate::grid::{BlockArena, BlockId, LayerRef, Station, StationKind};
use crate::radio::{Mcs, Numerology};
use crate::{ModelError, ModelResult};

/// Index into [`Network::ues`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct UeId(pub usize);

/// Per-station link state of one UE.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkInfo {
    /// Worst MCS among the held blocks, the uniform per-block rate.
    pub mcs: Mcs,
    /// Blocks held at this station, in allocation order.
    pub blocks: Vec<BlockId>,
    /// Share of the request routed to this station, bits per frame.
    pub request_split: f64,
}

impl LinkInfo {
    pub fn new() -> Self {
        Self {
            mcs: Mcs::UNUSABLE,
            blocks: Vec::new(),
            request_split: 0.0,
        }
    }
}

impl Default for LinkInfo {
    fn default() -> Self {
        Self::new()
    }
}

/// Closed set of connection capabilities.
#[derive(Debug, Clone, PartialEq)]
pub enum Connection {
    LegacyOnly(LinkInfo),
    NextGenOnly(LinkInfo),
    Dual {
        legacy: LinkInfo,
        next_gen: LinkInfo,
    },
}

impl Connection {
    pub fn link(&self, station: StationKind) -> Option<&LinkInfo> {
        match (self, station) {
            (Connection::LegacyOnly(link), StationKind::Legacy) => Some(link),
            (Connection::NextGenOnly(link), StationKind::NextGen) => Some(link),
            (Connection::Dual { legacy, .. }, StationKind::Legacy) => Some(legacy),
            (Connection::Dual { next_gen, .. }, StationKind::NextGen) => Some(next_gen),
            _ => None,
        }
    }

    pub fn link_mut(&mut self, station: StationKind) -> Option<&mut LinkInfo> {
        match (self, station) {
            (Connection::LegacyOnly(link), StationKind::Legacy) => Some(link),
            (Connection::NextGenOnly(link), StationKind::NextGen) => Some(link),
            (Connection::Dual { legacy, .. }, StationKind::Legacy) => Some(legacy),
            (Connection::Dual { next_gen, .. }, StationKind::NextGen) => Some(next_gen),
            _ => None,
        }
    }

    /// Stations this UE can attach to, next-generation first for duals.
    pub fn stations(&self) -> &'static [StationKind] {
        match self {
            Connection::LegacyOnly(_) => &[StationKind::Legacy],
            Connection::NextGenOnly(_) => &[StationKind::NextGen],
            Connection::Dual { .. } => &[StationKind::NextGen, StationKind::Legacy],
        }
    }

    pub fn is_dual(&self) -> bool {
        matches!(self, Connection::Dual { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Connection::LegacyOnly(_) => "legacy-only",
            Connection::NextGenOnly(_) => "next-gen-only",
            Connection::Dual { .. } => "dual",
        }
    }
}

/// One user device.
#[derive(Debug, Clone, PartialEq)]
pub struct UserEquipment {
    pub id: UeId,
    pub coord: Coordinate,
    /// Requested data rate, bits per frame.
    pub request_rate: f64,
    /// Numerologies this UE can use at the next-generation station.
    pub candidates: Vec<Numerology>,
    /// Numerology currently in use.
    pub numerology: Numerology,
    pub connection: Connection,
    pub is_allocated: bool,
    /// Bits per frame across both links; `>= request_rate` whenever
    /// `is_allocated`, except transiently inside a journaled mutation.
    pub throughput: f64,
    /// Set when interference around this UE's blocks changed and its
    /// SINR/MCS must be recomputed.
    pub needs_recalc: bool,
}

impl UserEquipment {
    pub fn new(
        id: UeId,
        coord: Coordinate,
        request_rate: f64,
        candidates: Vec<Numerology>,
        connection: Connection,
    ) -> ModelResult<Self> {
        if request_rate <= 0.0 {
            return Err(ModelError::InvalidProfile(format!(
                "UE {} has non-positive request rate",
                id.0
            )));
        }
        let needs_candidates = !matches!(connection, Connection::LegacyOnly(_));
        if needs_candidates && candidates.is_empty() {
            return Err(ModelError::InvalidProfile(format!(
                "UE {} reaches the next-generation station but offers no numerology",
                id.0
            )));
        }
        let numerology = candidates.first().copied().unwrap_or(Numerology::N0);
        Ok(Self {
            id,
            coord,
            request_rate,
            candidates,
            numerology,
            connection,
            is_allocated: false,
            throughput: 0.0,
            needs_recalc: false,
        })
    }

    pub fn link(&self, station: StationKind) -> Option<&LinkInfo> {
        self.connection.link(station)
    }

    pub fn link_mut(&mut self, station: StationKind) -> Option<&mut LinkInfo> {
        self.connection.link_mut(station)
    }
}

/// Root state shared by every allocation primitive: both stations, the UE
/// table, and the block arena.
#[derive(Debug, Clone)]
pub struct Network {
    pub enb: Station,
    pub gnb: Station,
    pub ues: Vec<UserEquipment>,
    pub blocks: BlockArena,
    pub cochannel_width: usize,
}

impl Network {
    pub fn new(enb: Station, gnb: Station, cochannel_width: usize) -> ModelResult<Self> {
        if enb.kind != StationKind::Legacy || gnb.kind != StationKind::NextGen {
            return Err(ModelError::InvalidTopology(
                "stations must be one legacy and one next-generation".into(),
            ));
        }
        if enb.frame.layers.len() != 1 {
            return Err(ModelError::InvalidTopology(
                "the legacy station carries exactly one layer".into(),
            ));
        }
        if gnb.frame.layers.is_empty() {
            return Err(ModelError::InvalidTopology(
                "the next-generation station needs at least one layer".into(),
            ));
        }
        if enb.frame.freq_units == 0 || gnb.frame.freq_units == 0 {
            return Err(ModelError::InvalidTopology(
                "a frame needs a non-empty frequency band".into(),
            ));
        }
        if cochannel_width > enb.frame.freq_units || cochannel_width > gnb.frame.freq_units {
            return Err(ModelError::InvalidTopology(
                "co-channel overlap exceeds a frame's bandwidth".into(),
            ));
        }
        if enb.frame.time_units != gnb.frame.time_units {
            return Err(ModelError::InvalidTopology(
                "frames must share the time extent for co-channel pairing".into(),
            ));
        }
        // Zone writes pack whole blocks per frame row; a time extent that
        // does not divide evenly would break their cursor arithmetic.
        let longest_block = Numerology::ALL
            .iter()
            .map(|numerology| numerology.shape().time)
            .max()
            .unwrap_or(1);
        if enb.frame.time_units == 0 || enb.frame.time_units % longest_block != 0 {
            return Err(ModelError::InvalidTopology(
                "frame time extent must be a positive multiple of the longest block duration"
                    .into(),
            ));
        }
        let mut network = Self {
            enb,
            gnb,
            ues: Vec::new(),
            blocks: BlockArena::default(),
            cochannel_width,
        };
        network.wire_cochannel();
        Ok(network)
    }

    /// Pairs base units of the overlap region 1:1 by bandwidth offset: the
    /// top of the legacy band maps onto the bottom of the next-gen band.
    fn wire_cochannel(&mut self) {
        let width = self.cochannel_width;
        if width == 0 {
            return;
        }
        let enb_base = self.enb.frame.freq_units - width;
        for layer in &mut self.enb.frame.layers {
            for offset in 0..width {
                for time in 0..layer.time_units() {
                    layer.cell_mut(enb_base + offset, time).cochannel = Some(offset);
                }
            }
        }
        for layer in &mut self.gnb.frame.layers {
            for offset in 0..width {
                for time in 0..layer.time_units() {
                    layer.cell_mut(offset, time).cochannel = Some(enb_base + offset);
                }
            }
        }
    }

    pub fn station(&self, kind: StationKind) -> &Station {
        match kind {
            StationKind::Legacy => &self.enb,
            StationKind::NextGen => &self.gnb,
        }
    }

    pub fn station_mut(&mut self, kind: StationKind) -> &mut Station {
        match kind {
            StationKind::Legacy => &mut self.enb,
            StationKind::NextGen => &mut self.gnb,
        }
    }

    pub fn layer(&self, layer: LayerRef) -> &crate::grid::Layer {
        self.station(layer.station).frame.layer(layer.index)
    }

    pub fn layer_mut(&mut self, layer: LayerRef) -> &mut crate::grid::Layer {
        self.station_mut(layer.station).frame.layer_mut(layer.index)
    }

    pub fn ue(&self, id: UeId) -> &UserEquipment {
        &self.ues[id.0]
    }

    pub fn ue_mut(&mut self, id: UeId) -> &mut UserEquipment {
        &mut self.ues[id.0]
    }

    pub fn add_ue(&mut self, ue: UserEquipment) -> UeId {
        debug_assert_eq!(ue.id.0, self.ues.len());
        let id = ue.id;
        self.ues.push(ue);
        id
    }

    pub fn ue_ids(&self) -> impl Iterator<Item = UeId> + '_ {
        (0..self.ues.len()).map(UeId)
    }

    /// UEs that can attach to `station`, in id order.
    pub fn ues_reaching(&self, station: StationKind) -> Vec<UeId> {
        self.ues
            .iter()
            .filter(|ue| ue.link(station).is_some())
            .map(|ue| ue.id)
            .collect()
    }

    /// Uniform-rate throughput of one link: worst MCS times block count.
    pub fn link_throughput(&self, ue: UeId, station: StationKind) -> f64 {
        let Some(link) = self.ue(ue).link(station) else {
            return 0.0;
        };
        if link.blocks.is_empty() {
            return 0.0;
        }
        let worst = link
            .blocks
            .iter()
            .map(|&id| self.blocks.get(id).mcs)
            .min()
            .expect("non-empty block list");
        let kind = self.blocks.get(link.blocks[0]).kind;
        worst.bits_per_block(kind) * link.blocks.len() as f64
    }

    /// Throughput across both links of one UE.
    pub fn ue_throughput(&self, ue: UeId) -> f64 {
        self.ue(ue)
            .connection
            .stations()
            .iter()
            .map(|&station| self.link_throughput(ue, station))
            .sum()
    }

    /// Sum of allocated UEs' throughput, bits per frame.
    pub fn system_throughput(&self) -> f64 {
        self.ues
            .iter()
            .filter(|ue| ue.is_allocated)
            .map(|ue| ue.throughput)
            .sum()
    }

    /// Reporting snapshot for the excluded visualization layer.
    pub fn outcomes(&self) -> Vec<UeOutcome> {
        self.ues
            .iter()
            .map(|ue| UeOutcome {
                ue: ue.id,
                connection: ue.connection.label(),
                is_allocated: ue.is_allocated,
                request_rate: ue.request_rate,
                throughput: ue.throughput,
                links: ue
                    .connection
                    .stations()
                    .iter()
                    .filter_map(|&station| {
                        let link = ue.link(station)?;
                        Some(LinkOutcome {
                            station,
                            mcs_level: link.mcs.level(),
                            blocks: link
                                .blocks
                                .iter()
                                .map(|&id| {
                                    let block = self.blocks.get(id);
                                    BlockOutcome {
                                        layer: block.layer.index,
                                        freq: block.freq,
                                        time: block.time,
                                        sinr_db: block.sinr_db,
                                    }
                                })
                                .collect(),
                        })
                    })
                    .collect(),
            })
            .collect()
    }
}

/// Per-UE final state exposed to reporting.
#[derive(Debug, Clone, Serialize)]
pub struct UeOutcome {
    pub ue: UeId,
    pub connection: &'static str,
    pub is_allocated: bool,
    pub request_rate: f64,
    pub throughput: f64,
    pub links: Vec<LinkOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkOutcome {
    pub station: StationKind,
    pub mcs_level: u8,
    pub blocks: Vec<BlockOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockOutcome {
    pub layer: usize,
    pub freq: usize,
    pub time: usize,
    pub sinr_db: f64,
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::geometry::CircularRegion;

    /// Small two-station network used across the crate's unit tests.
    pub fn network(gnb_layers: usize, cochannel_width: usize) -> Network {
        let center = Coordinate::new(0.0, 0.0);
        let enb = Station::new(
            StationKind::Legacy,
            CircularRegion::new(center, 500.0),
            46.0,
            200,
            16,
            1,
        );
        let gnb = Station::new(
            StationKind::NextGen,
            CircularRegion::new(center, 300.0),
            40.0,
            216,
            16,
            gnb_layers,
        );
        Network::new(enb, gnb, cochannel_width).expect("test topology")
    }

    pub fn add_nextgen_ue(
        network: &mut Network,
        distance_m: f64,
        request_rate: f64,
        candidates: Vec<Numerology>,
    ) -> UeId {
        let id = UeId(network.ues.len());
        let ue = UserEquipment::new(
            id,
            Coordinate::new(distance_m, 0.0),
            request_rate,
            candidates,
            Connection::NextGenOnly(LinkInfo::new()),
        )
        .expect("test profile");
        network.add_ue(ue)
    }

    pub fn add_dual_ue(
        network: &mut Network,
        distance_m: f64,
        request_rate: f64,
        candidates: Vec<Numerology>,
    ) -> UeId {
        let id = UeId(network.ues.len());
        let ue = UserEquipment::new(
            id,
            Coordinate::new(distance_m, 0.0),
            request_rate,
            candidates,
            Connection::Dual {
                legacy: LinkInfo::new(),
                next_gen: LinkInfo::new(),
            },
        )
        .expect("test profile");
        network.add_ue(ue)
    }

    pub fn add_legacy_ue(network: &mut Network, distance_m: f64, request_rate: f64) -> UeId {
        let id = UeId(network.ues.len());
        let ue = UserEquipment::new(
            id,
            Coordinate::new(distance_m, 0.0),
            request_rate,
            Vec::new(),
            Connection::LegacyOnly(LinkInfo::new()),
        )
        .expect("test profile");
        network.add_ue(ue)
    }
}

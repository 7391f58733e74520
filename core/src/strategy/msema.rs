//! MSEMA driver: channel-quality-sorted placement that reuses numerologies
//! already present on the grid before opening a new one.
//!
//! Colocating on in-use numerologies keeps mixed-numerology boundaries (and
//! their leakage interference) to a minimum.

use super::{
    adjust_all, report, spaces_of, split_dual_requests, AllocationStrategy, StrategyReport,
};
use crate::alloc::{AllocationPolicy, Allocator};
use crate::channel::ChannelModel;
use crate::grid::StationKind;
use crate::journal::{Journal, UndoOp};
use crate::network::{Network, UeId};
use crate::radio::Numerology;

#[derive(Debug, Default)]
pub struct Msema;

impl AllocationStrategy for Msema {
    fn name(&self) -> &'static str {
        "msema"
    }

    fn run(&self, network: &mut Network, channel: &ChannelModel) -> StrategyReport {
        let mut journal = Journal::new();
        let mut allocator = Allocator::new(network, channel);
        split_dual_requests(allocator.network, channel, &mut journal);

        // Best channel first, judged at the preferred station.
        let mut ues: Vec<UeId> = allocator.network.ue_ids().collect();
        ues.sort_by(|&a, &b| {
            let quality = |ue: UeId| {
                let station = allocator.network.ue(ue).connection.stations()[0];
                channel.estimated_sinr(allocator.network, ue, station)
            };
            quality(b).total_cmp(&quality(a))
        });

        let mut in_use: Vec<Numerology> = Vec::new();
        for ue in ues {
            if allocator.network.ue(ue).link(StationKind::NextGen).is_some() {
                self.place_next_gen(&mut allocator, ue, &mut in_use, &mut journal);
            }
            if allocator.network.ue(ue).link(StationKind::Legacy).is_some()
                && allocator.network.ue_throughput(ue)
                    < allocator.network.ue(ue).request_rate
            {
                let spaces = spaces_of(allocator.network, StationKind::Legacy);
                allocator.allocate_ue(
                    ue,
                    &spaces,
                    None,
                    AllocationPolicy::default(),
                    &mut journal,
                );
            }
        }

        adjust_all(&mut allocator, AllocationPolicy::default(), &mut journal);
        let summary = report(self.name(), allocator);
        journal.purge(network);
        summary
    }
}

impl Msema {
    /// Tries the UE's candidates that are already in use on the grid, in
    /// candidate order, before falling back to the remaining candidates.
    fn place_next_gen(
        &self,
        allocator: &mut Allocator<'_>,
        ue: UeId,
        in_use: &mut Vec<Numerology>,
        journal: &mut Journal,
    ) {
        let candidates = allocator.network.ue(ue).candidates.clone();
        let (used, fresh): (Vec<Numerology>, Vec<Numerology>) = candidates
            .into_iter()
            .partition(|candidate| in_use.contains(candidate));
        for numerology in used.into_iter().chain(fresh) {
            let previous = allocator.network.ue(ue).numerology;
            if previous != numerology {
                journal.record(UndoOp::RestoreNumerology {
                    ue,
                    numerology: previous,
                });
                allocator.network.ue_mut(ue).numerology = numerology;
            }
            let spaces = spaces_of(allocator.network, StationKind::NextGen);
            if allocator.allocate_ue(ue, &spaces, None, AllocationPolicy::default(), journal) {
                if !in_use.contains(&numerology) {
                    in_use.push(numerology);
                }
                return;
            }
        }
    }
}

//! Baseline driver: farthest UE first against raw free space.
//!
//! No zone packing; a fairness-oriented ordering gives the worst channel
//! the first claim on spectrum, station by station.

use super::{
    adjust_all, report, spaces_of, split_dual_requests, AllocationStrategy, StrategyReport,
};
use crate::alloc::{AllocationPolicy, Allocator};
use crate::channel::ChannelModel;
use crate::grid::StationKind;
use crate::journal::Journal;
use crate::network::{Network, UeId};

#[derive(Debug, Default)]
pub struct Intuitive;

impl AllocationStrategy for Intuitive {
    fn name(&self) -> &'static str {
        "intuitive"
    }

    fn run(&self, network: &mut Network, channel: &ChannelModel) -> StrategyReport {
        let mut journal = Journal::new();
        let mut allocator = Allocator::new(network, channel);
        split_dual_requests(allocator.network, channel, &mut journal);

        for station in [StationKind::NextGen, StationKind::Legacy] {
            let center = allocator.network.station(station).region.center;
            let mut ues: Vec<UeId> = allocator.network.ues_reaching(station);
            ues.sort_by(|&a, &b| {
                let da = allocator.network.ue(a).coord.distance(&center);
                let db = allocator.network.ue(b).coord.distance(&center);
                db.total_cmp(&da)
            });
            for ue in ues {
                if allocator.network.ue_throughput(ue)
                    >= allocator.network.ue(ue).request_rate
                {
                    continue;
                }
                let spaces = spaces_of(allocator.network, station);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::testing::*;
    use crate::radio::Numerology;

    #[test]
    fn fulfills_near_ues_without_zone_packing() {
        let mut network = network(2, 0);
        let near = add_nextgen_ue(&mut network, 60.0, 15_000.0, vec![Numerology::N2]);
        let far = add_nextgen_ue(&mut network, 120.0, 15_000.0, vec![Numerology::N2]);
        let legacy = add_legacy_ue(&mut network, 200.0, 8_000.0);
        let channel = ChannelModel::new(&network);

        let result = Intuitive.run(&mut network, &channel);
        assert!(result.unallocated.is_empty(), "{result:?}");
        for ue in [near, far, legacy] {
            assert!(network.ue(ue).throughput >= network.ue(ue).request_rate);
        }
    }

    #[test]
    fn farther_ue_claims_space_first() {
        let mut network = network(1, 0);
        let near = add_nextgen_ue(&mut network, 60.0, 10_000.0, vec![Numerology::N2]);
        let far = add_nextgen_ue(&mut network, 150.0, 10_000.0, vec![Numerology::N2]);
        let channel = ChannelModel::new(&network);

        Intuitive.run(&mut network, &channel);
        let first_block = |ue: UeId| {
            let link = network.ue(ue).link(StationKind::NextGen).unwrap();
            let block = network.blocks.get(link.blocks[0]);
            (block.freq, block.time)
        };
        // The far UE was processed first, so it owns the grid origin.
        assert_eq!(first_block(far), (0, 0));
        assert_ne!(first_block(near), (0, 0));
    }
}

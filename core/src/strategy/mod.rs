//! Strategy drivers.
//!
//! Each driver composes the allocation primitives into one end-to-end
//! planning run; they differ in ordering and greediness, not in the
//! primitives themselves. Runs are deterministic: UEs are processed in a
//! strategy-defined order and earlier UEs get first claim on space.

mod dcra;
mod frsa;
mod intuitive;
mod msema;

pub use dcra::DcRa;
pub use frsa::Frsa;
pub use intuitive::Intuitive;
pub use msema::Msema;

use log::info;
use serde::Serialize;

use crate::alloc::{AllocationPolicy, Allocator, AllocatorStats};
use crate::channel::ChannelModel;
use crate::grid::space::Space;
use crate::grid::StationKind;
use crate::journal::{Journal, UndoOp};
use crate::network::{Network, UeId};

/// One complete allocation algorithm.
pub trait AllocationStrategy {
    fn name(&self) -> &'static str;

    /// Runs the full allocation against a freshly constructed network.
    fn run(&self, network: &mut Network, channel: &ChannelModel) -> StrategyReport;
}

/// Outcome summary of one strategy run.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyReport {
    pub strategy: &'static str,
    pub allocated: Vec<UeId>,
    pub unallocated: Vec<UeId>,
    /// Bits per frame across all allocated UEs.
    pub system_throughput: f64,
    pub stats: AllocatorStats,
}

/// Looks a driver up by its CLI name.
pub fn by_name(name: &str) -> Option<Box<dyn AllocationStrategy>> {
    match name {
        "dc-ra" | "dcra" => Some(Box::new(DcRa::default())),
        "intuitive" => Some(Box::new(Intuitive)),
        "frsa" => Some(Box::new(Frsa::default())),
        "msema" => Some(Box::new(Msema)),
        _ => None,
    }
}

pub fn strategy_names() -> &'static [&'static str] {
    &["dc-ra", "intuitive", "frsa", "msema"]
}

/// Splits each dual UE's request across its two links proportionally to the
/// bootstrap per-unit capacity of each station.
pub(crate) fn split_dual_requests(
    network: &mut Network,
    channel: &ChannelModel,
    journal: &mut Journal,
) {
    for id in network.ue_ids().collect::<Vec<_>>() {
        if !network.ue(id).connection.is_dual() {
            continue;
        }
        let next_gen = channel
            .estimated_mcs(network, id, StationKind::NextGen)
            .bits_per_unit();
        let legacy = channel
            .estimated_mcs(network, id, StationKind::Legacy)
            .bits_per_unit();
        let total = next_gen + legacy;
        if total == 0.0 {
            continue;
        }
        let rate = network.ue(id).request_rate;
        let next_gen_share = rate * next_gen / total;
        for (station, share) in [
            (StationKind::NextGen, next_gen_share),
            (StationKind::Legacy, rate - next_gen_share),
        ] {
            let link = network
                .ue_mut(id)
                .link_mut(station)
                .expect("dual UE misses a link");
            journal.record(UndoOp::RestoreLinkSplit {
                ue: id,
                station,
                request_split: link.request_split,
            });
            link.request_split = share;
        }
    }
}

/// Free rectangles across every layer of one station, in layer order.
pub(crate) fn spaces_of(network: &mut Network, station: StationKind) -> Vec<Space> {
    let frame = &mut network.station_mut(station).frame;
    let mut spaces = Vec::new();
    for index in 0..frame.layers.len() {
        spaces.extend(frame.layer_mut(index).empty_spaces());
    }
    spaces
}

/// Computes SINR/MCS for freshly written zone blocks and records the
/// per-link rates; trimming is deferred to the final adjustment pass.
pub(crate) fn finalize_written(
    allocator: &mut Allocator<'_>,
    written: &[UeId],
    journal: &mut Journal,
) {
    for &ue in written {
        allocator.channel.sinr_of_ue(allocator.network, ue, journal);
        allocator.finalize_ue(ue, journal);
    }
}

/// Final consistency pass: every allocated UE is re-adjusted against its
/// full request, shedding surplus blocks and evicting UEs the grid cannot
/// actually serve. An adjustment the policy refuses is rolled back, leaving
/// the UE in its previously finalized state.
pub(crate) fn adjust_all(
    allocator: &mut Allocator<'_>,
    policy: AllocationPolicy,
    journal: &mut Journal,
) {
    let allocated: Vec<UeId> = allocator
        .network
        .ues
        .iter()
        .filter(|ue| ue.is_allocated)
        .map(|ue| ue.id)
        .collect();
    for ue in allocated {
        let mut txn = Journal::new();
        if allocator.adjust_mcs(ue, policy, &mut txn) {
            journal.merge_child(txn);
        } else {
            txn.undo(allocator.network);
        }
    }
    allocator.readjust_disturbed(policy, journal);
}

/// Builds the report from the network's final state.
pub(crate) fn report(name: &'static str, allocator: Allocator<'_>) -> StrategyReport {
    let (allocated, unallocated): (Vec<UeId>, Vec<UeId>) = {
        let (yes, no): (Vec<_>, Vec<_>) = allocator
            .network
            .ues
            .iter()
            .partition(|ue| ue.is_allocated);
        (
            yes.into_iter().map(|ue| ue.id).collect(),
            no.into_iter().map(|ue| ue.id).collect(),
        )
    };
    let system_throughput = allocator.network.system_throughput();
    info!(
        "{name}: {} allocated, {} unallocated, {:.0} bits/frame",
        allocated.len(),
        unallocated.len(),
        system_throughput
    );
    StrategyReport {
        strategy: name,
        allocated,
        unallocated,
        system_throughput,
        stats: allocator.stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::testing::*;
    use crate::radio::Numerology;

    #[test]
    fn registry_knows_every_driver() {
        for &name in strategy_names() {
            let strategy = by_name(name).expect("registered driver");
            assert_eq!(strategy.name(), name);
        }
        assert!(by_name("unknown").is_none());
    }

    #[test]
    fn dual_request_split_is_proportional_and_journaled() {
        let mut network = network(1, 0);
        let dual = add_dual_ue(&mut network, 60.0, 10_000.0, vec![Numerology::N1]);
        let single = add_nextgen_ue(&mut network, 60.0, 10_000.0, vec![Numerology::N1]);
        let channel = ChannelModel::new(&network);
        let mut journal = Journal::new();
        split_dual_requests(&mut network, &channel, &mut journal);

        let g = network
            .ue(dual)
            .link(StationKind::NextGen)
            .unwrap()
            .request_split;
        let e = network
            .ue(dual)
            .link(StationKind::Legacy)
            .unwrap()
            .request_split;
        assert!(g > 0.0 && e > 0.0);
        assert!((g + e - 10_000.0).abs() < 1e-9);
        // Non-dual UEs keep the zero sentinel.
        assert_eq!(
            network
                .ue(single)
                .link(StationKind::NextGen)
                .unwrap()
                .request_split,
            0.0
        );

        journal.undo(&mut network);
        assert_eq!(
            network
                .ue(dual)
                .link(StationKind::NextGen)
                .unwrap()
                .request_split,
            0.0
        );
    }

    #[test]
    fn refused_final_adjustment_rolls_back() {
        use crate::grid::LayerRef;
        use crate::radio::BlockKind;
        let mut network = network(2, 0);
        let victim = add_nextgen_ue(&mut network, 200.0, 7_000.0, vec![Numerology::N2]);
        let intruder = add_nextgen_ue(&mut network, 60.0, 7_000.0, vec![Numerology::N1]);
        let channel = ChannelModel::new(&network);

        let spaces = spaces_of(&mut network, StationKind::NextGen);
        let mut setup = Journal::new();
        {
            let mut allocator = Allocator::new(&mut network, &channel);
            assert!(allocator.allocate_ue(
                victim,
                &spaces,
                None,
                AllocationPolicy::default(),
                &mut setup
            ));
            // A mixed-numerology block right over the victim's footprint
            // degrades its channel after the fact.
            allocator
                .place_block(
                    intruder,
                    LayerRef {
                        station: StationKind::NextGen,
                        index: 1,
                    },
                    0,
                    0,
                    BlockKind::NextGen(Numerology::N1),
                    &mut setup,
                )
                .unwrap();
        }
        setup.purge(&mut network);
        let before = network.clone();
        let victim_block = before.ue(victim).link(StationKind::NextGen).unwrap().blocks[0];

        let mut journal = Journal::new();
        {
            let mut allocator = Allocator::new(&mut network, &channel);
            adjust_all(
                &mut allocator,
                AllocationPolicy {
                    allow_lower_mcs: false,
                },
                &mut journal,
            );
        }
        journal.purge(&mut network);

        // The victim's refused adjustment left no trace.
        assert_eq!(network.ue(victim), before.ue(victim));
        assert_eq!(
            network.blocks.get(victim_block).mcs,
            before.blocks.get(victim_block).mcs
        );
        // The intruder's own adjustment went through and finalized it.
        assert!(network.ue(intruder).is_allocated);
        assert!(network.ue(intruder).throughput >= 7_000.0);
    }
}

//! DC-RA: the zone-based dual-connectivity driver.
//!
//! Runs the zone phases at the next-generation station first (it has more
//! layers to exploit), then at the legacy station for whatever is still
//! short of its request, then falls back to single-UE placement over raw
//! free space, and closes with a cross-station adjustment pass.

use super::{
    adjust_all, finalize_written, report, spaces_of, split_dual_requests, AllocationStrategy,
    StrategyReport,
};
use crate::alloc::{AllocationPolicy, Allocator};
use crate::channel::ChannelModel;
use crate::grid::StationKind;
use crate::journal::Journal;
use crate::network::{Network, UeId};
use crate::zone::group::{
    allocate_zone_groups, allocate_zones_single_layer, form_groups, layers_needed, order_groups,
    ZoneGroup,
};
use crate::zone::{
    categorize_zones, form_zones, interference_estimates, merge_zones, select_init_numerology,
    Zone,
};

#[derive(Debug, Default)]
pub struct DcRa {
    pub policy: AllocationPolicy,
}

impl AllocationStrategy for DcRa {
    fn name(&self) -> &'static str {
        "dc-ra"
    }

    fn run(&self, network: &mut Network, channel: &ChannelModel) -> StrategyReport {
        let mut journal = Journal::new();
        let mut allocator = Allocator::new(network, channel);
        split_dual_requests(allocator.network, channel, &mut journal);

        // UEs the zone phases could not serve; retried one at a time below.
        let mut fallback: Vec<UeId> = Vec::new();

        let gues = allocator.network.ues_reaching(StationKind::NextGen);
        if !gues.is_empty() {
            let estimates = interference_estimates(allocator.network);
            select_init_numerology(allocator.network, &gues, &estimates, &mut journal);
            let formation =
                form_zones(allocator.network, channel, &gues, StationKind::NextGen);
            fallback.extend(formation.unservable);
            let zones = merge_zones(formation.fit, formation.undersized, None);
            let (wide, narrow) = categorize_zones(zones);
            fallback.extend(narrow.iter().flat_map(Zone::ue_ids));
            let frame = &allocator.network.gnb.frame;
            let bins = layers_needed(&wide, frame.freq_units, frame.layers.len());
            let mut groups = form_groups(wide, frame.freq_units, bins);
            order_groups(&mut groups);
            let planned: Vec<UeId> = groups.iter().flat_map(ZoneGroup::ue_ids).collect();
            let unplaced = allocate_zone_groups(&mut allocator, groups, &mut journal);
            let written: Vec<UeId> = planned
                .into_iter()
                .filter(|ue| !unplaced.contains(ue))
                .collect();
            finalize_written(&mut allocator, &written, &mut journal);
            fallback.extend(unplaced);
        }

        // Legacy station: legacy-only UEs plus duals still short of their
        // request after the next-generation phase.
        let eues: Vec<UeId> = allocator
            .network
            .ues_reaching(StationKind::Legacy)
            .into_iter()
            .filter(|&ue| {
                allocator.network.ue_throughput(ue) < allocator.network.ue(ue).request_rate
            })
            .collect();
        if !eues.is_empty() {
            let formation = form_zones(allocator.network, channel, &eues, StationKind::Legacy);
            fallback.extend(formation.unservable);
            let zones = merge_zones(formation.fit, formation.undersized, None);
            let planned: Vec<UeId> = zones.iter().flat_map(Zone::ue_ids).collect();
            let overflow = allocate_zones_single_layer(&mut allocator, zones, &mut journal);
            let spilled: Vec<UeId> = overflow
                .single
                .iter()
                .chain(overflow.dual.iter())
                .copied()
                .collect();
            let written: Vec<UeId> = planned
                .into_iter()
                .filter(|ue| !spilled.contains(ue))
                .collect();
            finalize_written(&mut allocator, &written, &mut journal);
            fallback.extend(spilled);
        }

        fallback.sort();
        fallback.dedup();
        for ue in fallback {
            for &station in allocator.network.ue(ue).connection.stations() {
                if allocator.network.ue_throughput(ue)
                    >= allocator.network.ue(ue).request_rate
                {
                    break;
                }
                let spaces = spaces_of(allocator.network, station);
                allocator.allocate_ue(ue, &spaces, None, self.policy, &mut journal);
            }
        }

        adjust_all(&mut allocator, self.policy, &mut journal);
        let summary = report(self.name(), allocator);
        journal.purge(network);
        summary
    }
}

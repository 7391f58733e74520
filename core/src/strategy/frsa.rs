//! FRSA driver: next-generation-only zone pipeline with a row limit on
//! zone merging and an inter-layer rebalancing step.
//!
//! Rebalancing is a local search on the packing plan, before any grid
//! write: zones are swapped between the most- and least-loaded layers while
//! the swap strictly narrows the load spread. No global optimum is claimed.

use log::debug;

use super::{
    adjust_all, finalize_written, report, spaces_of, AllocationStrategy, StrategyReport,
};
use crate::alloc::{AllocationPolicy, Allocator};
use crate::channel::ChannelModel;
use crate::grid::StationKind;
use crate::journal::Journal;
use crate::network::{Network, UeId};
use crate::zone::group::{
    allocate_zone_groups, form_groups, layers_needed, order_groups, ZoneGroup,
};
use crate::zone::{
    categorize_zones, form_zones, interference_estimates, merge_zones, select_init_numerology,
    Zone,
};

#[derive(Debug)]
pub struct Frsa {
    /// Cap on a merged zone's row count; keeps zones squat enough for the
    /// layer balancing to have material swap candidates.
    pub row_limit: Option<usize>,
    pub policy: AllocationPolicy,
}

impl Default for Frsa {
    fn default() -> Self {
        Self {
            row_limit: Some(2),
            policy: AllocationPolicy::default(),
        }
    }
}

impl AllocationStrategy for Frsa {
    fn name(&self) -> &'static str {
        "frsa"
    }

    fn run(&self, network: &mut Network, channel: &ChannelModel) -> StrategyReport {
        let mut journal = Journal::new();
        let mut allocator = Allocator::new(network, channel);

        // Next-generation only: duals target their full request here and
        // legacy-only UEs stay unallocated.
        let gues = allocator.network.ues_reaching(StationKind::NextGen);
        let mut fallback: Vec<UeId> = Vec::new();
        if !gues.is_empty() {
            let estimates = interference_estimates(allocator.network);
            select_init_numerology(allocator.network, &gues, &estimates, &mut journal);
            let formation =
                form_zones(allocator.network, channel, &gues, StationKind::NextGen);
            fallback.extend(formation.unservable);
            let zones = merge_zones(formation.fit, formation.undersized, self.row_limit);
            let (wide, narrow) = categorize_zones(zones);
            fallback.extend(narrow.iter().flat_map(Zone::ue_ids));
            let frame = &allocator.network.gnb.frame;
            let bins = layers_needed(&wide, frame.freq_units, frame.layers.len());
            let mut groups = form_groups(wide, frame.freq_units, bins);
            let swaps = rebalance_layers(&mut groups);
            debug!("frsa layer rebalancing performed {swaps} swaps");
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

        fallback.sort();
        fallback.dedup();
        for ue in fallback {
            if allocator.network.ue_throughput(ue) >= allocator.network.ue(ue).request_rate {
                continue;
            }
            let spaces = spaces_of(allocator.network, StationKind::NextGen);
            allocator.allocate_ue(ue, &spaces, None, self.policy, &mut journal);
        }

        adjust_all(&mut allocator, self.policy, &mut journal);
        let summary = report(self.name(), allocator);
        journal.purge(network);
        summary
    }
}

/// Per-layer planned load: sum of each group's bin at that layer index.
fn layer_loads(groups: &[ZoneGroup]) -> Vec<usize> {
    let layers = groups
        .iter()
        .map(|group| group.bins.len())
        .max()
        .unwrap_or(0);
    let mut loads = vec![0usize; layers];
    for group in groups {
        for (index, bin) in group.bins.iter().enumerate() {
            loads[index] += bin.used;
        }
    }
    loads
}

/// Swaps zone pairs between the most- and least-loaded layers while the
/// swap strictly narrows their load difference. Swapping within one group
/// keeps the kinds compatible by construction. Returns the swap count.
pub fn rebalance_layers(groups: &mut [ZoneGroup]) -> usize {
    let mut swaps = 0;
    // Each accepted swap strictly shrinks an integer difference, so the
    // loop terminates; the bound guards the plan against a pathology.
    for _ in 0..64 {
        let loads = layer_loads(groups);
        if loads.len() < 2 {
            break;
        }
        let heavy = (0..loads.len()).max_by_key(|&i| loads[i]).unwrap();
        let light = (0..loads.len()).min_by_key(|&i| loads[i]).unwrap();
        let diff = loads[heavy] - loads[light];
        if heavy == light || diff == 0 {
            break;
        }
        if !swap_once(groups, heavy, light, diff) {
            break;
        }
        swaps += 1;
    }
    swaps
}

/// One improving swap between layers `heavy` and `light`, if any exists.
fn swap_once(groups: &mut [ZoneGroup], heavy: usize, light: usize, diff: usize) -> bool {
    for group in groups.iter_mut() {
        if group.bins.len() <= heavy.max(light) {
            continue;
        }
        let mut pick = None;
        'outer: for (i, a) in group.bins[heavy].zones.iter().enumerate() {
            for (j, b) in group.bins[light].zones.iter().enumerate() {
                let (wa, wb) = (a.freq_width(), b.freq_width());
                // Moving delta toward the light layer improves the spread
                // only while delta stays below the current difference.
                if wa > wb
                    && wa - wb < diff
                    && group.bins[light].used - wb + wa <= group.bins[light].capacity
                {
                    pick = Some((i, j, wa, wb));
                    break 'outer;
                }
            }
        }
        let Some((i, j, wa, wb)) = pick else {
            continue;
        };
        let (first, second) = group.bins.split_at_mut(heavy.max(light));
        let (bin_heavy, bin_light) = if heavy < light {
            (&mut first[heavy], &mut second[0])
        } else {
            (&mut second[0], &mut first[light])
        };
        std::mem::swap(&mut bin_heavy.zones[i], &mut bin_light.zones[j]);
        bin_heavy.used = bin_heavy.used - wa + wb;
        bin_light.used = bin_light.used - wb + wa;
        return true;
    }
    false
}

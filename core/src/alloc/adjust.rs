//! MCS adjustment: trim the lowest-quality blocks until the request is met
//! with the fewest blocks, or the UE provably cannot be served.

use log::debug;

use super::{AllocationPolicy, Allocator};
use crate::grid::{BlockId, StationKind};
use crate::journal::Journal;
use crate::network::UeId;

impl Allocator<'_> {
    /// Re-evaluates a UE whose channel conditions changed.
    ///
    /// Iteratively drops the single worst block (for dual-connection UEs the
    /// per-station candidates are compared by efficiency, MCS value per raw
    /// base unit, since legacy and next-gen blocks differ in raw size) while
    /// the remaining blocks still cover the request. Returns `false` only
    /// when the policy forbids lowering this UE's already-assigned MCS and
    /// the adjustment would do so; the caller must then undo the triggering
    /// change. A UE whose throughput collapsed to zero is evicted entirely,
    /// which still counts as success: the system reached a consistent state.
    pub fn adjust_mcs(
        &mut self,
        ue: UeId,
        policy: AllocationPolicy,
        journal: &mut Journal,
    ) -> bool {
        let mut txn = Journal::new();
        self.channel.sinr_of_ue(self.network, ue, &mut txn);
        let request = self.network.ue(ue).request_rate;

        loop {
            let Some(worst) = self.worst_block(ue) else {
                // No blocks left at all.
                self.evict_ue(ue, &mut txn);
                journal.merge_child(txn);
                return true;
            };
            let current = self.network.ue_throughput(ue);
            let without = self.throughput_without(ue, worst);

            if without >= request {
                // Over-provisioned (an MCS upgrade elsewhere, or a stale
                // low-quality block); shed it and re-check.
                self.remove_block(worst, &mut txn);
                continue;
            }
            if current >= request {
                self.finalize_ue(ue, &mut txn);
                journal.merge_child(txn);
                return true;
            }
            if !policy.allow_lower_mcs && self.mcs_degraded(ue) {
                debug!("UE {} adjustment blocked by the no-lower-MCS policy", ue.0);
                journal.merge_child(txn);
                return false;
            }
            if current == 0.0 {
                self.evict_ue(ue, &mut txn);
                journal.merge_child(txn);
                return true;
            }
            // Partial progress: dropping the bottleneck raises the uniform
            // per-block rate of its link.
            self.remove_block(worst, &mut txn);
        }
    }

    /// The single worst block across the UE's stations.
    fn worst_block(&self, ue: UeId) -> Option<BlockId> {
        let mut worst: Option<(f64, f64, BlockId)> = None;
        for &station in self.network.ue(ue).connection.stations() {
            let Some(link) = self.network.ue(ue).link(station) else {
                continue;
            };
            for &id in &link.blocks {
                let block = self.network.blocks.get(id);
                let key = (block.mcs.bits_per_unit(), block.sinr_db);
                match worst {
                    Some((eff, sinr, _)) if (key.0, key.1) >= (eff, sinr) => {}
                    _ => worst = Some((key.0, key.1, id)),
                }
            }
        }
        worst.map(|(_, _, id)| id)
    }

    /// Uniform-rate throughput of the UE if `dropped` were removed.
    fn throughput_without(&self, ue: UeId, dropped: BlockId) -> f64 {
        let mut total = 0.0;
        for &station in self.network.ue(ue).connection.stations() {
            let Some(link) = self.network.ue(ue).link(station) else {
                continue;
            };
            let remaining: Vec<BlockId> = link
                .blocks
                .iter()
                .copied()
                .filter(|&id| id != dropped)
                .collect();
            if remaining.is_empty() {
                continue;
            }
            let worst = remaining
                .iter()
                .map(|&id| self.network.blocks.get(id).mcs)
                .min()
                .expect("non-empty remainder");
            let kind = self.network.blocks.get(remaining[0]).kind;
            total += worst.bits_per_block(kind) * remaining.len() as f64;
        }
        total
    }

    /// Did recomputation leave any link below its previously assigned MCS?
    fn mcs_degraded(&self, ue: UeId) -> bool {
        for &station in self.network.ue(ue).connection.stations() {
            let Some(link) = self.network.ue(ue).link(station) else {
                continue;
            };
            if link.blocks.is_empty() || !link.mcs.is_usable() {
                continue;
            }
            let worst = link
                .blocks
                .iter()
                .map(|&id| self.network.blocks.get(id).mcs)
                .min()
                .expect("non-empty block list");
            if worst < link.mcs {
                return true;
            }
        }
        false
    }

    /// Cross-station consistency pass: re-adjusts every allocated UE whose
    /// interference environment a placement disturbed. A refused adjustment
    /// is undone on the spot, so the UE keeps its previously finalized
    /// state; returns whether every adjustment went through.
    pub fn readjust_disturbed(&mut self, policy: AllocationPolicy, journal: &mut Journal) -> bool {
        let flagged: Vec<UeId> = self
            .network
            .ues
            .iter()
            .filter(|ue| ue.needs_recalc && ue.is_allocated)
            .map(|ue| ue.id)
            .collect();
        let mut all_adjusted = true;
        for ue in flagged {
            let mut txn = Journal::new();
            if self.adjust_mcs(ue, policy, &mut txn) {
                journal.merge_child(txn);
            } else {
                txn.undo(self.network);
                all_adjusted = false;
            }
        }
        all_adjusted
    }
}

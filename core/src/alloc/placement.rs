//! Single-UE placement over a list of candidate free spaces.

use log::debug;

use super::{AllocationPolicy, Allocator};
use crate::grid::space::Space;
use crate::grid::StationKind;
use crate::journal::Journal;
use crate::network::UeId;
use crate::radio::BlockKind;

impl Allocator<'_> {
    /// Places resource blocks for `ue` into the candidate `spaces` (all
    /// belonging to one station, in the given order) until the target rate
    /// is met or space runs out.
    ///
    /// `target` overrides the default per-link target (the UE's request
    /// split, falling back to the full request); dual-connection drivers use
    /// it for proportional splitting. On failure every block placed during
    /// this attempt is undone and nothing is recorded in `journal`.
    pub fn allocate_ue(
        &mut self,
        ue: UeId,
        spaces: &[Space],
        target: Option<f64>,
        policy: AllocationPolicy,
        journal: &mut Journal,
    ) -> bool {
        let Some(first) = spaces.first() else {
            return false;
        };
        let station = first.layer.station;
        assert!(
            spaces.iter().all(|space| space.layer.station == station),
            "candidate spaces span two stations"
        );
        let link = self
            .network
            .ue(ue)
            .link(station)
            .expect("allocating at a station the UE cannot reach");
        let target_rate = target.unwrap_or(if link.request_split > 0.0 {
            link.request_split
        } else {
            self.network.ue(ue).request_rate
        });
        let kind = match station {
            StationKind::Legacy => BlockKind::Legacy,
            StationKind::NextGen => BlockKind::NextGen(self.network.ue(ue).numerology),
        };
        let shape = kind.shape();

        let mut txn = Journal::new();
        let mut placed = 0usize;
        'spaces: for space in spaces {
            let mut position = space.first_block_position(shape);
            while let Some((freq, time)) = position {
                if self.target_met(ue, station, target_rate) {
                    break 'spaces;
                }
                let mut attempt = Journal::new();
                if let Some((id, affected)) =
                    self.place_block(ue, space.layer, freq, time, kind, &mut attempt)
                {
                    self.channel.sinr_of_block(self.network, id, &mut attempt);
                    let mcs = self.network.blocks.get(id).mcs;
                    let mut accept = mcs.is_usable();
                    if accept && !policy.allow_lower_mcs {
                        accept = !self.would_degrade_others(ue, &affected, &mut attempt);
                    }
                    if accept {
                        txn.merge_child(attempt);
                        placed += 1;
                        self.stats.blocks_placed += 1;
                    } else {
                        // Never leave an unusable or policy-violating block
                        // behind; the position is rejected, not the UE.
                        attempt.undo(self.network);
                        self.stats.positions_rejected += 1;
                    }
                }
                position = space.next_block_position(freq, time, shape);
            }
        }

        if self.target_met(ue, station, target_rate) {
            self.finalize_ue(ue, &mut txn);
            journal.merge_child(txn);
            debug!(
                "UE {} fulfilled at {:?} with {} new blocks",
                ue.0, station, placed
            );
            true
        } else {
            txn.undo(self.network);
            self.stats.rollbacks += 1;
            debug!("UE {} rolled back at {:?} ({} blocks tried)", ue.0, station, placed);
            false
        }
    }

    /// The attempt is fulfilled when the per-station rate reaches the
    /// explicit target, or the UE's accumulated throughput across both
    /// links covers the full request.
    fn target_met(&self, ue: UeId, station: StationKind, target_rate: f64) -> bool {
        let link_rate = self.network.link_throughput(ue, station);
        link_rate >= target_rate || self.network.ue_throughput(ue) >= self.network.ue(ue).request_rate
    }

    /// Would keeping the latest placement push any disturbed allocated UE
    /// below its currently assigned MCS?
    fn would_degrade_others(
        &mut self,
        placing: UeId,
        affected: &[UeId],
        journal: &mut Journal,
    ) -> bool {
        for &other in affected {
            if other == placing || !self.network.ue(other).is_allocated {
                continue;
            }
            self.channel.sinr_of_ue(self.network, other, journal);
            for &station in self.network.ue(other).connection.stations() {
                let Some(link) = self.network.ue(other).link(station) else {
                    continue;
                };
                if link.blocks.is_empty() {
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
        }
        false
    }
}

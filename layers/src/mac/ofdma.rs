//! OFDMA Resource Allocator
//!
//! Two-phase pass: first the slot's symbols are partitioned across beams
//! proportionally to aggregate buffer demand (leftover symbols go one at a
//! time to the beam currently holding the fewest), then each beam's symbol
//! budget is subdivided in frequency, one RBG at a time, to the
//! highest-priority unsatisfied UE of that beam.

use crate::mac::amc::Amc;
use crate::mac::ue_info::{ActiveUeMap, BeamSymbolMap, SchedPolicy, UeArena};
use crate::mac::{
    achievable_tbs, potential_tput_bps, BwpConfig, SlotAllocation, MIN_BUFFER_REQ_BYTES,
};
use common::types::{BeamId, Direction, Rnti};
use common::utils::SYMBOLS_PER_SLOT;
use interfaces::DciInfoElement;
use std::collections::BTreeMap;
use tracing::trace;

/// Minimum useful transport block; the OFDMA floor is looser than TDMA's
/// because resource granularity differs
const MIN_TB_BYTES: u32 = 5;

/// Stateless OFDMA allocation pass
pub struct OfdmaAllocator;

impl OfdmaAllocator {
    /// Run one OFDMA allocation pass for one direction
    pub fn allocate(
        cfg: &BwpConfig,
        arena: &mut UeArena,
        active: &ActiveUeMap,
        policy: &SchedPolicy,
        amc: &Amc,
        direction: Direction,
        available_symbols: u32,
    ) -> SlotAllocation {
        if active.is_empty() {
            return SlotAllocation::default();
        }

        for beam_ues in active.values() {
            for (rnti, _) in beam_ues {
                let ue = arena.get_mut(rnti).expect("active UE missing from arena");
                policy.before_sched(ue, direction);
                let potential = potential_tput_bps(amc, cfg, ue, direction);
                match direction {
                    Direction::Dl => ue.dl_potential_tput_bps = potential,
                    Direction::Ul => ue.ul_potential_tput_bps = potential,
                }
            }
        }

        let beam_sym = Self::partition_symbols_per_beam(active, available_symbols);
        let total_symbols: u32 = beam_sym.values().sum();
        assert!(
            total_symbols <= available_symbols,
            "OFDMA {:?}: partitioned {} symbols but only {} were available",
            direction,
            total_symbols,
            available_symbols
        );

        // Phase 2: subdivide each beam's budget in frequency
        let mut rbg_masks: BTreeMap<Rnti, Vec<bool>> = BTreeMap::new();
        for (beam, beam_ues) in active {
            let symbols = beam_sym[beam];
            if symbols == 0 {
                continue;
            }
            Self::assign_rbg_within_beam(
                cfg,
                arena,
                beam_ues,
                policy,
                amc,
                direction,
                symbols,
                &mut rbg_masks,
            );
        }

        let dci = Self::build_dci(cfg, arena, active, &beam_sym, amc, direction, &rbg_masks);
        SlotAllocation { dci, beam_sym }
    }

    /// Phase 1: split symbols across beams proportionally to demand
    ///
    /// Rounding leftovers are redistributed one at a time to the first beam
    /// (in beam-id order) holding the strictly smallest symbol count, so no
    /// symbol is wasted and the tie-break is deterministic.
    fn partition_symbols_per_beam(active: &ActiveUeMap, available_symbols: u32) -> BeamSymbolMap {
        let mut demand: BTreeMap<BeamId, u64> = BTreeMap::new();
        for (beam, beam_ues) in active {
            let total: u64 = beam_ues.iter().map(|(_, req)| *req as u64).sum();
            demand.insert(*beam, total);
        }
        let total_demand: u64 = demand.values().sum();

        let mut beam_sym = BeamSymbolMap::new();
        if total_demand == 0 {
            return beam_sym;
        }
        for (beam, beam_demand) in &demand {
            let share = (*beam_demand as u128 * available_symbols as u128 / total_demand as u128)
                as u32;
            beam_sym.insert(*beam, share);
        }

        let mut leftover = available_symbols - beam_sym.values().sum::<u32>();
        while leftover > 0 {
            let min_beam = *beam_sym
                .iter()
                .min_by_key(|(_, sym)| **sym)
                .map(|(beam, _)| beam)
                .expect("at least one beam is active");
            *beam_sym.get_mut(&min_beam).expect("beam present") += 1;
            leftover -= 1;
        }
        trace!("OFDMA beam partition: {:?}", beam_sym);
        beam_sym
    }

    /// Phase 2 for one beam: hand out frequency RBGs, each spanning the
    /// beam's symbols, to the top-ranked unsatisfied UE per iteration
    #[allow(clippy::too_many_arguments)]
    fn assign_rbg_within_beam(
        cfg: &BwpConfig,
        arena: &mut UeArena,
        beam_ues: &[(Rnti, u32)],
        policy: &SchedPolicy,
        amc: &Amc,
        direction: Direction,
        symbols: u32,
        rbg_masks: &mut BTreeMap<Rnti, Vec<bool>>,
    ) {
        let mut candidates: Vec<(Rnti, u32)> = beam_ues.to_vec();
        // Assignable frequency RBG indices, handed out in order
        let free_rbg: Vec<usize> = cfg
            .notched_rbg
            .iter()
            .enumerate()
            .filter(|(_, &notched)| !notched)
            .map(|(idx, _)| idx)
            .collect();
        let mut next_free = free_rbg.iter();

        let mut resources = cfg.assignable_rbg();
        while resources > 0 && !candidates.is_empty() {
            candidates.sort_by(|a, b| policy.compare(&arena[&a.0], &arena[&b.0], direction));

            // Same fairness guard as TDMA
            let winner = candidates
                .iter()
                .find(|(rnti, req)| {
                    achievable_tbs(amc, cfg, &arena[rnti], direction)
                        < (*req).max(MIN_BUFFER_REQ_BYTES)
                })
                .map(|(rnti, _)| *rnti);

            let Some(winner) = winner else {
                break;
            };

            let rbg_idx = *next_free.next().expect("free RBG left while resources > 0");
            for (rnti, _) in &candidates {
                let ue = arena.get_mut(rnti).expect("active UE missing from arena");
                if *rnti == winner {
                    match direction {
                        Direction::Dl => {
                            ue.dl_rbg += symbols;
                            ue.dl_sym = symbols;
                        }
                        Direction::Ul => {
                            ue.ul_rbg += symbols;
                            ue.ul_sym = symbols;
                        }
                    }
                    rbg_masks
                        .entry(*rnti)
                        .or_insert_with(|| vec![false; cfg.bandwidth_rbg as usize])[rbg_idx] =
                        true;
                    policy.assigned(ue, direction);
                } else {
                    policy.not_assigned(ue, direction);
                }
            }
            resources -= 1;
        }
    }

    /// Build DCIs: all UEs of a beam share the beam's symbol range; the
    /// transport block follows directly from the assigned RBG count
    #[allow(clippy::too_many_arguments)]
    fn build_dci(
        cfg: &BwpConfig,
        arena: &mut UeArena,
        active: &ActiveUeMap,
        beam_sym: &BeamSymbolMap,
        amc: &Amc,
        direction: Direction,
        rbg_masks: &BTreeMap<Rnti, Vec<bool>>,
    ) -> Vec<DciInfoElement> {
        let mut dci = Vec::new();
        let mut dl_cursor = cfg.dl_ctrl_symbols;
        let mut ul_cursor = SYMBOLS_PER_SLOT - cfg.ul_ctrl_symbols;

        for (beam, beam_ues) in active {
            let symbols = beam_sym.get(beam).copied().unwrap_or(0) as u8;
            if symbols == 0 {
                continue;
            }
            let start_symbol = match direction {
                Direction::Dl => {
                    let start = dl_cursor;
                    dl_cursor += symbols;
                    start
                }
                Direction::Ul => {
                    ul_cursor -= symbols;
                    ul_cursor
                }
            };

            for (rnti, _) in beam_ues {
                let tbs = achievable_tbs(amc, cfg, &arena[rnti], direction);
                let ue = arena.get_mut(rnti).expect("active UE missing from arena");
                if ue.rbg(direction) == 0 {
                    continue;
                }
                if tbs < MIN_TB_BYTES {
                    trace!(
                        "RNTI {}: {:?} TBS {} below minimum {}, no DCI",
                        rnti.0,
                        direction,
                        tbs,
                        MIN_TB_BYTES
                    );
                    continue;
                }
                match direction {
                    Direction::Dl => ue.dl_tbs = tbs,
                    Direction::Ul => ue.ul_tbs = tbs,
                }
                dci.push(DciInfoElement {
                    rnti: *rnti,
                    direction,
                    start_symbol,
                    num_symbols: symbols,
                    mcs: ue.mcs(direction),
                    rank: ue.rank(direction),
                    precoding: match direction {
                        Direction::Dl => ue.dl_precoding,
                        Direction::Ul => ue.ul_precoding,
                    },
                    tbs_bytes: tbs,
                    harq_id: ue.next_harq(direction),
                    ndi: true,
                    rv: 0,
                    rbg_bitmask: rbg_masks
                        .get(rnti)
                        .cloned()
                        .unwrap_or_else(|| vec![false; cfg.bandwidth_rbg as usize]),
                });
            }
        }
        dci
    }
}

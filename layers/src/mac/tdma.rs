//! TDMA Resource Allocator
//!
//! Assigns whole-bandwidth symbol slices: each iteration hands one full
//! symbol (all assignable RBGs) to the highest-priority unsatisfied UE,
//! until symbols run out or every candidate's achievable transport block
//! covers its buffer. Beam grouping is flattened since TDMA never
//! subdivides frequency per beam.

use crate::mac::amc::Amc;
use crate::mac::ue_info::{ActiveUeMap, BeamSymbolMap, SchedPolicy, UeArena};
use crate::mac::{
    achievable_tbs, potential_tput_bps, BwpConfig, SlotAllocation, MIN_BUFFER_REQ_BYTES,
};
use common::types::{Direction, Rnti};
use common::utils::SYMBOLS_PER_SLOT;
use interfaces::DciInfoElement;
use tracing::trace;

/// Minimum useful DL transport block; smaller blocks cannot carry the
/// MAC+RLC headers plus payload
const DL_MIN_TB_BYTES: u32 = 10;

/// Minimum useful UL transport block
const UL_MIN_TB_BYTES: u32 = 12;

/// Stateless TDMA allocation pass
pub struct TdmaAllocator;

impl TdmaAllocator {
    /// Run one TDMA allocation pass for one direction
    pub fn allocate(
        cfg: &BwpConfig,
        arena: &mut UeArena,
        active: &ActiveUeMap,
        policy: &SchedPolicy,
        amc: &Amc,
        direction: Direction,
        available_symbols: u32,
    ) -> SlotAllocation {
        let assignable = cfg.assignable_rbg();

        // Init: flatten the beam grouping into one candidate list and seed
        // the per-TTI bookkeeping
        let mut candidates: Vec<(Rnti, u32)> =
            active.values().flat_map(|v| v.iter().copied()).collect();
        for (rnti, _) in &candidates {
            let ue = arena.get_mut(rnti).expect("active UE missing from arena");
            policy.before_sched(ue, direction);
            let potential = potential_tput_bps(amc, cfg, ue, direction);
            match direction {
                Direction::Dl => ue.dl_potential_tput_bps = potential,
                Direction::Ul => ue.ul_potential_tput_bps = potential,
            }
        }

        // Iterate: one symbol per iteration to the top unsatisfied UE
        let mut resources = available_symbols;
        while resources > 0 && !candidates.is_empty() {
            candidates.sort_by(|a, b| policy.compare(&arena[&a.0], &arena[&b.0], direction));

            // Fairness guard: a UE whose achievable block already covers its
            // demand must not keep winning while others starve
            let winner = candidates
                .iter()
                .find(|(rnti, req)| {
                    achievable_tbs(amc, cfg, &arena[rnti], direction)
                        < (*req).max(MIN_BUFFER_REQ_BYTES)
                })
                .map(|(rnti, _)| *rnti);

            let Some(winner) = winner else {
                trace!("TDMA {:?}: all demand satisfied, {} symbols left", direction, resources);
                break;
            };

            for (rnti, _) in &candidates {
                let ue = arena.get_mut(rnti).expect("active UE missing from arena");
                if *rnti == winner {
                    match direction {
                        Direction::Dl => {
                            ue.dl_rbg += assignable;
                            ue.dl_sym += 1;
                        }
                        Direction::Ul => {
                            ue.ul_rbg += assignable;
                            ue.ul_sym += 1;
                        }
                    }
                    policy.assigned(ue, direction);
                } else {
                    policy.not_assigned(ue, direction);
                }
            }
            resources -= 1;
        }

        // Finalize: report symbols consumed per beam
        let mut beam_sym = BeamSymbolMap::new();
        for (beam, beam_ues) in active {
            let symbols: u32 = beam_ues
                .iter()
                .map(|(rnti, _)| arena[rnti].rbg(direction))
                .sum::<u32>()
                / assignable;
            beam_sym.insert(*beam, symbols);
        }
        let total_symbols: u32 = beam_sym.values().sum();
        assert!(
            total_symbols <= available_symbols,
            "TDMA {:?}: assigned {} symbols but only {} were available",
            direction,
            total_symbols,
            available_symbols
        );

        let dci = Self::build_dci(cfg, arena, active, amc, direction);
        SlotAllocation { dci, beam_sym }
    }

    /// Build one DCI per UE that ends the pass with a usable transport block
    ///
    /// DL allocations advance a symbol cursor forward from the control
    /// region; UL grants are packed backward from the end of the slot so UL
    /// HARQ timing constraints hold. A UE whose transport block falls below
    /// the minimum useful payload gets no DCI this TTI; that is a valid
    /// "nothing to send" outcome, not an error.
    fn build_dci(
        cfg: &BwpConfig,
        arena: &mut UeArena,
        active: &ActiveUeMap,
        amc: &Amc,
        direction: Direction,
    ) -> Vec<DciInfoElement> {
        let assignable = cfg.assignable_rbg();
        let min_tb = match direction {
            Direction::Dl => DL_MIN_TB_BYTES,
            Direction::Ul => UL_MIN_TB_BYTES,
        };

        let mut dci = Vec::new();
        let mut dl_cursor = cfg.dl_ctrl_symbols;
        let mut ul_cursor = SYMBOLS_PER_SLOT - cfg.ul_ctrl_symbols;

        for beam_ues in active.values() {
            for (rnti, _) in beam_ues {
                let tbs = achievable_tbs(amc, cfg, &arena[rnti], direction);
                let ue = arena.get_mut(rnti).expect("active UE missing from arena");
                let rbg = ue.rbg(direction);
                if rbg == 0 {
                    continue;
                }
                if tbs < min_tb {
                    trace!(
                        "RNTI {}: {:?} TBS {} below minimum {}, no DCI",
                        rnti.0,
                        direction,
                        tbs,
                        min_tb
                    );
                    continue;
                }

                let num_symbols = (rbg / assignable) as u8;
                let start_symbol = match direction {
                    Direction::Dl => {
                        let start = dl_cursor;
                        dl_cursor += num_symbols;
                        start
                    }
                    Direction::Ul => {
                        ul_cursor -= num_symbols;
                        ul_cursor
                    }
                };

                match direction {
                    Direction::Dl => ue.dl_tbs = tbs,
                    Direction::Ul => ue.ul_tbs = tbs,
                }

                dci.push(DciInfoElement {
                    rnti: *rnti,
                    direction,
                    start_symbol,
                    num_symbols,
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
                    rbg_bitmask: cfg.assignable_mask(),
                });
            }
        }
        dci
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::test_support::{add_ue, test_cfg};
    use crate::mac::ue_info::SchedPolicyKind;
    use crate::mac::{Amc, AmcModel, McsTable};
    use common::types::LcgId;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn amc() -> Amc {
        Amc::new(McsTable::Qam64, AmcModel::Shannon)
    }

    fn active_map(arena: &UeArena, direction: Direction) -> ActiveUeMap {
        let mut active = ActiveUeMap::new();
        for ue in arena.values() {
            let buffer = ue.buffer_total(direction);
            if buffer > 0 {
                active.entry(ue.beam_id).or_default().push((ue.rnti, buffer));
            }
        }
        active
    }

    #[test]
    fn test_round_robin_equal_split() {
        let cfg = test_cfg(20, 14);
        let mut arena = UeArena::new();
        add_ue(&mut arena, 1, 0, 28, 10_000);
        add_ue(&mut arena, 2, 0, 28, 10_000);
        let active = active_map(&arena, Direction::Dl);
        let policy = SchedPolicy::new(SchedPolicyKind::RoundRobin);

        let alloc = TdmaAllocator::allocate(
            &cfg, &mut arena, &active, &policy, &amc(), Direction::Dl, 14,
        );

        assert_eq!(arena[&Rnti::new(1)].dl_sym, 7);
        assert_eq!(arena[&Rnti::new(2)].dl_sym, 7);
        assert_eq!(arena[&Rnti::new(1)].dl_rbg, 140);
        assert_eq!(alloc.beam_sym[&common::types::BeamId::new(0)], 14);
        assert_eq!(alloc.dci.len(), 2);
    }

    #[test]
    fn test_fairness_guard_terminates_early() {
        // 50 bytes of demand are covered by a single symbol at MCS 28; the
        // remaining 13 symbols must stay unassigned.
        let cfg = test_cfg(20, 14);
        let mut arena = UeArena::new();
        add_ue(&mut arena, 1, 0, 28, 50);
        let active = active_map(&arena, Direction::Dl);
        let policy = SchedPolicy::new(SchedPolicyKind::RoundRobin);

        let alloc = TdmaAllocator::allocate(
            &cfg, &mut arena, &active, &policy, &amc(), Direction::Dl, 14,
        );

        assert_eq!(arena[&Rnti::new(1)].dl_sym, 1);
        assert_eq!(alloc.beam_sym[&common::types::BeamId::new(0)], 1);
    }

    #[test]
    fn test_comparator_substitutability() {
        // Identical buffer/channel state: every policy hands out the same
        // aggregate resource, only the per-UE order may differ.
        let mut totals = Vec::new();
        for kind in [
            SchedPolicyKind::RoundRobin,
            SchedPolicyKind::ProportionalFair,
            SchedPolicyKind::Qos,
            SchedPolicyKind::AiWeighted,
        ] {
            let cfg = test_cfg(20, 14);
            let mut arena = UeArena::new();
            for rnti in 1..=4 {
                add_ue(&mut arena, rnti, 0, 28, 100_000);
            }
            let active = active_map(&arena, Direction::Dl);
            let policy = SchedPolicy::new(kind);
            TdmaAllocator::allocate(
                &cfg, &mut arena, &active, &policy, &amc(), Direction::Dl, 14,
            );
            let total: u32 = arena.values().map(|u| u.dl_rbg).sum();
            totals.push(total);
        }
        assert!(totals.iter().all(|&t| t == 14 * 20), "{:?}", totals);
    }

    #[test]
    fn test_dl_dci_suppression_boundary() {
        // One symbol of 36 RB at MCS 0 yields a 9-byte block: suppressed.
        let cfg = test_cfg(36, 1);
        let mut arena = UeArena::new();
        add_ue(&mut arena, 1, 0, 0, 100_000);
        let active = active_map(&arena, Direction::Dl);
        let policy = SchedPolicy::new(SchedPolicyKind::RoundRobin);
        let alloc = TdmaAllocator::allocate(
            &cfg, &mut arena, &active, &policy, &amc(), Direction::Dl, 1,
        );
        assert_eq!(arena[&Rnti::new(1)].dl_sym, 1);
        assert!(alloc.dci.is_empty());

        // 37 RB reach the 10-byte minimum: one DCI.
        let cfg = test_cfg(37, 1);
        let mut arena = UeArena::new();
        add_ue(&mut arena, 1, 0, 0, 100_000);
        let active = active_map(&arena, Direction::Dl);
        let alloc = TdmaAllocator::allocate(
            &cfg, &mut arena, &active, &policy, &amc(), Direction::Dl, 1,
        );
        assert_eq!(alloc.dci.len(), 1);
        assert_eq!(alloc.dci[0].tbs_bytes, 10);
    }

    #[test]
    fn test_ul_dci_suppression_boundary() {
        let policy = SchedPolicy::new(SchedPolicyKind::RoundRobin);
        for (rbg, expect_dci) in [(42, false), (43, true)] {
            let cfg = test_cfg(rbg, 1);
            let mut arena = UeArena::new();
            let rnti = add_ue(&mut arena, 1, 0, 0, 0);
            arena
                .get_mut(&rnti)
                .unwrap()
                .ul_buffers
                .insert(LcgId(0), 100_000);
            let active = active_map(&arena, Direction::Ul);
            let alloc = TdmaAllocator::allocate(
                &cfg, &mut arena, &active, &policy, &amc(), Direction::Ul, 1,
            );
            assert_eq!(alloc.dci.len(), usize::from(expect_dci), "rbg={}", rbg);
            if expect_dci {
                assert_eq!(alloc.dci[0].tbs_bytes, 12);
            }
        }
    }

    #[test]
    fn test_ul_grants_packed_backward() {
        let cfg = test_cfg(20, 14);
        let mut arena = UeArena::new();
        for rnti in [1, 2] {
            let r = add_ue(&mut arena, rnti, 0, 28, 0);
            arena.get_mut(&r).unwrap().ul_buffers.insert(LcgId(0), 50_000);
        }
        let active = active_map(&arena, Direction::Ul);
        let policy = SchedPolicy::new(SchedPolicyKind::RoundRobin);
        let alloc = TdmaAllocator::allocate(
            &cfg, &mut arena, &active, &policy, &amc(), Direction::Ul, 14,
        );

        assert_eq!(alloc.dci.len(), 2);
        // Grants fill the slot back-to-front without overlap
        let first = &alloc.dci[0];
        let second = &alloc.dci[1];
        assert_eq!(first.start_symbol + first.num_symbols, SYMBOLS_PER_SLOT);
        assert_eq!(second.start_symbol + second.num_symbols, first.start_symbol);
    }

    #[test]
    fn test_resource_conservation_randomized() {
        let mut rng = StdRng::seed_from_u64(7);
        let policy = SchedPolicy::new(SchedPolicyKind::ProportionalFair);
        for _ in 0..50 {
            let cfg = test_cfg(20, 14);
            let mut arena = UeArena::new();
            let num_ues = rng.gen_range(1..8);
            for rnti in 1..=num_ues {
                let mcs = rng.gen_range(0..=28);
                let buffer = rng.gen_range(1..50_000);
                add_ue(&mut arena, rnti, rng.gen_range(0..3), mcs, buffer);
            }
            let active = active_map(&arena, Direction::Dl);
            let symbols = rng.gen_range(1..=14);
            let alloc = TdmaAllocator::allocate(
                &cfg, &mut arena, &active, &policy, &amc(), Direction::Dl, symbols,
            );

            let total_sym: u32 = alloc.beam_sym.values().sum();
            assert!(total_sym <= symbols);
            for ue in arena.values() {
                // TDMA granularity: whole symbols only
                assert_eq!(ue.dl_rbg % cfg.assignable_rbg(), 0);
            }
            let total_rbg: u32 = arena.values().map(|u| u.dl_rbg).sum();
            assert!(total_rbg <= symbols * cfg.assignable_rbg());
        }
    }

    #[test]
    fn test_notched_rbg_excluded() {
        let mut cfg = test_cfg(20, 14);
        cfg.notched_rbg[3] = true;
        cfg.notched_rbg[4] = true;
        let mut arena = UeArena::new();
        add_ue(&mut arena, 1, 0, 28, 100_000);
        let active = active_map(&arena, Direction::Dl);
        let policy = SchedPolicy::new(SchedPolicyKind::RoundRobin);
        let alloc = TdmaAllocator::allocate(
            &cfg, &mut arena, &active, &policy, &amc(), Direction::Dl, 2,
        );

        // 18 assignable RBG per symbol
        assert_eq!(arena[&Rnti::new(1)].dl_rbg, 36);
        let dci = &alloc.dci[0];
        assert!(!dci.rbg_bitmask[3]);
        assert!(!dci.rbg_bitmask[4]);
        assert_eq!(dci.rbg_bitmask.iter().filter(|&&b| b).count(), 18);
    }
}

//! NR MAC Scheduler Simulation Driver
//!
//! Loads a YAML scenario, builds the bandwidth-part routing layer with one
//! scheduler instance per BWP, and runs the TTI loop: inject offered
//! traffic, report buffers, schedule the slot, and drain the granted bytes.
//! Prints a per-UE throughput summary at the end of the run.

mod config;

use anyhow::Result;
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use common::types::{BeamId, BwpId, Direction, LcgId, Qci, Rnti, SubcarrierSpacing};
use config::ScenarioConfig;
use interfaces::{BsrReport, BufferStatusReport, LogicalChannelConfig, UeConfigRequest};
use layers::mac::{
    AllocatorKind, AmcModel, BwpConfig, BwpManager, MacScheduler, McsTable, SchedPolicyKind,
};

/// NR MAC scheduler simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a YAML scenario file; the built-in two-UE scenario runs if
    /// omitted
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Override the scenario's TTI count
    #[arg(long)]
    ttis: Option<u64>,

    /// Override the scenario's allocator (tdma, ofdma)
    #[arg(long)]
    allocator: Option<String>,

    /// Override the scenario's policy (rr, pf, qos, ai)
    #[arg(long)]
    policy: Option<String>,
}

fn parse_allocator(name: &str) -> Result<AllocatorKind> {
    match name {
        "tdma" => Ok(AllocatorKind::Tdma),
        "ofdma" => Ok(AllocatorKind::Ofdma),
        _ => Err(anyhow::anyhow!("Invalid allocator: {}", name)),
    }
}

fn parse_policy(name: &str) -> Result<SchedPolicyKind> {
    match name {
        "rr" | "round_robin" => Ok(SchedPolicyKind::RoundRobin),
        "pf" | "proportional_fair" => Ok(SchedPolicyKind::ProportionalFair),
        "qos" => Ok(SchedPolicyKind::Qos),
        "ai" => Ok(SchedPolicyKind::AiWeighted),
        _ => Err(anyhow::anyhow!("Invalid policy: {}", name)),
    }
}

fn parse_scs(khz: u16) -> Result<SubcarrierSpacing> {
    match khz {
        15 => Ok(SubcarrierSpacing::Scs15),
        30 => Ok(SubcarrierSpacing::Scs30),
        60 => Ok(SubcarrierSpacing::Scs60),
        120 => Ok(SubcarrierSpacing::Scs120),
        240 => Ok(SubcarrierSpacing::Scs240),
        _ => Err(anyhow::anyhow!("Invalid subcarrier spacing: {} kHz", khz)),
    }
}

/// Offered-load and served-byte accounting for one UE
#[derive(Debug, Default)]
struct UeTraffic {
    pending_dl: u64,
    pending_ul: u64,
    served_dl: u64,
    served_ul: u64,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    fmt().with_env_filter(env_filter).with_target(true).init();

    let mut scenario = match &args.config {
        Some(path) => {
            let yaml = std::fs::read_to_string(path)?;
            serde_yaml::from_str::<ScenarioConfig>(&yaml)?
        }
        None => {
            warn!("No scenario file given, running the built-in scenario");
            ScenarioConfig::default()
        }
    };
    if let Some(ttis) = args.ttis {
        scenario.ttis = ttis;
    }
    if let Some(allocator) = &args.allocator {
        scenario.allocator = allocator.clone();
    }
    if let Some(policy) = &args.policy {
        scenario.policy = policy.clone();
    }

    let allocator = parse_allocator(&scenario.allocator)?;
    let policy = parse_policy(&scenario.policy)?;
    let table = match scenario.mcs_table {
        1 => McsTable::Qam64,
        2 => McsTable::Qam256,
        other => return Err(anyhow::anyhow!("Invalid MCS table: {}", other)),
    };

    info!("Scenario configuration:");
    info!("  TTIs: {}", scenario.ttis);
    info!("  Allocator: {:?}", allocator);
    info!("  Policy: {:?}", policy);
    info!("  MCS table: {:?}", table);
    info!("  BWPs: {}", scenario.bwps.len());
    info!("  UEs: {}", scenario.ues.len());

    let mut manager = BwpManager::new();
    let mut bwp_ids = Vec::new();
    for bwp in &scenario.bwps {
        let mut notched = vec![false; bwp.bandwidth_rbg as usize];
        for &idx in &bwp.notched_rbg {
            if idx >= bwp.bandwidth_rbg {
                return Err(anyhow::anyhow!(
                    "Notched RBG {} outside bandwidth of {} RBG",
                    idx,
                    bwp.bandwidth_rbg
                ));
            }
            notched[idx as usize] = true;
        }
        let cfg = BwpConfig {
            bwp_id: BwpId(bwp.bwp_id),
            scs: parse_scs(bwp.scs_khz)?,
            bandwidth_rbg: bwp.bandwidth_rbg,
            num_rb_per_rbg: bwp.num_rb_per_rbg,
            notched_rbg: notched,
            dl_ctrl_symbols: bwp.dl_ctrl_symbols,
            ul_ctrl_symbols: bwp.ul_ctrl_symbols,
            dl_data_symbols: bwp.dl_data_symbols,
            ul_data_symbols: bwp.ul_data_symbols,
        };
        bwp_ids.push(BwpId(bwp.bwp_id));
        manager.add_bwp(MacScheduler::new(cfg, allocator, policy, table, AmcModel::Shannon)?);
    }
    for entry in &scenario.qci_map {
        manager.set_qci_mapping(Qci(entry.qci), BwpId(entry.bwp));
    }

    for ue in &scenario.ues {
        let rnti = Rnti::new(ue.rnti);
        manager.csched_ue_config_req(UeConfigRequest {
            rnti,
            beam_id: BeamId::new(ue.beam),
        })?;
        let mut channels = vec![LogicalChannelConfig {
            lcid: ue.lcid,
            lcg: LcgId(0),
            qci: Qci(ue.qci),
            direction: Direction::Dl,
            gbr_bps: ue.gbr_bps,
            mbr_bps: None,
        }];
        if ue.ul_bytes_per_tti > 0 {
            // Channel configs are keyed by LCID, so the UL bearer needs its own
            channels.push(LogicalChannelConfig {
                lcid: ue.lcid + 1,
                lcg: LcgId(0),
                qci: Qci(ue.qci),
                direction: Direction::Ul,
                gbr_bps: ue.gbr_bps,
                mbr_bps: None,
            });
        }
        manager.csched_lc_config_req(rnti, channels)?;
        for &bwp in &bwp_ids {
            let scheduler = manager
                .scheduler_mut(bwp)
                .ok_or_else(|| anyhow::anyhow!("Bwp index {} not valid", bwp.0))?;
            scheduler.report_cqi(rnti, Direction::Dl, ue.cqi);
            scheduler.report_cqi(rnti, Direction::Ul, ue.cqi);
        }
    }

    let slot_seconds = bwp_ids
        .first()
        .and_then(|bwp| manager.scheduler(*bwp))
        .map(|s| s.config().slot_seconds())
        .ok_or_else(|| anyhow::anyhow!("Scenario defines no bandwidth part"))?;

    let mut rng = StdRng::seed_from_u64(scenario.seed);
    let mut traffic: BTreeMap<Rnti, UeTraffic> = scenario
        .ues
        .iter()
        .map(|ue| (Rnti::new(ue.rnti), UeTraffic::default()))
        .collect();

    info!("Starting run: {} TTIs of {} us", scenario.ttis, slot_seconds * 1e6);
    for tti in 0..scenario.ttis {
        // Offered load with +/-20% jitter, then fresh buffer reports
        for ue in &scenario.ues {
            let rnti = Rnti::new(ue.rnti);
            let jitter: f64 = rng.gen_range(0.8..=1.2);
            let state = traffic.entry(rnti).or_default();
            state.pending_dl += (ue.dl_bytes_per_tti as f64 * jitter).round() as u64;
            state.pending_ul += (ue.ul_bytes_per_tti as f64 * jitter).round() as u64;

            if state.pending_dl > 0 {
                manager.report_buffer_status(&BufferStatusReport {
                    rnti,
                    lcid: ue.lcid,
                    tx_queue_bytes: state.pending_dl.min(u32::MAX as u64) as u32,
                    retx_queue_bytes: 0,
                    status_pdu_bytes: 0,
                    hol_delay_ms: 0,
                });
            }
            if state.pending_ul > 0 {
                manager.report_bsr(&BsrReport {
                    rnti,
                    lcg: LcgId(0),
                    buffer_bytes: state.pending_ul.min(u32::MAX as u64) as u32,
                });
            }
        }

        let results = manager.schedule_slot();
        for (_bwp, ind) in &results {
            for dci in &ind.dl_dci {
                let state = traffic.entry(dci.rnti).or_default();
                let served = (dci.tbs_bytes as u64).min(state.pending_dl);
                state.pending_dl -= served;
                state.served_dl += served;
            }
            for dci in &ind.ul_dci {
                let state = traffic.entry(dci.rnti).or_default();
                let served = (dci.tbs_bytes as u64).min(state.pending_ul);
                state.pending_ul -= served;
                state.served_ul += served;
            }
        }

        if tti % 100 == 0 {
            let grants: usize = results
                .iter()
                .map(|(_, ind)| ind.dl_dci.len() + ind.ul_dci.len())
                .sum();
            info!("TTI {}: {} grants", tti, grants);
        }
    }

    let elapsed = scenario.ttis as f64 * slot_seconds;
    info!("Run complete, per-UE throughput over {:.3} s:", elapsed);
    for (rnti, state) in &traffic {
        info!(
            "  RNTI {}: DL {:.3} Mbit/s ({} B, {} B left), UL {:.3} Mbit/s ({} B, {} B left)",
            rnti.0,
            state.served_dl as f64 * 8.0 / elapsed / 1e6,
            state.served_dl,
            state.pending_dl,
            state.served_ul as f64 * 8.0 / elapsed / 1e6,
            state.served_ul,
            state.pending_ul
        );
    }

    Ok(())
}

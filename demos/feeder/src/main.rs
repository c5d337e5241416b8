//! feeder — small radial distribution feeder on the rust_gk kernel.
//!
//! One substation feeds a handful of transformers, each serving a row of
//! household meters.  Meters drive the discrete clock; the substation asks
//! for delta mode on overload and a protection relay forces one fine-grained
//! episode at a configured fault time.
//!
//! ```bash
//! RUST_LOG=info,gk_exec=debug cargo run -p feeder -- demos/feeder/feeder.toml
//! ```

mod model;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use gk_core::{Dt, KernelConfig, PassConfig, Timestamp};
use gk_delta::Episode;
use gk_exec::{ExecBuilder, ExecError, ExecObserver};
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use model::{Meter, Relay, Substation, Transformer};

const DEFAULT_CONFIG: &str = "demos/feeder/feeder.toml";

// ── Configuration file ────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
#[serde(default)]
struct FeederFile {
    kernel: KernelConfig,
    feeder: FeederSettings,
}

#[derive(Deserialize)]
#[serde(default)]
struct FeederSettings {
    transformers:        usize,
    meters_per_xfmr:     usize,
    meter_kw:            f64,
    meter_interval_secs: i64,
    substation_limit_kw: f64,
    settle_substeps:     u32,
    fault_at_secs:       i64,
    relay_step_ms:       u64,
    relay_substeps:      u32,
    report_every_steps:  u64,
}

impl Default for FeederSettings {
    fn default() -> Self {
        Self {
            transformers:        4,
            meters_per_xfmr:     8,
            meter_kw:            3.5,
            meter_interval_secs: 300,
            substation_limit_kw: 140.0,
            settle_substeps:     3,
            fault_at_secs:       43_200,
            relay_step_ms:       5,
            relay_substeps:      20,
            report_every_steps:  48,
        }
    }
}

fn load(path: &Path) -> Result<FeederFile> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

// ── Observer ──────────────────────────────────────────────────────────────────

struct Progress {
    every: u64,
    steps: u64,
}

impl ExecObserver for Progress {
    fn on_step_end(&mut self, clock: Timestamp, next: Timestamp) {
        self.steps += 1;
        if self.every > 0 && self.steps % self.every == 0 {
            info!(%clock, %next, steps = self.steps, "progress");
        }
    }

    fn on_delta_episode(&mut self, clock: Timestamp, episode: &Episode) {
        info!(%clock, elapsed = %episode.elapsed, substeps = episode.substeps, end = ?episode.end, "delta episode");
    }
}

// ── main ──────────────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            let code = e.downcast_ref::<ExecError>().map_or(1, ExecError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn run() -> Result<()> {
    let path = std::env::args_os().nth(1).map_or_else(|| PathBuf::from(DEFAULT_CONFIG), PathBuf::from);
    let FeederFile { kernel, feeder } = load(&path)?;
    info!(
        config = %path.display(),
        transformers = feeder.transformers,
        meters = feeder.transformers * feeder.meters_per_xfmr,
        stop = %kernel.stop_time,
        "feeder demo"
    );

    // 1. Classes.
    let mut b = ExecBuilder::new(kernel);
    let meter = b.register_class("meter", PassConfig::BOTTOMUP, Meter::default)?;
    let xfmr = b.register_class("transformer", PassConfig::BOTTOMUP, Transformer::default)?;
    let sub = b.register_class("substation", PassConfig::POSTTOPDOWN, Substation::default)?;
    b.force_name(sub)?;

    // 2. Objects and edges: meters under transformers under the substation.
    let head = b.insert(
        sub,
        Some("substation"),
        Box::new(Substation {
            limit_kw: feeder.substation_limit_kw,
            settle_steps: feeder.settle_substeps,
            ..Substation::default()
        }),
    )?;
    b.enable_delta_mode(head)?;

    let mut transformers = Vec::with_capacity(feeder.transformers);
    for k in 0..feeder.transformers {
        let mut meters = Vec::with_capacity(feeder.meters_per_xfmr);
        for j in 0..feeder.meters_per_xfmr {
            let model = Meter {
                base_kw: feeder.meter_kw,
                interval: feeder.meter_interval_secs,
                phase: (k * feeder.meters_per_xfmr + j) as f64 * 0.07,
                ..Meter::default()
            };
            meters.push(b.insert(meter, Some(format!("meter-{k}-{j}").as_str()), Box::new(model))?);
        }
        let x = b.insert(
            xfmr,
            Some(format!("xfmr-{k}").as_str()),
            Box::new(Transformer { meters: meters.clone(), ..Transformer::default() }),
        )?;
        for m in meters {
            b.set_parent(m, x)?;
        }
        b.set_parent(x, head)?;
        transformers.push(x);
    }
    b.store_mut()
        .write::<Substation, _>(head, |s| s.transformers = transformers.clone())?;

    // 3. Delta-mode module.
    b.register_module(Relay::new(
        Timestamp(feeder.fault_at_secs),
        Dt::from_millis(feeder.relay_step_ms),
        feeder.relay_substeps,
    ))?;

    // 4. Run.
    let started = Instant::now();
    let mut exec = b.build()?;
    let mut progress = Progress { every: feeder.report_every_steps, steps: 0 };
    let summary = exec.run(&mut progress)?;

    let mut peak = 0.0_f64;
    for &x in &transformers {
        peak = peak.max(exec.store().read::<Transformer, _>(x, |t| t.peak_kw)?);
    }
    let overloads = exec.store().read::<Substation, _>(head, |s| s.overloads)?;
    info!(
        final_clock = %summary.final_clock,
        steps = summary.steps,
        passes = summary.passes,
        delta_episodes = summary.delta_episodes,
        end = ?summary.end,
        peak_xfmr_kw = peak,
        overloads,
        wall_ms = started.elapsed().as_secs_f64() * 1e3,
        "feeder run complete"
    );
    Ok(())
}

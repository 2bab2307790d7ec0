// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Cadence sandbox
// Drives a handful of animated systems through a conductor and prints its report.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use cadence_control::{Conductor, ConductorConfig, WeakConductor};
use cadence_core::{
    FrameSystem, Mode, PacedFrameClock, Priority, SystemHandle, SystemHooks, TimestampedSystem,
};
use cadence_telemetry::{init_logging, HealthMonitorConfig};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about = "Runs a conductor against a paced frame clock")]
struct Args {
    /// Number of refreshes to deliver.
    #[arg(long, default_value_t = 600)]
    frames: u64,
    /// Simulated display refresh rate.
    #[arg(long, default_value_t = 60.0)]
    refresh_hz: f64,
    /// Particles simulated per update; raise it to push the conductor into performance mode.
    #[arg(long, default_value_t = 20_000)]
    particles: usize,
    /// Optional JSON conductor configuration.
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Keeps the pointer-following sprite glued to the cursor. Runs every frame.
struct CursorFollower {
    position: (f64, f64),
    elapsed_ms: f64,
}

impl FrameSystem for CursorFollower {
    fn update(&mut self, delta_ms: f64) -> anyhow::Result<()> {
        self.elapsed_ms += delta_ms;
        let t = self.elapsed_ms / 1000.0;
        let target = (t.cos() * 200.0, t.sin() * 120.0);
        let k = (delta_ms / 50.0).min(1.0);
        self.position.0 += (target.0 - self.position.0) * k;
        self.position.1 += (target.1 - self.position.1) * k;
        Ok(())
    }
}

/// A particle field whose density follows the conductor's mode.
struct ParticleField {
    positions: Vec<(f32, f32)>,
    velocities: Vec<(f32, f32)>,
    active: usize,
}

impl ParticleField {
    fn new(count: usize) -> Self {
        let velocities = (0..count)
            .map(|i| {
                let angle = i as f32 * 0.618_034 * std::f32::consts::TAU;
                (angle.cos() * 40.0, angle.sin() * 40.0)
            })
            .collect();
        Self {
            positions: vec![(0.0, 0.0); count],
            velocities,
            active: count,
        }
    }
}

impl FrameSystem for ParticleField {
    fn update(&mut self, delta_ms: f64) -> anyhow::Result<()> {
        let dt = (delta_ms / 1000.0) as f32;
        for (position, velocity) in self
            .positions
            .iter_mut()
            .zip(self.velocities.iter_mut())
            .take(self.active)
        {
            position.0 += velocity.0 * dt;
            position.1 += velocity.1 * dt;
            if position.0.abs() > 400.0 {
                velocity.0 = -velocity.0;
            }
            if position.1.abs() > 300.0 {
                velocity.1 = -velocity.1;
            }
        }
        Ok(())
    }

    fn on_mode_change(&mut self, mode: Mode) -> anyhow::Result<()> {
        self.active = match mode {
            Mode::Performance => self.positions.len() / 2,
            Mode::Quality => self.positions.len(),
        };
        log::info!("ParticleField: {} particles active in {mode} mode.", self.active);
        Ok(())
    }
}

/// Parallax layers written against the timestamped update form.
struct Parallax {
    offsets: [f64; 4],
}

impl TimestampedSystem for Parallax {
    fn update(&mut self, timestamp_ms: f64, _delta_ms: f64) -> anyhow::Result<()> {
        for (depth, offset) in self.offsets.iter_mut().enumerate() {
            *offset = (timestamp_ms / 1000.0 * (depth as f64 + 1.0)).sin() * 30.0;
        }
        Ok(())
    }
}

/// Fades the intro overlay out, then removes itself.
struct IntroFade {
    conductor: WeakConductor,
    opacity: f64,
}

impl FrameSystem for IntroFade {
    fn update(&mut self, delta_ms: f64) -> anyhow::Result<()> {
        self.opacity = (self.opacity - delta_ms / 1000.0).max(0.0);
        if self.opacity == 0.0 {
            if let Some(conductor) = self.conductor.upgrade() {
                log::info!("IntroFade: overlay gone, unregistering.");
                conductor.unregister("intro-fade");
            }
        }
        Ok(())
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<ConductorConfig> {
    let Some(path) = path else {
        return Ok(ConductorConfig::default());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading conductor configuration from {}", path.display()))?;
    ConductorConfig::from_json_str(&json)
        .with_context(|| format!("invalid conductor configuration in {}", path.display()))
}

fn register_systems(conductor: &Conductor, particles: usize) -> Result<()> {
    conductor.register_with(
        "cursor",
        SystemHandle::from_system(CursorFollower {
            position: (0.0, 0.0),
            elapsed_ms: 0.0,
        }),
        Priority::Critical,
        60.0,
    )?;
    conductor.register("particles", SystemHandle::from_system(ParticleField::new(particles)))?;
    conductor.register_with(
        "parallax",
        SystemHandle::timestamped(Rc::new(RefCell::new(Parallax { offsets: [0.0; 4] }))),
        Priority::Normal,
        30.0,
    )?;

    let twinkle_phase = Rc::new(RefCell::new(0.0_f64));
    conductor.register_with(
        "starfield",
        SystemHooks::new()
            .update(move |delta_ms| {
                // Stands in for a DOM-heavy background redraw.
                let deadline = Instant::now() + Duration::from_micros(800);
                let mut phase = twinkle_phase.borrow_mut();
                while Instant::now() < deadline {
                    *phase = (*phase + delta_ms * 1e-3).rem_euclid(std::f64::consts::TAU);
                }
                Ok(())
            })
            .on_mode_change(|mode| {
                log::info!("Starfield: now running in {mode} mode.");
                Ok(())
            }),
        Priority::Background,
        10.0,
    )?;

    conductor.register(
        "intro-fade",
        SystemHandle::from_system(IntroFade {
            conductor: conductor.downgrade(),
            opacity: 1.0,
        }),
    )?;
    Ok(())
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let config = load_config(args.config.as_ref())?;
    let clock = Rc::new(PacedFrameClock::new(args.refresh_hz));
    let conductor = Conductor::builder(clock.clone())
        .config(config)
        .with_frame_health(HealthMonitorConfig {
            refresh_interval_ms: clock.refresh_interval_ms(),
            ..Default::default()
        })
        .build()?;

    register_systems(&conductor, args.particles)?;
    log::info!(
        "Sandbox: {} systems registered, running {} frames at {}Hz.",
        conductor.system_count(),
        args.frames,
        args.refresh_hz
    );

    let delivered = clock.run_frames(args.frames);
    let report = conductor.report();
    log::info!(
        "Sandbox: delivered {} frames, {} ticks, final mode {}, budget {}ms.",
        delivered,
        report.tick_count,
        report.mode,
        report.frame_budget_ms
    );
    for (name, system) in &report.per_system {
        log::info!(
            "  {name:<12} {:<10} runs={:<5} avg={:.3}ms max={:.3}ms skipped={} faults={}",
            system.priority,
            system.exec_count,
            system.avg_exec_ms,
            system.max_exec_ms,
            system.skipped_count,
            system.fault_count
        );
    }

    println!("{}", report.to_json()?);
    Ok(())
}

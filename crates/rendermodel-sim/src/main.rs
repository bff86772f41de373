//! Render Model Simulator - Main entry point
//!
//! Drives controller render models against a headless scene through a
//! scripted device scenario and reports what was built.

mod config;

use anyhow::Result;
use clap::Parser;
use rendermodel_core::controller::{Controller, HostContext, LoadingState};
use rendermodel_core::events::{ModelEvent, ModelEventReceiver};
use rendermodel_core::headless::HeadlessScene;
use rendermodel_core::store::ModelStore;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use config::{Config, SimAction};

#[derive(Parser, Debug)]
#[command(name = "rendermodel-sim")]
#[command(about = "Headless controller render model simulator")]
#[command(version)]
struct Args {
    /// Path to scenario file
    #[arg(short, long, default_value = "scenario.toml")]
    config: PathBuf,

    /// Override the number of simulated frames
    #[arg(short, long)]
    frames: Option<u32>,

    /// Override the model directory
    #[arg(short, long)]
    models_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Write an example scenario to the config path and exit
    #[arg(long)]
    write_example: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Render model simulator v{}", env!("CARGO_PKG_VERSION"));

    if args.write_example {
        config::save_default_config(&args.config)?;
        println!("Example scenario written to {}", args.config.display());
        return Ok(());
    }

    let mut config = config::load_config(&args.config)?;
    if let Some(frames) = args.frames {
        config.sim.frames = frames;
    }
    let models_dir = args
        .models_dir
        .unwrap_or_else(|| PathBuf::from(&config.sim.models_dir));

    info!(
        frames = config.sim.frames,
        models = %models_dir.display(),
        controllers = config.sim.sides.len(),
        "Scenario loaded"
    );

    let report = run(&config, ModelStore::from_dir(&models_dir));
    report.print();
    Ok(())
}

struct Simulated {
    controller: Controller,
    events: ModelEventReceiver,
    /// Disabled controllers are not ticked
    enabled: bool,
    ready: u32,
    removed: u32,
}

/// Final state of one simulation
struct Report {
    controllers: Vec<ControllerReport>,
    live_nodes: usize,
    textures: usize,
    materials: usize,
}

struct ControllerReport {
    name: String,
    state: LoadingState,
    sections: usize,
    prefab: bool,
    shown: bool,
    ready: u32,
    removed: u32,
}

impl Report {
    fn print(&self) {
        println!("Simulated {} controllers:", self.controllers.len());
        for c in &self.controllers {
            println!(
                "  - {} {:?}: {} sections, prefab {}, shown {}, ready {} times, removed {} times",
                c.name, c.state, c.sections, c.prefab, c.shown, c.ready, c.removed
            );
        }
        println!(
            "Scene: {} nodes, {} textures, {} materials",
            self.live_nodes, self.textures, self.materials
        );
    }
}

fn run(config: &Config, mut store: ModelStore) -> Report {
    let mut scene = HeadlessScene::new();
    let mut devices = config.devices.clone();
    let delta = Duration::from_secs_f32(1.0 / config.sim.frame_rate.max(1.0));

    let mut controllers: Vec<Simulated> = config
        .sim
        .sides
        .iter()
        .map(|side| {
            let mut controller = Controller::new(*side, config.controller.clone());
            controller.on_oem_config_changed(config.battery);
            let events = controller.subscribe();
            Simulated {
                controller,
                events,
                enabled: true,
                ready: 0,
                removed: 0,
            }
        })
        .collect();

    for sim in &mut controllers {
        let mut cx = HostContext {
            devices: &devices,
            provider: &mut store,
            scene: &mut scene,
        };
        sim.controller.enable(&mut cx);
    }

    for frame in 0..config.sim.frames {
        for step in config.steps.iter().filter(|s| s.frame == frame) {
            step.apply(&mut devices);
            let Some(action) = step.action else {
                continue;
            };
            info!(frame, ?action, side = ?step.side, "Scenario action");
            for sim in controllers
                .iter_mut()
                .filter(|sim| step.targets(sim.controller.side()))
            {
                let mut cx = HostContext {
                    devices: &devices,
                    provider: &mut store,
                    scene: &mut scene,
                };
                match action {
                    SimAction::Enable => {
                        sim.controller.enable(&mut cx);
                        sim.enabled = true;
                    }
                    SimAction::Disable => {
                        sim.controller.disable(&mut cx);
                        sim.enabled = false;
                    }
                    SimAction::Pause => sim.controller.pause(&mut cx, true),
                    SimAction::Resume => sim.controller.pause(&mut cx, false),
                    SimAction::Reapply => sim.controller.reapply_settings(&mut cx),
                    SimAction::Show => sim.controller.set_controller_mode_visible(cx.scene, true),
                    SimAction::Hide => sim.controller.set_controller_mode_visible(cx.scene, false),
                }
            }
        }

        store.process_pending();

        for sim in &mut controllers {
            let mut cx = HostContext {
                devices: &devices,
                provider: &mut store,
                scene: &mut scene,
            };
            if sim.enabled {
                sim.controller.tick(&mut cx);
                sim.controller.advance_watchdog(&mut cx, delta);
            }

            while let Ok(event) = sim.events.try_recv() {
                match event {
                    ModelEvent::Ready(side) => {
                        sim.ready += 1;
                        info!(frame, %side, "Model ready");
                    }
                    ModelEvent::Removed(side) => {
                        sim.removed += 1;
                        info!(frame, %side, "Model removed");
                    }
                }
            }
        }
    }

    Report {
        controllers: controllers
            .iter()
            .map(|sim| ControllerReport {
                name: format!("{} ({})", sim.controller.side(), sim.controller.render_model_name()),
                state: sim.controller.state(),
                sections: sim.controller.children().map(|c| c.live_count()).unwrap_or(0),
                prefab: sim.controller.spawned_prefab().is_some(),
                shown: sim.controller.is_shown(),
                ready: sim.ready,
                removed: sim.removed,
            })
            .collect(),
        live_nodes: scene.live_node_count(),
        textures: scene.texture_count(),
        materials: scene.material_count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::ScenarioStep;
    use rendermodel_core::device::Side;
    use rendermodel_core::resource::{MeshSection, ModelData, TextureInfo};
    use rendermodel_core::store::StaticModelSource;

    fn model() -> ModelData {
        ModelData {
            sections: vec![MeshSection {
                mesh_name: "__CM__Body".to_string(),
                vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
                normals: Vec::new(),
                uvs: Vec::new(),
                indices: vec![0, 1, 2],
                active: true,
                matrix: [
                    1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0,
                ],
            }],
            textures: vec![TextureInfo::new(1, 1, vec![0; 4])],
            battery_setting: false,
            battery_indicators: None,
        }
    }

    fn scenario() -> Config {
        let mut config = Config::default();
        config.sim.frames = 30;
        config.sim.sides = vec![Side::Right];
        config.devices.right.connected = true;
        config.devices.right.tracked = true;
        config.devices.right.render_model_name = "WVR_CR_Right_001".to_string();
        config
    }

    #[test]
    fn test_builds_model() {
        let store = ModelStore::new(StaticModelSource::default().with_model("WVR_CR_Right_001", model()));
        let report = run(&scenario(), store);

        let right = &report.controllers[0];
        assert_eq!(right.state, LoadingState::Loaded);
        assert_eq!(right.sections, 1);
        assert!(!right.prefab);
        assert!(right.shown);
        assert_eq!(right.ready, 1);
        assert_eq!(report.live_nodes, 1);
    }

    #[test]
    fn test_disabled_controller_is_not_ticked() {
        let mut config = scenario();
        config.steps.push(ScenarioStep {
            frame: 1,
            action: Some(SimAction::Disable),
            ..Default::default()
        });
        let store = ModelStore::new(StaticModelSource::default().with_model("WVR_CR_Right_001", model()));
        let report = run(&config, store);

        let right = &report.controllers[0];
        assert_eq!(right.state, LoadingState::NotLoaded);
        assert_eq!(right.ready, 0);
        assert_eq!(right.removed, 1);
        assert_eq!(report.live_nodes, 0);
        assert_eq!(report.materials, 0);
    }

    #[test]
    fn test_disable_then_enable_rebuilds() {
        let mut config = scenario();
        config.sim.frames = 60;
        config.steps.push(ScenarioStep {
            frame: 1,
            action: Some(SimAction::Disable),
            ..Default::default()
        });
        config.steps.push(ScenarioStep {
            frame: 20,
            action: Some(SimAction::Enable),
            ..Default::default()
        });
        let store = ModelStore::new(StaticModelSource::default().with_model("WVR_CR_Right_001", model()));
        let report = run(&config, store);

        let right = &report.controllers[0];
        assert_eq!(right.state, LoadingState::Loaded);
        assert_eq!(right.ready, 1);
        assert_eq!(right.removed, 1);
        assert_eq!(report.live_nodes, 1);
    }

    #[test]
    fn test_disconnect_tears_down_and_falls_back() {
        let mut config = scenario();
        config.sim.frames = 90;
        config.steps.push(ScenarioStep {
            frame: 10,
            connected: Some(false),
            tracked: Some(false),
            ..Default::default()
        });
        let report = run(&config, ModelStore::new(StaticModelSource::default()));

        let right = &report.controllers[0];
        assert_eq!(right.state, LoadingState::NotLoaded);
        assert_eq!(right.removed, 1);
        assert_eq!(report.live_nodes, 0);
    }
}

//! Two-node adhoc 802.11 link simulator.
//!
//! Loads a JSON scene describing the PHY, the propagation model, the nodes
//! with their directional antennas, and the datagram flows between them,
//! then runs the discrete-event simulation and prints one statistics block
//! per flow.

use anyhow::{Context, bail};
use env_logger::Builder;
use log::LevelFilter;

use adhoc_link_simulator::{scene, simulation};

fn main() -> anyhow::Result<()> {
    // Logging setup
    Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let mut args = std::env::args().skip(1);
    let Some(scene_path) = args.next() else {
        bail!("usage: adhoc-link-simulator <scene.json>");
    };

    let scene = scene::load_scene(&scene_path)
        .with_context(|| format!("Failed to load scene {}", scene_path))?;

    let simulation = simulation::Simulation::from_scene(&scene)?;
    let reports = simulation.run();

    for report in &reports {
        println!("{}", report);
        println!();
    }

    Ok(())
}

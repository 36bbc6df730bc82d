//! Drive the plugin bridge against the simulated provider.
//!
//! Run with `LOCUS_LOG_MODE=development` to see the broker's logs.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use locus_bridge::logging::init_logging_from_env;
use locus_bridge::prelude::*;
use locus_provider::simulated::{sample_floor_plan, SimulatedPermissionGate, SimulatedProvider};
use locus_provider::{Location, Region, RegionEvent};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging_from_env()?;

    let provider = SimulatedProvider::new().with_floor_plan(sample_floor_plan("fp-1"));
    let gate = Arc::new(SimulatedPermissionGate::new(true));
    let config = BrokerConfig::bounded_requests();
    let bridge = PositioningBridge::with_config(config, Arc::new(provider.clone()), gate)?;

    let init = bridge.execute("initialize", r#"["demo-key", "demo-secret"]"#)?;
    let permissions = bridge.execute("getPermissions", "[]")?;
    let fetch = bridge.execute("fetchFloorPlan", r#"["fp-1"]"#)?;
    for id in [init, permissions, fetch] {
        if let Some(result) = bridge.iter().recv_for(id, Duration::from_secs(1)) {
            println!("{}", result.to_json()?);
        }
    }

    let watch = bridge.execute("addWatch", r#"["demo", 5000]"#)?;
    let regions = bridge.execute("addRegionWatch", r#"["demo-regions"]"#)?;
    println!("{}", bridge.stats()?);

    let lobby = Region::floor_plan("fp-1").with_name("Lobby");
    let emitter = {
        let provider = provider.clone();
        thread::spawn(move || {
            provider.emit_region(RegionEvent::enter(lobby.clone()));
            for step in 0..3 {
                let fix = Location::new(60.17 + f64::from(step) * 1e-4, 24.94, 2.5)
                    .with_floor(1, 0.95)
                    .with_region(lobby.clone());
                provider.emit_location(fix);
                thread::sleep(Duration::from_millis(200));
            }
            provider.fail_session("demo finished");
        })
    };

    // Both watches end with the session failure.
    for id in [watch, regions] {
        for result in bridge.iter().results_for(id, Duration::from_secs(2)) {
            println!("{}", result.to_json()?);
        }
    }
    let _ = emitter.join();

    println!("{}", bridge.stats()?);
    bridge.shutdown()?;
    Ok(())
}

//! Drives the "Audio Reactive Sphere" preset without a renderer.
//!
//! Run with: cargo run --example headless --features cpal_capture
//!
//! Without `cpal_capture` the default microphone can't be opened and the
//! sphere stays at its base scale.

use std::thread::sleep;
use std::time::Duration;

use resonode::{MeshHandle, Preset, Scene, SceneConfig, DEFAULT_SOURCE_ID};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut scene = Scene::new(SceneConfig::default());
    let preset = Preset::find_builtin("Audio Reactive Sphere").ok_or("missing preset")?;
    scene.load_preset(&preset)?;

    let drawable: Vec<String> = scene
        .nodes()
        .iter()
        .filter(|n| !n.is_effect() && !n.is_output())
        .map(|n| n.id.as_str().to_owned())
        .collect();
    for id in drawable {
        scene.mount(id, MeshHandle::new());
    }
    println!("mounted {} handle(s)", scene.handles().len());

    // ~5 seconds at 60 ticks per second
    for frame in 0..300 {
        let report = scene.tick();
        if frame % 30 == 0 {
            let features = scene.features(DEFAULT_SOURCE_ID);
            let scale = scene.handles().get("sphere-1").map(|h| h.scale());
            println!(
                "frame {frame:>3}: amplitude {:.3}, scale {:?}, {:?}",
                features.amplitude, scale, report
            );
        }
        sleep(Duration::from_millis(16));
    }

    scene.release_all();
    Ok(())
}

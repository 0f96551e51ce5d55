//! Run the mouse layer against the configuration file.
//!
//! Run with: cargo run --example layer
//!
//! Move a mouse or trackball, then press `j`/`k` to click and `u`/`i` to
//! scroll. Any other key (or a pause in pointer activity) drops the layer.
//! Newly seen devices are written back to the configuration on exit so they
//! can be disabled there.
//!
//! Platform support:
//! - Windows: low-level keyboard hook + Raw Input
//! - Linux: evdev (needs the 'input' group and access to /dev/uinput)

use mouselayer::{Engine, LayerConfig, config_path};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

fn main() {
    println!("mouselayer example");
    println!("==================\n");

    let path = match config_path() {
        Ok(path) => path,
        Err(e) => {
            eprintln!("No configuration directory: {}", e);
            return;
        }
    };
    let config = match LayerConfig::load(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {}", path.display(), e);
            return;
        }
    };

    println!("Configuration: {}", path.display());
    println!("Timeout: {} ms", config.timeout_ms);
    for (key, action) in &config.mappings {
        println!("  {} -> {}", key, action);
    }
    println!("\nPress Ctrl+C to exit.\n");

    let mut engine = match Engine::new(config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Failed to create engine: {}", e);
            return;
        }
    };

    if let Err(e) = engine.add_listener(|change| {
        println!(
            "[{}] {} -> {}",
            change.reason, change.old_state, change.new_state
        );
    }) {
        eprintln!("Failed to register listener: {}", e);
    }

    match engine.start() {
        Ok(report) => {
            println!("Activity source: {}", report.activity_mode);
            if let Some(e) = &report.key_hook_error {
                println!("Key hook unavailable, keys pass through: {}", e);
            }
        }
        Err(e) => {
            eprintln!("Failed to start: {}", e);
            return;
        }
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
        println!("\nStopping...");
    })
    .expect("Error setting Ctrl-C handler");

    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));
    }

    println!("\nDevices seen:");
    for device in engine.registry().devices() {
        println!(
            "  {} {} ({})",
            device.id(),
            device.display_name,
            if device.enabled { "enabled" } else { "disabled" }
        );
    }

    if let Err(e) = engine.export_config().save(&path) {
        eprintln!("Failed to save {}: {}", path.display(), e);
    }
    engine.quit();
}

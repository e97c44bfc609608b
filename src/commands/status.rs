//! Show service status

use std::path::Path;

use sysprov::InitSystem;

pub fn status(manifest: &Path, init: Option<InitSystem>) -> Result<(), Box<dyn std::error::Error>> {
    let service = super::load_service(manifest, init)?;
    let desc = service.descriptor();

    let (exists, matches) = service.exists_and_matches()?;
    let enabled = service.enabled();
    let running = service.running();

    let status_symbol = match (running, exists && matches) {
        (true, true) => "●",
        (true, false) => "◐",
        (false, _) => "○",
    };
    println!("{} {} - {}", status_symbol, desc.name, desc.description);

    let unit_state = match (exists, matches) {
        (false, _) => "missing",
        (true, false) => "stale",
        (true, true) => "current",
    };
    println!("       Init: {}", service.init_system());
    println!("       Unit: {} ({})", service.unit_path().display(), unit_state);
    if let Some(path) = service.extra_script_path() {
        println!("      Extra: {}", path.display());
    }
    println!("    Enabled: {}", if enabled { "yes" } else { "no" });
    println!("     Active: {}", if running { "running" } else { "inactive" });
    println!("  ExecStart: {}", desc.command);

    Ok(())
}

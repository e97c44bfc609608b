//! Stop a service

use std::path::Path;

use sysprov::InitSystem;

pub fn stop(manifest: &Path, init: Option<InitSystem>) -> Result<(), Box<dyn std::error::Error>> {
    let service = super::load_service(manifest, init)?;
    service.stop()?;
    println!("○ {} - stopped", service.descriptor().name);
    Ok(())
}

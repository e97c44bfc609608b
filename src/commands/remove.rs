//! Stop and remove a service

use std::path::Path;

use sysprov::InitSystem;

pub fn remove(manifest: &Path, init: Option<InitSystem>) -> Result<(), Box<dyn std::error::Error>> {
    let service = super::load_service(manifest, init)?;
    service.stop_and_remove()?;
    println!("○ {} - removed", service.descriptor().name);
    Ok(())
}

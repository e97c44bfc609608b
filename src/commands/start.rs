//! Start a service

use std::path::Path;

use sysprov::InitSystem;

pub fn start(manifest: &Path, init: Option<InitSystem>) -> Result<(), Box<dyn std::error::Error>> {
    let service = super::load_service(manifest, init)?;
    service.start()?;
    println!("● {} - started", service.descriptor().name);
    Ok(())
}

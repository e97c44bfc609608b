//! Install a service

use std::path::Path;

use sysprov::InitSystem;

pub fn install(manifest: &Path, init: Option<InitSystem>) -> Result<(), Box<dyn std::error::Error>> {
    let service = super::load_service(manifest, init)?;
    service.install()?;

    println!(
        "● {} - installed ({})",
        service.descriptor().name,
        service.unit_path().display()
    );

    Ok(())
}

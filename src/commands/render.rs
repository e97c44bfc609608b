//! Render a provisioning artifact

use std::io::Write;
use std::path::Path;

use sysprov::{ArtifactFormat, Manifest, ProvisioningCompiler};

pub fn render(manifest: &Path, format: ArtifactFormat, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let manifest = Manifest::load(manifest)?;
    let compiler = ProvisioningCompiler::new(manifest.platform.clone());
    let artifact = compiler.build(&manifest.service, &manifest.packages, format)?;

    match output {
        Some(path) => {
            std::fs::write(path, artifact.as_bytes())?;
            log::info!(
                "Wrote {} for {} to {}",
                format,
                artifact.family.as_str(),
                path.display()
            );
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(artifact.as_bytes())?;
            stdout.flush()?;
        }
    }

    Ok(())
}

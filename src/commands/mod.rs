mod install;
mod list;
mod remove;
mod render;
mod start;
mod status;
mod stop;

pub use install::install;
pub use list::list;
pub use remove::remove;
pub use render::render;
pub use start::start;
pub use status::status;
pub use stop::stop;

use std::path::Path;

use sysprov::{InitSystem, Manifest, Service};
use sysprov::service::SystemRunner;

/// Service from a manifest, managed by `init` or else the manifest's init
/// system, the local host's, or the platform default in that order.
fn load_service(manifest: &Path, init: Option<InitSystem>) -> Result<Service<SystemRunner>, Box<dyn std::error::Error>> {
    let manifest = Manifest::load(manifest)?;
    let init = init
        .or(manifest.platform.init)
        .or_else(InitSystem::detect)
        .unwrap_or_else(|| manifest.platform.init_system());
    log::debug!("Managing {} with {}", manifest.service.name, init);
    Ok(Service::new(manifest.service, init, SystemRunner))
}

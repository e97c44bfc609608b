//! List services known to an init system

use std::path::Path;

use sysprov::service::{self, SystemRunner};
use sysprov::InitSystem;

pub fn list(init: Option<InitSystem>, init_dir: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let init = init
        .or_else(InitSystem::detect)
        .ok_or("cannot detect the init system, pass --init")?;

    let names = service::list_services(init, init_dir, &SystemRunner)?;
    println!("SERVICE");
    for name in &names {
        println!("{}", name);
    }

    println!();
    println!("{} {} services listed", names.len(), init);

    Ok(())
}

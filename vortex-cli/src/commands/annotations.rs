//! `vortex annotations`

use vortex_core::annotations::{ALL_ALLOWED, RDT_POD, RDT_POD_CONTAINER_PREFIX};

pub fn list() {
    println!("Allowed container annotations:");
    for key in ALL_ALLOWED {
        println!("  {key}");
    }
    println!();
    println!("Pod-level RDT annotations:");
    println!("  {RDT_POD}");
    println!("  {RDT_POD_CONTAINER_PREFIX}<container>");
}

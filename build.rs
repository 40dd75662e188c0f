//! Build script for the CPU hotplug manager
//!
//! Generates the compile-time kernel configuration consumed by `config/mod.rs`.

use std::env;
use std::fs;
use std::path::Path;

/// Core count used when `FERRO_SMP_NCPUS` is not set
const DEFAULT_SMP_NCPUS: usize = 4;

/// Largest core count a 64-bit affinity mask can describe
const MAX_SMP_NCPUS: usize = 64;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=TARGET");
    println!("cargo:rerun-if-env-changed=FERRO_SMP_NCPUS");

    let target = env::var("TARGET").unwrap_or_else(|_| {
        "aarch64-unknown-none-softfloat".to_string()
    });

    generate_config(&target, smp_ncpus());
}

fn smp_ncpus() -> usize {
    let Ok(raw) = env::var("FERRO_SMP_NCPUS") else {
        return DEFAULT_SMP_NCPUS;
    };

    match raw.trim().parse::<usize>() {
        Ok(n) if (2..=MAX_SMP_NCPUS).contains(&n) => n,
        _ => panic!(
            "FERRO_SMP_NCPUS must be an integer in 2..={}, got {:?}",
            MAX_SMP_NCPUS, raw
        ),
    }
}

fn generate_config(target: &str, ncpus: usize) {
    let out_dir = env::var("OUT_DIR").unwrap();
    let dest_path = Path::new(&out_dir).join("config.rs");

    let arch = if target.contains("aarch64") {
        "aarch64"
    } else if target.contains("riscv64") {
        "riscv64"
    } else if target.contains("x86_64") {
        "x86_64"
    } else {
        "unknown"
    };

    let mut config = String::new();
    config.push_str("// Auto-generated configuration file\n\n");

    config.push_str("/// Target architecture this image was built for\n");
    config.push_str(&format!("pub const ARCH: &str = \"{}\";\n", arch));

    // SMP configuration
    config.push_str("\n// SMP configuration\n");
    config.push_str("/// Number of cores managed by the hotplug subsystem\n");
    config.push_str(&format!("pub const SMP_NCPUS: usize = {};\n", ncpus));
    config.push_str("/// Capacity of the hotplug notifier table\n");
    config.push_str("pub const MAX_NOTIFIERS: usize = 8;\n");
    config.push_str("/// Depth of each per-core ready queue\n");
    config.push_str("pub const RUN_QUEUE_DEPTH: usize = 32;\n");

    // Feature flags
    config.push_str("\n// Feature configuration\n");
    config.push_str(&format!("/// `debug` feature enabled\npub const DEBUG: bool = {};\n",
                           env::var_os("CARGO_FEATURE_DEBUG").is_some()));
    config.push_str(&format!("/// `verbose` feature enabled\npub const VERBOSE: bool = {};\n",
                           env::var_os("CARGO_FEATURE_VERBOSE").is_some()));

    fs::write(&dest_path, config).unwrap();
}

//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `refsync_core` linkage.
//! - Print the effective engine configuration, optionally loaded from a
//!   JSON file given as the first argument.

use std::process::ExitCode;

fn main() -> ExitCode {
    println!("refsync_core ping={}", refsync_core::ping());
    println!("refsync_core version={}", refsync_core::core_version());

    let config = match std::env::args().nth(1) {
        Some(path) => match refsync_core::load_config(&path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("failed to load config `{path}`: {err}");
                return ExitCode::FAILURE;
            }
        },
        None => refsync_core::EngineConfig::default(),
    };

    match serde_json::to_string_pretty(&config) {
        Ok(rendered) => {
            println!("{rendered}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("failed to render config: {err}");
            ExitCode::FAILURE
        }
    }
}

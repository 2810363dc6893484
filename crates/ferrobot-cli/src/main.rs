//! `ferrobot` – runs the demo robots behind the HTTP API until Ctrl-C.
//!
//! # Environment
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Log filter, default `info` |
//! | `FERROBOT_LOG_FORMAT=json` | Newline-delimited JSON logs |
//! | `FERROBOT_API_*` | API overrides, see [`ApiConfig::with_env_overrides`] |

mod demo;

use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use ferrobot_api::{ApiConfig, ApiServer};
use ferrobot_hal::adaptors::HostAdaptor;
use ferrobot_kernel::Manager;
use ferrobot_types::{FerroError, Value};
use tracing::info;

#[tokio::main]
async fn main() -> ExitCode {
    // RUST_LOG wins; FERROBOT_LOG_FORMAT=json switches the formatter.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("FERROBOT_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    }

    print_banner();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), FerroError> {
    let config = ApiConfig::new().with_env_overrides();
    config.validate()?;
    println!(
        "  {} {}://{}{}",
        "API".bold(),
        if config.uses_tls() { "https" } else { "http" },
        config.address(),
        config.normalized_base_path()
    );
    println!();

    let manager = Manager::new().with_api(Arc::new(ApiServer::new(config)));
    manager.add_robot(demo::sim_robot()?);
    if let Some(host) = demo::host_robot(Arc::new(HostAdaptor::new()))? {
        manager.add_robot(host);
    }

    let robots = manager.clone();
    manager.add_command("Robots", move |_| {
        let names: Vec<String> = robots.robots().iter().map(|r| r.name().to_string()).collect();
        Ok(Value::from(names))
    });

    info!(robots = manager.robots().len(), "starting manager");
    manager.run_until_signal().await
}

fn print_banner() {
    println!();
    println!("{}", r#"   ___                     __        __ "#.bold().cyan());
    println!("{}", r#"  / _/__ ___________  ___ / /  ___  / /_"#.bold().cyan());
    println!("{}", r#" / _/ -_) __/ __/ _ \/ _ \/ _ \/ _ \/ __/"#.bold().cyan());
    println!("{}", r#"/_/ \__/_/ /_/  \___/_.__/\___/\___/\__/ "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "ferrobot".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Robots, devices and an HTTP API on Tokio");
    println!();
}

//! Capability Gateway - registry, health sweeps and forward proxying

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use capability_gateway::{
    cli::{Cli, Command},
    config::Config,
    labels::{LabelExpression, Labels},
    server::Gateway,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let mut cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command.take() {
        Some(Command::Filter { expression, labels }) => run_filter(&expression, &labels),
        Some(Command::Serve) | None => run_server(cli).await,
    }
}

/// Validate (and optionally evaluate) a label expression
fn run_filter(expression: &str, labels: &[(String, String)]) -> ExitCode {
    let parsed = match LabelExpression::parse(expression) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };

    println!("✅ {parsed}");
    if !labels.is_empty() {
        let labels: Labels = labels.iter().cloned().collect();
        println!("matches: {}", parsed.evaluate(&labels));
    }
    ExitCode::SUCCESS
}

/// Run the gateway server
async fn run_server(cli: Cli) -> ExitCode {
    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(host) = cli.host {
        config.server.host = host;
    }

    let gateway = match Gateway::new(config) {
        Ok(g) => g,
        Err(e) => {
            error!(error = %e, "Failed to create gateway");
            return ExitCode::FAILURE;
        }
    };

    match gateway.run().await {
        Ok(()) => {
            info!("Gateway shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Gateway error");
            ExitCode::FAILURE
        }
    }
}

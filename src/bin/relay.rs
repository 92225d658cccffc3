// EN: src/bin/relay.rs

use anyhow::{Result, anyhow};
use clap::Parser;
use colored::*;
use relay::{
    CancellationToken,
    cli::{Cli, args},
    constants::{DEFAULT_ADDR, DEFAULT_PORT},
    core::{
        logging::{self, ServiceLogger},
        service::Service,
    },
};
use std::sync::Arc;
use tokio::task::JoinSet;

/// The main entry point of the `relay` application.
/// It sets up logging, builds every service up front, runs their listeners
/// concurrently, and performs centralized error handling.
#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init(&cli.output, cli.json) {
        eprintln!("\n{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }

    if let Err(e) = run(cli).await {
        eprintln!("\n{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

/// Builds one `Service` per argument, then serves them all until Ctrl+C.
///
/// Every argument is parsed and every shell resolved before any listener starts,
/// so a typo aborts startup instead of leaving a partial set of services running.
async fn run(cli: Cli) -> Result<()> {
    let logger = ServiceLogger::new();
    log::debug!("CLI args parsed: {:?}", cli);

    let (default_addr, default_port) =
        args::parse_listen_default(&cli.listen, DEFAULT_ADDR, DEFAULT_PORT).map_err(|e| {
            logger.error("invalid argument", &[("arg", &cli.listen), ("error", &e)]);
            anyhow!("invalid default listen address {:?}: {}", cli.listen, e)
        })?;

    let specs = args::plan_services(&cli.services, &default_addr, default_port).map_err(
        |(arg, e)| {
            logger.error("invalid argument", &[("arg", &arg), ("error", &e)]);
            anyhow!("invalid argument {:?}: {}", arg, e)
        },
    )?;

    let exports = args::collect_exports(&cli.exports);

    let mut services = Vec::with_capacity(specs.len());
    for spec in &specs {
        let service = Service::new(&spec.shell, &spec.addr, spec.port, exports.clone(), &logger)
            .map_err(|e| {
                logger.error("failed to create server", &[("error", &e)]);
                anyhow!("failed to create server for '{}': {}", spec.shell, e)
            })?;
        services.push(Arc::new(service));
    }

    // Cancelling this token shuts down every listener and any running scripts.
    let cancellation_token = CancellationToken::new();
    {
        let token = cancellation_token.clone();
        let logger = logger.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    logger.info("shutting down", &[]);
                    token.cancel();
                }
                Err(e) => logger.warn("failed to listen for interrupt", &[("error", &e)]),
            }
        });
    }

    let mut listeners = JoinSet::new();
    for service in services {
        listeners.spawn(service.serve(cancellation_token.clone()));
    }

    let mut failed = false;
    while let Some(joined) = listeners.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            // Already logged with the service's fields by `serve`.
            Ok(Err(_)) => failed = true,
            Err(e) => {
                logger.error("listener task failed", &[("error", &e)]);
                failed = true;
            }
        }
    }

    if failed {
        logger.error("exiting due to error", &[]);
        return Err(anyhow!("one or more services failed"));
    }
    Ok(())
}

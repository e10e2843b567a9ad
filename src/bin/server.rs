use anyhow::Context;
use clap::Parser;
use sensorgate::orchestrator;

#[derive(Debug, Parser)]
#[command(name = "sensorgate", version, author)]
/// Multi-sensor telemetry gateway.
struct Cli {
    /// TCP port to accept sensor connections on.
    port: u16,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    orchestrator::run(cli.port).context("telemetry gateway exited with a fatal error")?;

    Ok(())
}

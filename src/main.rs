use clap::Parser;
use std::process;

use teleflux::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = cli.run().await;
    process::exit(code);
}

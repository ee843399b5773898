// src/main.rs

use depdag::cli::CliArgs;
use depdag::{cli, exit_code, logging, run};

#[tokio::main]
async fn main() {
    let args = cli::parse();
    let command = args.command.clone();

    if let Err(err) = run_main(args).await {
        eprintln!("depdag error: {err:?}");
        std::process::exit(exit_code(&command, &err));
    }
}

async fn run_main(args: CliArgs) -> anyhow::Result<()> {
    logging::init_logging(args.log_level)?;
    run(args).await
}

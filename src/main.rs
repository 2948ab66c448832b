use clap::Parser;
use stratapaint::{cli, logger};

fn main() -> std::process::ExitCode {
    logger::init();
    let args = cli::CliArgs::parse();
    cli::run(args)
}

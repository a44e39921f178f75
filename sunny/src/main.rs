use clap::Parser;
use sunny::cli::*;
use sunny::run_info::*;
use sunny::run_simulate::*;
use sunny::run_train::*;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    match &cli.commands {
        Commands::Train(args) => {
            run_train(args, cli.verbose)?;
        }
        Commands::Simulate(args) => {
            run_simulate(args)?;
        }
        Commands::Info(args) => {
            run_info(args)?;
        }
    }

    Ok(())
}

use anyhow::Result;
use clap::Parser;
use respec::cli::{Cli, Commands, RunArgs};
use respec::{commands, logging};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let ok = match cli.command {
        None => commands::run(cli.path, RunArgs::default()).await?,
        Some(Commands::Run(args)) => {
            let path = args.path.clone();
            commands::run(path, args).await?
        }
        Some(Commands::Status { path }) => commands::status(path).await?,
        Some(Commands::Scan { path }) => commands::scan(path).await?,
        Some(Commands::Estimate { path }) => commands::estimate(path).await?,
        Some(Commands::Cleanup { max_age_days, path }) => {
            commands::cleanup(path, max_age_days).await?
        }
        Some(Commands::Verify { path }) => commands::verify(path).await?,
        Some(Commands::Export { output, path }) => commands::export(path, &output).await?,
        Some(Commands::Preview {
            base,
            new,
            strategy,
        }) => commands::preview(&base, &new, &strategy).await?,
    };

    if !ok {
        std::process::exit(1);
    }

    Ok(())
}

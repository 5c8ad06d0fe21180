mod commands;

use commands::*;
use env_logger::Env;
use quest_launch::config::Config;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse_args();
    if let Commands::ShowConfig = cli.command {
        Config::show();
        return Ok(());
    }

    let config = Config::parse_from_file(&cli.opts.config)?;
    let saga = quest_launch::setup(&config)?;

    match cli.command {
        Commands::Serve { listen } => {
            let listen = listen.unwrap_or_else(|| config.http_listen.clone());
            Cli::serve_cmd(saga, &listen).await
        }
        Commands::Launch { spec } => Cli::launch_cmd(saga, spec).await,
        Commands::Retry { campaign } => Cli::retry_cmd(saga, &campaign).await,
        Commands::Status { key } => Cli::status_cmd(saga, &key).await,
        Commands::ShowConfig => Ok(()),
    }
}

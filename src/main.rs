use clap::Parser;
use colored::Colorize;

use clicktrail::cli::{Cli, Commands};
use clicktrail::config::{get_config, init_config_from};
use clicktrail::runtime::modes;
use clicktrail::system::init_logging;

#[actix_web::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_config_from(&cli.config);

    match cli.command {
        None | Some(Commands::Serve) => {
            let config = get_config();
            let _guard = match init_logging(&config.logging) {
                Ok(guard) => guard,
                Err(e) => {
                    eprintln!("{}", e.format_colored());
                    std::process::exit(1);
                }
            };

            if let Err(e) = modes::run_server().await {
                tracing::error!("Server exited with error: {:#}", e);
                eprintln!("{} {:#}", "Error:".red().bold(), e);
                std::process::exit(1);
            }
        }
        Some(cmd) => {
            if let Err(e) = modes::run_cli(cmd).await {
                eprintln!("{}", e.format_colored());
                std::process::exit(1);
            }
        }
    }
}

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use department_display::{
    cli::{Cli, Command},
    error::{ServiceError, ServiceResult},
    metadata::{PKG_DESCRIPTION, PKG_NAME, PKG_VERSION},
    server,
};

#[tokio::main]
async fn main() -> ServiceResult<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match Cli::parse().command {
        Command::Start(args) => {
            args.validate().map_err(ServiceError::Config)?;
            tracing::info!("Starting {PKG_NAME} {PKG_VERSION}");
            server::start_server(args).await
        }
        Command::Status(args) => {
            println!("{} {}\n", PKG_NAME.bold(), PKG_VERSION);
            println!("{}", args.describe());
            match args.validate() {
                Ok(()) => println!("\n{}", "configuration ok".green()),
                Err(err) => println!("\n{} {err}", "configuration error:".red()),
            }
            Ok(())
        }
        Command::Version => {
            println!("{PKG_NAME} {PKG_VERSION}\n{PKG_DESCRIPTION}");
            Ok(())
        }
    }
}

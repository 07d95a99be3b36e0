//! Listing connector binary entry point.

use listing_connector::cli::{commands, Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "listing_connector=info".into()),
        )
        .init();

    let result = match cli.command {
        Commands::Serve(args) => {
            let source = commands::config_source(cli.data_dir, args.host, args.port);
            commands::handle_serve(source).await
        }
        Commands::Status => {
            let source = commands::config_source(cli.data_dir, None, None);
            commands::handle_status(source.as_ref())
        }
        Commands::Disconnect(args) => {
            let source = commands::config_source(cli.data_dir, None, None);
            commands::handle_disconnect(source.as_ref(), &args.provider)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use transit_live::eta::RouteCatalog;
use transit_live::web::{run_server, Config};

#[derive(Parser)]
#[command(name = "transit-live")]
#[command(about = "Live fleet location and ETA service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve {
        #[arg(short, long, default_value = "config.yaml")]
        config: String,
    },
    /// Validate a route data file
    CheckRoutes { routes: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => serve(&config).await,
        Commands::CheckRoutes { routes } => check_routes(&routes),
    }
}

async fn serve(path: &str) -> ExitCode {
    let config = match Config::load(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config {}: {}", path, e);
            return ExitCode::FAILURE;
        }
    };

    match run_server(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn check_routes(path: &str) -> ExitCode {
    let catalog = match RouteCatalog::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Invalid route file: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("Route file is valid ({} routes)", catalog.len());
    for route in catalog.routes() {
        println!(
            "  {}: {} ({} stops, {:.1} km, {} vehicles)",
            route.id,
            route.name,
            route.stops.len(),
            route.length_m() / 1000.0,
            route.vehicles.len()
        );
    }
    ExitCode::SUCCESS
}

use anyhow::Result;
use clap::{Parser, Subcommand};
use dietly_core::{AppError, Config};
use dietly_location::geo;
use dietly_location::{service_from_config, LocationError, LocationRequest, LocationSnapshot};

#[derive(Parser)]
#[command(name = "dietly")]
#[command(about = "Find where you are and what's good to eat nearby")]
#[command(version)]
struct Cli {
    /// Also search for restaurants around the position
    #[arg(long, global = true)]
    nearby: bool,

    /// Ignore the cached location
    #[arg(long, global = true)]
    no_cache: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Default)]
enum Commands {
    /// Print the current location (default)
    #[default]
    Locate,

    /// Drop the cached location and locate again
    Refresh,

    /// Forget the cached location
    Clear,

    /// Show the platform location permission
    Permission,
}

#[tokio::main]
async fn main() -> Result<()> {
    dietly_core::init()?;
    let cli = Cli::parse();

    let (config, _) = Config::load_validated()?;
    let service = service_from_config(&config).map_err(AppError::from)?;

    let mut request = LocationRequest::from(&config.location);
    if cli.nearby {
        request.fetch_nearby_places = true;
    }
    if cli.no_cache {
        request.enable_cache = false;
    }

    match cli.command.unwrap_or_default() {
        Commands::Locate => report(service.request_location(&request).await),
        Commands::Refresh => report(service.refresh_location(&request).await),
        Commands::Clear => {
            service.clear_cache();
            println!("Cleared cached location for {}", service.cache_key().as_str());
            Ok(())
        }
        Commands::Permission => {
            let permission = service.check_permission().await;
            println!("{}", serde_json::to_string(&permission)?);
            Ok(())
        }
    }
}

fn report(result: Result<LocationSnapshot, LocationError>) -> Result<()> {
    match result {
        Ok(snapshot) => {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            eprintln!("{}", snapshot.user_notice());
            if let Some(places) = &snapshot.nearby_places {
                let view = geo::map_view(snapshot.position, places);
                eprintln!("Map: centre {} zoom {}", view.center, view.zoom);
                for place in places {
                    let direction = place
                        .position
                        .map(|pos| geo::compass_point(geo::bearing_degrees(snapshot.position, pos)))
                        .unwrap_or_default();
                    eprintln!(
                        "  {} ({}) {} {}",
                        place.name,
                        place.category,
                        geo::format_distance(f64::from(place.distance_meters)),
                        direction
                    );
                }
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", e.user_message());
            Err(AppError::from(e).into())
        }
    }
}

use clap::{Parser, Subcommand};
use flexi_logger::{Logger, LoggerHandle};
use routepin::location::{
    extract_cid, extract_match, google_geocoder, place_url, Coordinate, LinkResolver, LocationError, PlaceId,
};
use routepin::{server, shortlink, Config};
use serde::Serialize;
use serde_json::json;
use std::time::Duration;

/// Routepin: map link resolver
///
/// Turns Google Maps links (short, shared, embedded, CID) into coordinates,
/// and encodes coordinates as compact share tokens.
///
/// Examples:
///   routepin resolve https://maps.app.goo.gl/AbCdEf
///   routepin extract "https://www.google.com/maps/place/X/data=!3d41.01!4d28.98"
///   routepin encode 41.01 28.98
///   routepin decode NDEuMDEsMjguOTg
///   routepin place-url --lat -33.8688 --lng 151.2093
///   routepin serve --port 3000
#[derive(Parser)]
#[command(name = "routepin", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Google Maps Platform key. Needed for place-url and geocoding.
    #[arg(long, global = true, env = "GOOGLE_MAPS_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Per-request network timeout in seconds.
    #[arg(long, global = true, default_value_t = 5)]
    timeout: u64,

    /// Log filter, e.g. "info" or "routepin=debug".
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve a map link to coordinates.
    Resolve {
        url: String,
        /// Fall back to geocoding place ids and addresses.
        #[arg(long)]
        geocode: bool,
        /// Never answer with the map viewport center.
        #[arg(long)]
        pinned_only: bool,
    },
    /// Pattern-match coordinates in a URL or markup, offline.
    Extract { text: String },
    /// Print the decimal CID carried by a link.
    Cid { url: String },
    /// Encode coordinates as a share token.
    Encode {
        #[arg(allow_hyphen_values = true)]
        lat: f64,
        #[arg(allow_hyphen_values = true)]
        lng: f64,
    },
    /// Decode a share token.
    Decode { token: String },
    /// Follow a short link and print where it lands.
    Unshorten { url: String },
    /// Canonical Maps URL by place id or nearest to a coordinate.
    PlaceUrl {
        #[arg(long, conflicts_with_all = ["lat", "lng"])]
        place_id: Option<String>,
        #[arg(long, allow_hyphen_values = true, requires = "lng")]
        lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true, requires = "lat")]
        lng: Option<f64>,
    },
    /// Run the HTTP API.
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 3000)]
        port: u16,
    },
}

fn main() {
    let cli = Cli::parse();
    let _logger = init_logging(&cli.log_level);

    // Older deployments only set the bundler-prefixed name.
    let api_key = cli
        .api_key
        .or_else(|| std::env::var("VITE_GOOGLE_MAPS_API_KEY").ok());
    let config = Config::default()
        .with_api_key(api_key)
        .with_timeout(Duration::from_secs(cli.timeout.max(1)));

    if let Err(e) = run(cli.command, config) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(spec: &str) -> Option<LoggerHandle> {
    match Logger::try_with_env_or_str(spec).and_then(|logger| {
        logger
            .log_to_stderr()
            .format_for_stderr(flexi_logger::detailed_format)
            .start()
    }) {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("Warning: logging disabled: {}", e);
            None
        }
    }
}

fn run(command: Command, config: Config) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Resolve { url, geocode, pinned_only } => {
            let config = config.with_geocoding(geocode).with_viewport_center(!pinned_only);
            let resolver = LinkResolver::from_config(&config, google_geocoder(&config));
            print_json(&resolver.resolve(&url)?)
        }
        Command::Extract { text } => match extract_match(&text) {
            Some(m) => print_json(&m),
            None => Err(LocationError::NotFound("No coordinates in input".into()).into()),
        },
        Command::Cid { url } => {
            let cid = extract_cid(&url).ok_or_else(|| LocationError::NotFound("No cid in link".into()))?;
            print_json(&json!({ "cid": cid }))
        }
        Command::Encode { lat, lng } => {
            let coord = Coordinate::new(lat, lng).ok_or_else(|| {
                LocationError::InvalidInput("Invalid coordinates. Lat: -90..90, Lng: -180..180".into())
            })?;
            let token = shortlink::encode(&coord);
            print_json(&json!({
                "path": shortlink::share_path(&token),
                "map_url": shortlink::map_url(&coord),
                "token": token,
            }))
        }
        Command::Decode { token } => {
            let coord = shortlink::decode(&token)
                .ok_or_else(|| LocationError::InvalidInput("Invalid coords in token".into()))?;
            print_json(&json!({ "coords": coord, "map_url": shortlink::map_url(&coord) }))
        }
        Command::Unshorten { url } => {
            let resolver = LinkResolver::from_config(&config, None);
            let final_url = resolver.follower().unshorten(&url)?;
            print_json(&json!({ "finalUrl": final_url }))
        }
        Command::PlaceUrl { place_id, lat, lng } => {
            let geocoder = google_geocoder(&config).ok_or(LocationError::MissingApiKey)?;
            let coords = match (lat, lng) {
                (Some(lat), Some(lng)) => Some(Coordinate::new(lat, lng).ok_or_else(|| {
                    LocationError::InvalidInput("Invalid coordinates. Lat: -90..90, Lng: -180..180".into())
                })?),
                _ => None,
            };
            let found = place_url(geocoder.as_ref(), place_id.and_then(PlaceId::new), coords)?;
            print_json(&found)
        }
        Command::Serve { host, port } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(server::start(&config, &host, port))?;
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

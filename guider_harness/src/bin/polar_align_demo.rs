use chrono::NaiveDate;
use clap::Parser;
use guider_harness::StarField;
use polefinder::{PoleMovement, StarCatalogMatcher};
use shared::Timestamp;

/// Command line arguments for the polar alignment demo
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Plate-solve a simulated polar-scope view",
    long_about = "Builds a synthetic view of the stars around Polaris, solves it and \
        prints where the true celestial pole sits in the image for the given date."
)]
struct Args {
    #[arg(long, default_value_t = 37.0, allow_hyphen_values = true, help = "Field rotation (deg)")]
    rotation: f64,

    #[arg(long, default_value_t = 1296.0, help = "Polaris X position (px)")]
    pole_x: f64,

    #[arg(long, default_value_t = 972.0, help = "Polaris Y position (px)")]
    pole_y: f64,

    #[arg(
        long,
        default_value_t = 0.3,
        help = "Centroid noise (px)",
        long_help = "Random per-star centroid error. Above a few pixels the distance \
            tolerance of the matcher is exceeded and solving fails."
    )]
    jitter: f64,

    #[arg(
        long,
        default_value = "2025-01-01",
        help = "Observation date (YYYY-MM-DD)",
        long_help = "Date used to precess Polaris' coordinates before locating the pole."
    )]
    date: String,

    #[arg(
        long,
        default_value_t = 0.0,
        help = "Seconds after the solve to predict the pole for"
    )]
    elapsed: f64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let date = NaiveDate::parse_from_str(&args.date, "%Y-%m-%d")?;
    let mut field = StarField::polar((args.pole_x, args.pole_y), args.rotation, 2592.0, 1944.0)
        .with_jitter(args.jitter);
    let detection = field.render((0.0, 0.0), Timestamp::ZERO);
    println!("Detected {} stars", detection.stars.len());

    let solution = StarCatalogMatcher::default().solve(&detection.stars, detection.timestamp);
    if !solution.solved {
        println!("No solution");
        return Ok(());
    }

    println!(
        "Solved with {} matches: {}",
        solution.match_count,
        solution.matched_names.join(", ")
    );
    println!("Field rotation: {:.2} deg", solution.rotation_deg);

    let polaris = PoleMovement::new().for_date(date);
    println!("Polaris on {date}: RA {:.4} h, Dec {:.4} deg", polaris.0, polaris.1);

    let at = Timestamp::from_millis((args.elapsed.max(0.0) * 1000.0) as u64);
    if let Some((x, y)) = solution.pole_coords(polaris, at) {
        println!("Celestial pole at ({x:.1}, {y:.1}) px");
    }
    Ok(())
}

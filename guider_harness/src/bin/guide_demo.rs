use clap::Parser;
use guider::{GuideState, IntervalometerCommand};
use guider_harness::{GuideSession, MountModel, SessionConfig};
use shared::{GuiderConfig, MountAxis};

/// Command line arguments for the guiding demo
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Closed-loop autoguiding on a simulated mount",
    long_about = "Runs the guidance controller against a simulated mount and star field.\n\n\
        The session selects the brightest star, calibrates both axes, then guides \
        for the requested number of frames while the mount drifts. Useful for:\n  \
        - Checking calibration against a known mount geometry\n  \
        - Tuning deadband and backlash settings\n  \
        - Watching dither sequences settle"
)]
struct Args {
    #[arg(
        short,
        long,
        default_value_t = 60,
        help = "Number of guiding frames",
        long_help = "Frames to run after calibration. Each frame is one guide camera \
            exposure of --shutter milliseconds plus any mount settle time."
    )]
    frames: usize,

    #[arg(long, default_value_t = 1000, help = "Guide camera exposure (ms)")]
    shutter: i64,

    #[arg(long, default_value_t = 12, help = "Stars in the synthetic field")]
    stars: usize,

    #[arg(long, default_value_t = 7, help = "Random seed for field and dithering")]
    seed: u64,

    #[arg(
        long,
        default_value_t = 20.0,
        help = "Field direction of a positive RA pulse (deg)"
    )]
    ra_angle: f64,

    #[arg(
        long,
        default_value_t = 0.3,
        help = "Mount drift along image X (px/s)",
        long_help = "Tracking error of the simulated mount along the image X axis, in \
            pixels per second. Guiding has to cancel this."
    )]
    drift_x: f64,

    #[arg(long, default_value_t = -0.1, allow_hyphen_values = true, help = "Mount drift along image Y (px/s)")]
    drift_y: f64,

    #[arg(
        long,
        default_value_t = 150.0,
        help = "Gear slack per axis (ms of pulse)",
        long_help = "Pulse lost after each direction reversal. Pair with --backlash-hyster \
            to see the compensator at work."
    )]
    backlash: f64,

    #[arg(long, default_value_t = 0, help = "Backlash compensator hysteresis (ms)")]
    backlash_hyster: i64,

    #[arg(long, help = "Run the intervalometer in dither mode")]
    dither: bool,

    #[arg(short, long, help = "Print every frame")]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    println!("Autoguider Demo");
    println!("===============");
    println!("Frames: {}", args.frames);
    println!("Drift: ({:.2}, {:.2}) px/s", args.drift_x, args.drift_y);

    let guider = GuiderConfig {
        shutter: args.shutter,
        backlash_hyster: args.backlash_hyster,
        intervalometer_bulb_time: 10.0,
        ..Default::default()
    };
    let mount = MountModel {
        ra_angle_deg: args.ra_angle,
        dec_angle_deg: args.ra_angle + 90.0,
        backlash_ms: args.backlash,
        drift_px_per_s: (args.drift_x, args.drift_y),
        ..Default::default()
    };
    let config = SessionConfig {
        guider,
        mount,
        star_count: args.stars,
        seed: args.seed,
        ..Default::default()
    };

    let mut session = GuideSession::new(config)?;
    session.calibrate_and_guide()?;

    for axis in MountAxis::ALL {
        match session.controller().calibration(axis) {
            Some(cal) => println!(
                "{axis} calibration: angle {:.1} deg, {:.1} ms/px",
                cal.angle_deg, cal.ms_per_pixel
            ),
            None => println!("{axis} calibration: failed"),
        }
    }

    if args.dither {
        session
            .controller_mut()
            .intervalometer_cmd(IntervalometerCommand::ActivateDither)?;
    }

    let reports = session.run_frames(args.frames);
    let mut sum_sq = 0.0;
    let mut samples = 0usize;
    let mut dither_frames = 0usize;
    for (i, report) in reports.iter().enumerate() {
        if report.state == GuideState::Dither {
            dither_frames += 1;
        } else if let Some(err) = report.error_px {
            sum_sq += err * err;
            samples += 1;
        }
        if args.verbose {
            println!(
                "  frame {:3} t={} {:?} pulse=({}, {}) error={}",
                i + 1,
                report.timestamp,
                report.state,
                report.pulse.ra_ms,
                report.pulse.dec_ms,
                report
                    .error_px
                    .map(|e| format!("{e:.2}px"))
                    .unwrap_or_else(|| "-".to_string())
            );
        }
    }

    println!("\nFinal state: {:?}", session.controller().state());
    if samples > 0 {
        println!("RMS guiding error: {:.3} px", (sum_sq / samples as f64).sqrt());
    }
    if args.dither {
        println!("Frames spent dithering: {dither_frames}");
    }
    println!("Moves issued: {}", session.mount().move_count());

    if args.verbose {
        println!("\nLog:");
        for entry in session.controller().logbook().messages() {
            println!("  [{}] {}", entry.timestamp, entry.message);
        }
    }
    Ok(())
}

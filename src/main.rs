//! Commandline front end: load stacks and point sets into a session and
//! write one PNG per projection axis.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use triview::{AtlasConfig, AtlasPlugin, Orientation, Preferences, Session};

#[derive(Parser, Debug)]
#[command(author, about, version, long_about)]
struct Args {
    /// Image stacks to load (.tif, .tiff, .mhd, .nrrd, .nrd)
    #[arg(required_unless_present = "atlas")]
    stacks: Vec<PathBuf>,

    /// Point files to overlay (.csv, .pts, .txt)
    #[arg(short, long)]
    points: Vec<PathBuf>,

    /// Line series files (`series,z,x,y` rows) to overlay
    #[arg(short, long)]
    lines: Vec<PathBuf>,

    /// Directory the axis images are written to
    #[arg(short, long, default_value = "./")]
    output: PathBuf,

    /// Slice to show on each axis as AXIAL,CORONAL,SAGITTAL; defaults to the
    /// middle slices
    #[arg(short, long, value_delimiter = ',', num_args = 3)]
    slices: Option<Vec<i64>>,

    /// Display window applied to the last loaded stack
    #[arg(long, value_delimiter = ',', num_args = 2)]
    range: Option<Vec<f64>>,

    /// Preferences file; created with defaults if missing
    #[arg(long)]
    preferences: Option<PathBuf>,

    /// Atlas plugin preferences; starts the atlas plugin
    #[arg(long)]
    atlas: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); overrides preferences
    #[arg(long)]
    log_level: Option<log::LevelFilter>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let prefs_path = args.preferences.clone().or_else(Preferences::default_path);
    let preferences = match &prefs_path {
        Some(path) => match Preferences::load_or_bootstrap(path) {
            Ok(preferences) => preferences,
            Err(e) => {
                eprintln!("Failed to read preferences {path:?}: {e}; using defaults");
                Preferences::default()
            }
        },
        None => Preferences::default(),
    };

    let level = args
        .log_level
        .unwrap_or_else(|| preferences.log_level.to_level_filter());
    env_logger::Builder::new().filter_level(level).init();

    match run(&args, preferences) {
        Ok(session) => {
            if let Some(path) = prefs_path {
                if let Err(e) = session.preferences().save(&path) {
                    log::warn!("Failed to save preferences to {path:?}: {e}");
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args, preferences: Preferences) -> Result<Session, Box<dyn std::error::Error>> {
    let mut session = Session::new(preferences);

    if let Some(path) = &args.atlas {
        let config = AtlasConfig::load_or_bootstrap(path)?;
        session.register_plugin(Box::new(AtlasPlugin::new(config)));
        session.start_plugin(AtlasPlugin::NAME)?;
    }
    for stack in &args.stacks {
        session.load_image_stack(stack)?;
    }
    for points in &args.points {
        session.load_points(points)?;
    }
    for lines in &args.lines {
        session.load_line_series(lines)?;
    }

    if let Some(range) = &args.range {
        if let Some(name) = session.stack_names().pop() {
            session.select_stack(&name)?;
        }
        session.set_intensity_range(range[0], range[1])?;
    }
    if let Some(slices) = &args.slices {
        for (orientation, slice) in Orientation::ALL.into_iter().zip(slices) {
            session.set_slice(orientation, *slice);
        }
    }

    std::fs::create_dir_all(&args.output)?;
    for orientation in Orientation::ALL {
        let axis = session.axis(orientation);
        let Some(image) = axis.rasterise() else {
            log::warn!("Nothing to draw on the {orientation} axis");
            continue;
        };
        let path = args.output.join(format!(
            "{orientation}_{:03}.png",
            axis.current_slice().unwrap_or(0)
        ));
        image.save(&path)?;
        log::info!("Wrote {path:?}");
    }

    session.shutdown();
    Ok(session)
}

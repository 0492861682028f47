//! weaving_analyzer - exercise the camera handshake once and print what came back.
//!
//! Opens the rig, triggers BLUE then GREEN back to back, collects both, and
//! prints the telemetry and dimensions of every picture.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use weaving_inspect::capture::write_placeholder_pictures;
use weaving_inspect::{
    CameraPosition, CameraTiming, CaptureSynchronizer, ExposurePair, ExposureRetriever,
    ImageWithMetadata, LightCondition, RandomMetadata,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Run one dual-light capture and print picture metadata")]
struct Args {
    /// Directory holding `<position>_picture_<condition>.<ext>` files.
    #[arg(long, env = "WEAVING_PICTURES_DIR", default_value = "pictures")]
    pictures_dir: PathBuf,

    #[arg(long, default_value = "jpg")]
    extension: String,

    /// Skip the simulated camera boot and bus delays.
    #[arg(long)]
    fast: bool,

    /// Write placeholder pictures first if any are missing.
    #[arg(long)]
    bootstrap: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let retriever = ExposureRetriever::new(
        args.pictures_dir.clone(),
        args.extension.clone(),
        Arc::new(RandomMetadata::new()),
    );
    if args.bootstrap && !retriever.missing_pictures().is_empty() {
        write_placeholder_pictures(&retriever, 640, 480)?;
    }
    let timing = if args.fast {
        CameraTiming::none()
    } else {
        CameraTiming::default()
    };
    let cameras = CaptureSynchronizer::new(retriever, timing);
    println!("Weaving analyzer initialized.");

    println!("Opening cameras.");
    cameras.open_cameras()?;
    println!("Cameras ready!");

    for condition in LightCondition::ALL {
        cameras.select_light_condition(condition)?;
        cameras.trigger()?;
    }
    for condition in LightCondition::ALL {
        let pair = cameras.collect(condition)?;
        print_pair(condition, &pair);
    }
    Ok(())
}

fn print_pair(condition: LightCondition, pair: &ExposurePair) {
    println!("\n*** {} LIGHT ***", condition.name());
    print_picture(CameraPosition::Left, &pair.left);
    print_picture(CameraPosition::Right, &pair.right);
}

fn print_picture(position: CameraPosition, picture: &ImageWithMetadata) {
    let label = match position {
        CameraPosition::Left => "Left",
        CameraPosition::Right => "Right",
    };
    println!("{} picture:", label);
    println!("· iso: {}", picture.iso);
    println!("· exposure time: {} seconds", picture.exposure_time_s);
    println!("· diaphragm opening: {} f-stops", picture.aperture);
    println!(
        "· picture dimensions: {} (w) x {} (h) pixels",
        picture.width(),
        picture.height()
    );
    println!("· # of color channels: {}", picture.channels());
}

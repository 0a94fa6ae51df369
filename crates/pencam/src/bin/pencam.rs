//! pencam CLI: stereo and calibration capture for fish-pen camera rigs.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
#[cfg(not(feature = "tracing"))]
use log::LevelFilter;

use pencam::core::{OpticalInputs, RigConfig, Side, SystemClock};
use pencam::session::{EmulatedCameraSystem, EmulatorParams};
use pencam::{run_calibration, CaptureError, StereoCapture};

#[derive(Parser)]
#[command(name = "pencam")]
#[command(about = "Capture stereo pairs and calibration sweeps from fish-pen camera rigs")]
#[command(version)]
struct Cli {
    /// Log debug messages.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines.
    #[cfg(feature = "tracing")]
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grab frames from the rig cameras and write stereo pairs.
    Stereo {
        /// Rig configuration (JSON).
        #[arg(long)]
        config: PathBuf,

        /// Override `capture.frames_to_grab`.
        #[arg(long)]
        frames: Option<u32>,

        /// Write a JSON summary of the written images.
        #[arg(long)]
        summary: Option<PathBuf>,

        #[command(flatten)]
        emulator: EmulatorArgs,
    },

    /// Run an exposure/gain calibration sweep on the first camera.
    Calibrate {
        /// Rig configuration (JSON) with `base_directory` and `settings_file`.
        #[arg(long)]
        config: PathBuf,

        /// Optical inputs of the batch (JSON).
        #[arg(long)]
        inputs: PathBuf,

        #[command(flatten)]
        emulator: EmulatorArgs,
    },

    /// Validate a rig configuration and print its camera registry.
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
struct EmulatorArgs {
    /// Emulate this many devices with generated serial numbers instead of
    /// the configured ones.
    #[arg(long)]
    emulate: Option<usize>,

    /// Hardware clock advance per emulated frame.
    #[arg(long, default_value = "100")]
    frame_interval_ms: u64,

    /// Make retrievals time out after this many frames.
    #[arg(long)]
    stall_after: Option<u64>,
}

impl EmulatorArgs {
    fn params(&self) -> EmulatorParams {
        EmulatorParams {
            frame_interval_ms: self.frame_interval_ms,
            stall_after: self.stall_after,
            ..EmulatorParams::default()
        }
    }

    /// Configured serials, enclosure by enclosure, left before right.
    fn system(&self, config: &RigConfig) -> EmulatedCameraSystem {
        if let Some(count) = self.emulate {
            return EmulatedCameraSystem::with_device_count(count, self.params());
        }
        let serials: Vec<String> = config
            .enclosures
            .iter()
            .flat_map(|enclosure| {
                Side::BOTH
                    .into_iter()
                    .filter_map(move |side| enclosure.camera(side).ok())
                    .map(|details| details.serial_number.clone())
            })
            .collect();
        let serials = if serials.is_empty() {
            vec!["0815-0000".to_string()]
        } else {
            serials
        };
        EmulatedCameraSystem::new(serials, self.params())
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("an exception occurred: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

fn init_logging(cli: &Cli) {
    #[cfg(feature = "tracing")]
    pencam::core::init_tracing(cli.log_json, if cli.verbose { "debug" } else { "info" });

    #[cfg(not(feature = "tracing"))]
    {
        let level = if cli.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        };
        if let Err(err) = pencam::core::init_with_level(level) {
            eprintln!("failed to install logger: {err}");
        }
    }
}

fn run(command: Commands) -> Result<(), CaptureError> {
    match command {
        Commands::Stereo {
            config,
            frames,
            summary,
            emulator,
        } => {
            let mut config = RigConfig::load_json(&config)?;
            if let Some(frames) = frames {
                config.capture.frames_to_grab = frames;
            }
            let mut capture = StereoCapture::new(&config)?;
            let mut system = emulator.system(&config);
            let result = capture.run(&mut system, &SystemClock)?;
            if let Some(path) = summary {
                result.write_json(&path)?;
            }
        }
        Commands::Calibrate {
            config,
            inputs,
            emulator,
        } => {
            let config = RigConfig::load_json(&config)?;
            let inputs = OpticalInputs::load_json(&inputs)?;
            let mut system = emulator.system(&config);
            let result = run_calibration(&mut system, &config, &inputs)?;
            println!("{}", result.data_dir.display());
        }
        Commands::CheckConfig { config } => {
            let config = RigConfig::load_json(&config)?;
            let registry = pencam::core::CameraRegistry::from_config(&config)?;
            let json = serde_json::to_string_pretty(&registry)
                .map_err(pencam::core::ConfigError::from)?;
            println!("{json}");
        }
    }
    Ok(())
}

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use mpo3d_image::PatternKind;
use mpo3d_pipeline::{Observer, ReconstructionConfig, Reconstructor, StateView};
use serde::Serialize;

/// Stereo reconstruction from multi-picture (MPO) files.
#[derive(Debug, Parser)]
#[command(author, version, about = "Reconstruct and calibrate from MPO stereo files")]
struct Args {
    /// Optional path to a JSON ReconstructionConfig. Defaults are used if omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Decode a container and reconstruct it with the stored calibration.
    Open {
        file: PathBuf,
        /// Write the mesh as ASCII PLY.
        #[arg(long)]
        mesh_out: Option<PathBuf>,
        /// Write the display image as PNG.
        #[arg(long)]
        image_out: Option<PathBuf>,
    },
    /// Calibrate the stereo camera from containers showing a planar target.
    Calibrate {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long, value_enum, default_value_t = Pattern::Chessboard)]
        pattern: Pattern,
        /// Pattern rows (inner corners or circle centres).
        #[arg(long)]
        rows: usize,
        #[arg(long)]
        cols: usize,
        /// Distance between neighbouring pattern points.
        #[arg(long)]
        spacing: f64,
        /// Write the annotated samples as PNG.
        #[arg(long)]
        image_out: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Pattern {
    Chessboard,
    CircleGrid,
}

impl From<Pattern> for PatternKind {
    fn from(p: Pattern) -> Self {
        match p {
            Pattern::Chessboard => PatternKind::Chessboard,
            Pattern::CircleGrid => PatternKind::CircleGrid,
        }
    }
}

/// Writes the orchestrator state to disk on every notification.
#[derive(Debug, Default)]
struct Exporter {
    mesh_out: Option<PathBuf>,
    image_out: Option<PathBuf>,
    failure: Mutex<Option<anyhow::Error>>,
}

impl Exporter {
    fn export(&self, state: &StateView<'_>) -> Result<()> {
        if let (Some(path), Some(image)) = (&self.image_out, state.image()) {
            image
                .to_rgb_image()?
                .save(path)
                .with_context(|| format!("failed to write {}", path.display()))?;
            log::info!("wrote {}", path.display());
        }
        if let (Some(path), Some(mesh)) = (&self.mesh_out, state.mesh()) {
            mesh.write_ply(path)?;
            log::info!("wrote {}", path.display());
        }
        Ok(())
    }

    fn take_failure(&self) -> Option<anyhow::Error> {
        self.failure.lock().ok().and_then(|mut f| f.take())
    }
}

impl Observer for Exporter {
    fn update(&self, state: &StateView<'_>) {
        if let Err(e) = self.export(state) {
            log::error!("{e:#}");
            if let Ok(mut slot) = self.failure.lock() {
                slot.get_or_insert(e);
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct OpenSummary {
    image_size: Option<(usize, usize)>,
    vertices: Option<usize>,
    faces: Option<usize>,
}

#[derive(Debug, Serialize)]
struct CalibrationSummary {
    left_rms: f64,
    right_rms: f64,
    stereo_rms: f64,
    baseline: Option<f64>,
}

fn load_config(path: Option<&Path>) -> Result<ReconstructionConfig> {
    let Some(path) = path else {
        return Ok(ReconstructionConfig::default());
    };
    let data =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("invalid config {}", path.display()))
}

fn run(args: Args) -> Result<String> {
    let config = load_config(args.config.as_deref())?;
    let mut app = Reconstructor::new(config);

    match args.command {
        Command::Open {
            file,
            mesh_out,
            image_out,
        } => {
            let exporter = Arc::new(Exporter {
                mesh_out,
                image_out,
                ..Exporter::default()
            });
            app.attach(exporter.clone());
            app.open(&file)
                .with_context(|| format!("failed to open {}", file.display()))?;
            if let Some(e) = exporter.take_failure() {
                return Err(e);
            }
            let summary = OpenSummary {
                image_size: app.image().map(|i| (i.width(), i.height())),
                vertices: app.mesh().map(|m| m.vertices().len()),
                faces: app.mesh().map(|m| m.num_faces()),
            };
            Ok(serde_json::to_string_pretty(&summary)?)
        }
        Command::Calibrate {
            files,
            pattern,
            rows,
            cols,
            spacing,
            image_out,
        } => {
            let exporter = Arc::new(Exporter {
                image_out,
                ..Exporter::default()
            });
            app.attach(exporter.clone());
            let report = app
                .calibrate(&files, pattern.into(), rows, cols, spacing)
                .context("calibration failed")?;
            if let Some(e) = exporter.take_failure() {
                return Err(e);
            }
            let summary = CalibrationSummary {
                left_rms: report.left_rms,
                right_rms: report.right_rms,
                stereo_rms: report.stereo_rms,
                baseline: app.camera().parameters().map(|p| p.translation.norm()),
            };
            Ok(serde_json::to_string_pretty(&summary)?)
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let args = Args::parse();
    let json = run(args)?;
    println!("{json}");
    Ok(())
}

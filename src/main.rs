use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, Level};

use mask_compositor::compositor::FfmpegWriter;
use mask_compositor::config::Config;
use mask_compositor::project::Project;

#[derive(Parser)]
#[command(name = "mask-compositor")]
#[command(about = "Frame-accurate multi-layer video compositing with mask-driven effects")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a project to a video file
    Render {
        /// Project JSON file
        project: PathBuf,

        /// Output video path
        #[arg(short, long, default_value = "output.mp4")]
        output: PathBuf,

        /// Tool configuration TOML file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Check a project file without rendering
    Validate {
        /// Project JSON file
        project: PathBuf,
    },

    /// Write a default configuration file
    InitConfig {
        /// Where to write it
        #[arg(default_value = "mask-compositor.toml")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string())),
        )
        .init();

    match cli.command {
        Commands::Render {
            project,
            output,
            config,
        } => {
            let config = match config {
                Some(path) => Config::from_file(&path)
                    .with_context(|| format!("loading config {}", path.display()))?,
                None => Config::default(),
            };

            let project = Project::from_file(&project)
                .with_context(|| format!("loading project {}", project.display()))?;

            let (mut compositor, mut pipeline) =
                project.build(config.effects.enable_transparency)?;
            compositor.set_progress_interval(config.output.progress_interval);

            let output_display = output.display().to_string();
            // The render loop is synchronous and pixel-heavy; keep it off
            // the async runtime
            tokio::task::spawn_blocking(move || {
                let mut writer =
                    FfmpegWriter::with_options(&output, &config.output.codec, config.output.quality);
                let mut report = |pct: f64| info!("Progress: {:.1}%", pct);
                compositor.render(&mut writer, &mut pipeline, Some(&mut report))
            })
            .await
            .context("render task panicked")??;

            info!("Wrote {}", output_display);
        }

        Commands::Validate { project } => {
            let loaded = Project::from_file(&project)
                .with_context(|| format!("loading project {}", project.display()))?;
            info!(
                "Project OK: {} layers, {}x{} output",
                loaded.layers.len(),
                loaded.output.width,
                loaded.output.height
            );
        }

        Commands::InitConfig { path } => {
            Config::default().save_to_file(&path)?;
            info!("Wrote default configuration to {}", path.display());
        }
    }

    Ok(())
}

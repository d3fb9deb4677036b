mod replay;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use vkguard_core::LayerSettings;

#[derive(Parser)]
#[command(name = "vkguard")]
#[command(about = "vkguard - Vulkan validation layers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded call trace through the validation layers
    Replay {
        /// Trace file (JSON array of recorded calls)
        trace: PathBuf,

        /// Settings file (defaults to the settings search path)
        #[arg(short, long)]
        settings: Option<PathBuf>,

        /// Components to disable, comma separated (e.g. "thread_safety,shaders")
        #[arg(short, long)]
        disable: Option<String>,

        /// Print diagnostics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the effective layer settings
    Settings {
        /// Print the settings file in use instead of its contents
        #[arg(long)]
        path: bool,
    },
}

fn main() -> anyhow::Result<()> {
    vkguard_common::init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            trace,
            settings,
            disable,
            json,
        } => {
            let mut layer_settings = match settings {
                Some(path) => LayerSettings::load(&path)?,
                None => LayerSettings::from_environment(),
            };
            if let Some(list) = disable {
                layer_settings.apply_disable_list(&list);
            }

            info!("replaying {}", trace.display());
            let outcome = replay::run_replay(&trace, layer_settings)?;
            if json {
                replay::print_json(&outcome)?;
            } else {
                replay::print_pretty(&outcome);
            }

            let errors = outcome.error_count();
            if errors > 0 {
                anyhow::bail!("{} validation error(s) reported", errors);
            }
        }

        Commands::Settings { path } => {
            if path {
                match vkguard_common::platform::find_settings_file() {
                    Some(path) => println!("{}", path.display()),
                    None => println!("(none, using defaults)"),
                }
            } else {
                print!("{}", LayerSettings::from_environment().to_toml()?);
            }
        }
    }

    Ok(())
}

use clap::{Parser, Subcommand};
use enfasten::config::{self, SitePaths};
use enfasten::imaging::RustBackend;
use enfasten::{output, pipeline};
use std::path::PathBuf;

/// Shared flags for commands that process images.
#[derive(clap::Args, Clone)]
struct CacheArgs {
    /// Ignore the manifest and re-encode every image, overwriting outputs
    #[arg(long)]
    no_cache: bool,
}

#[derive(Parser)]
#[command(name = "enfasten")]
#[command(about = "Responsive images for static sites")]
#[command(long_about = "\
Responsive images for static sites

Reads a generated site, downsamples every PNG and JPEG to the configured
widths, and writes a copy of the site whose <img> tags carry srcset.

  _site/                           # input_folder (your generator's output)
  ├── index.html                   # <img src=\"/img/sunset.jpg\">
  └── img/sunset.jpg
  _fastsite/                       # output_folder (publish this)
  ├── index.html                   # <img src=\"/assets/images/sunset-9f86d081-original.jpg\" srcset=...>
  ├── img/sunset.jpg
  └── assets/images/               # image_folder
      ├── sunset-9f86d081-original.jpg
      └── sunset-9f86d081-800px.jpg
  enfasten_manifest.json           # build cache, keep it between runs

Images are named by content hash, so unchanged images are never re-encoded.
Anything in the output folder that the current build didn't write is deleted.

Run 'enfasten gen-config' to generate a documented enfasten.toml.")]
#[command(version)]
struct Cli {
    /// Directory containing enfasten.toml; folders in it are relative to this
    #[arg(long, default_value = ".", global = true)]
    basepath: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build images, rewrite HTML and prune the output folder
    Build(CacheArgs),
    /// Show which images are cached and which would be built
    Check,
    /// Print a stock enfasten.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Build(cache_args) => {
            let site_config = config::load_config(&cli.basepath)?;
            let paths = SitePaths::resolve(&cli.basepath, &site_config)?;
            init_thread_pool(&site_config.processing);

            println!(
                "==> Building {} \u{2192} {}",
                paths.input.display(),
                paths.output.display()
            );
            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_process_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let result = pipeline::run(
                &RustBackend::new(),
                &site_config,
                &paths,
                pipeline::BuildOptions {
                    use_cache: !cache_args.no_cache,
                },
                Some(&tx),
            );
            drop(tx);
            printer.join().ok();
            let report = result?;
            output::print_build_report(&report, &paths.output);
            println!("==> Build complete: {}", paths.output.display());
        }
        Command::Check => {
            let site_config = config::load_config(&cli.basepath)?;
            let paths = SitePaths::resolve(&cli.basepath, &site_config)?;
            init_thread_pool(&site_config.processing);

            println!("==> Checking {}", paths.input.display());
            let entries = pipeline::check(&site_config, &paths)?;
            output::print_check_output(&entries);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores. The user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

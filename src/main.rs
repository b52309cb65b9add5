//! Gallery command line client
//!
//! A thin presentation layer over the gallery client library:
//! - Lists and inspects image records
//! - Shows download statistics
//! - Requests download grants and saves images to disk

use anyhow::Context;
use clap::{Parser, Subcommand};
use gallery_client::config::{self, Config, Environment};
use gallery_client::{
    ApiClient, DownloadAdapter, DownloadStatsAdapter, GalleryError, ImageAdapter, ImagePage,
    ImageRecord, ImagesAdapter, ImagesQuery,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "gallery")]
#[command(about = "Browse and download images from the gallery API")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Catalog environment (overrides config)
    #[arg(long, value_enum)]
    env: Option<Environment>,

    /// Host name the client is served from; loopback names select the local catalog
    #[arg(long, conflicts_with = "env")]
    host: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List one page of images
    List {
        /// Number of records to skip
        #[arg(long, default_value_t = 0)]
        skip: u32,

        /// Page size (default: config page_size)
        #[arg(long)]
        limit: Option<u32>,

        /// Only images with this tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Filter on the featured flag
        #[arg(long)]
        featured: Option<bool>,
    },

    /// Show one image record
    Show { id: String },

    /// Request a download grant without fetching the image
    Grant { id: String },

    /// Download an image and save it
    Download {
        id: String,

        /// Target directory (default: config download_dir)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Show total downloads, or downloads of one image
    Stats { id: Option<String> },

    /// First page of images and total downloads, fetched together
    Overview {
        #[arg(long)]
        limit: Option<u32>,
    },
}

/// Single-threaded runtime; independent requests are joined, never spawned
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(args.verbose);

    let config = Config::load_or_default(&args.config);

    // The origin is fixed here and never re-resolved per request
    let environment = args
        .env
        .or_else(|| args.host.as_deref().map(Environment::from_host))
        .unwrap_or(config.environment);
    let config = config.with_environment(environment);

    tracing::info!(
        "Using {} catalog at {}",
        environment.display_name(),
        config.base_url()
    );

    let api = ApiClient::from_config(&config).context("Invalid catalog URL")?;

    match args.command {
        Command::List {
            skip,
            limit,
            tags,
            featured,
        } => {
            let query = ImagesQuery::page(skip, limit.unwrap_or(config.page_size))
                .with_tags(tags)
                .with_featured(featured);
            let images = ImagesAdapter::mount(api, query).await;
            check(images.error()).context("Failed to fetch images")?;

            if let Some(page) = images.result() {
                print_page(&page, skip);
            }
        }

        Command::Show { id } => {
            let image = ImageAdapter::new(api, id);
            image.refetch().await;
            check(image.error()).context("Failed to fetch image")?;

            if let Some(record) = image.image() {
                print_record(&record);
            }
        }

        Command::Grant { id } => {
            let grant = api.download_image(&id).await?;
            println!("{}", grant.download_url);
            println!("Suggested filename: {}", grant.suggested_filename(&id));
        }

        Command::Download { id, out } => {
            let dir = out.unwrap_or_else(|| config.download_dir.clone());
            let download = DownloadAdapter::new(api, dir);
            download.trigger(&id).await;
            check(download.error()).context("Failed to download image")?;

            if let Some(saved) = download.last_saved() {
                println!(
                    "Saved {} ({})",
                    saved.path.display(),
                    format_size(saved.bytes)
                );
            }
        }

        Command::Stats { id } => {
            let stats = match id {
                Some(id) => DownloadStatsAdapter::for_image(api, id),
                None => DownloadStatsAdapter::global(api),
            };
            stats.refetch().await;
            check(stats.error()).context("Failed to fetch download stats")?;

            println!("Total downloads: {}", stats.total_downloads());
        }

        Command::Overview { limit } => {
            let images = ImagesAdapter::new(
                api.clone(),
                ImagesQuery::page(0, limit.unwrap_or(config.page_size)),
            );
            let stats = DownloadStatsAdapter::global(api);

            tokio::join!(images.refetch(), stats.refetch());

            match stats.error() {
                Some(e) => eprintln!("Total downloads: unavailable ({})", e),
                None => println!("Total downloads: {}", stats.total_downloads()),
            }
            println!();

            check(images.error()).context("Failed to fetch images")?;
            if let Some(page) = images.result() {
                print_page(&page, 0);
            }
        }
    }

    Ok(())
}

/// Initialize tracing/logging
///
/// Default level is "warn" so command output stays clean.
/// Use --verbose flag for "debug" level during troubleshooting.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("gallery={level},gallery_client={level}").into());

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Turn an error held in adapter state into a command failure
fn check(error: Option<Arc<GalleryError>>) -> anyhow::Result<()> {
    match error {
        Some(e) => Err(anyhow::Error::new(e)),
        None => Ok(()),
    }
}

fn print_page(page: &ImagePage, skip: u32) {
    if page.is_empty() {
        println!("No images (total {})", page.total);
        return;
    }

    for image in &page.images {
        println!(
            "{:<26} {:<32} {:>8}  {}{}",
            image.id,
            image.name,
            image.downloads,
            image.tags.join(","),
            if image.is_featured { "  [featured]" } else { "" }
        );
    }

    println!(
        "\nShowing {}-{} of {}{}",
        skip as u64 + 1,
        skip as u64 + page.len() as u64,
        page.total,
        if page.has_more(skip) { " (more available)" } else { "" }
    );
}

fn print_record(image: &ImageRecord) {
    println!("{} ({})", image.name, image.id);
    if !image.description.is_empty() {
        println!("{}", image.description);
    }
    println!();
    println!("Tags:      {}", image.tags.join(", "));
    println!("Featured:  {}", if image.is_featured { "yes" } else { "no" });
    println!("Downloads: {}", image.downloads);
    println!(
        "Size:      {} ({})",
        format_size(image.file_size),
        image.content_type
    );
    println!("Created:   {}", image.created_at.format("%Y-%m-%d %H:%M UTC"));
    if let Some(updated) = image.updated_at {
        println!("Updated:   {}", updated.format("%Y-%m-%d %H:%M UTC"));
    }
    println!("Thumbnail: {}", image.thumbnail_url);
    println!("Full size: {}", image.hd_url);
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_list_filters() {
        let args = Args::try_parse_from([
            "gallery", "--env", "local", "list", "--skip", "12", "--tag", "sky", "--tag", "sky",
            "--featured", "false",
        ])
        .unwrap();

        assert_eq!(args.env, Some(Environment::Local));
        match args.command {
            Command::List {
                skip,
                limit,
                tags,
                featured,
            } => {
                assert_eq!(skip, 12);
                assert_eq!(limit, None);
                assert_eq!(tags, vec!["sky", "sky"]);
                assert_eq!(featured, Some(false));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_env_and_host_conflict() {
        assert!(
            Args::try_parse_from(["gallery", "--env", "local", "--host", "localhost", "stats"])
                .is_err()
        );
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024 + 512 * 1024), "5.5 MB");
    }
}

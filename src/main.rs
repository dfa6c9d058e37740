use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tokio_util::sync::CancellationToken;

use macforge::catalog::{CatalogService, DownloadPolicy, fetch_packages_for_product};
use macforge::channels;
use macforge::client::HttpFetcher;
use macforge::downloader;
use macforge::iso;
use macforge::picker::choose_one;
use macforge::release;

fn catalogs_file_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("resources")
        .join("catalogs.json")
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    channels::init_from_file(catalogs_file_path()).context("load catalog feed table")?;

    let args: Vec<String> = env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("installer") => download_installer().await,
        Some("iso") => build_iso(&args[1..]),
        Some("opencore") => download_opencore(args.get(1).map(String::as_str)).await,
        Some(other) => bail!("unknown command '{other}' (expected 'installer', 'iso' or 'opencore')"),
    }
}

/// Wizard: version -> channel -> candidate product -> download everything.
async fn download_installer() -> Result<()> {
    let mut versions: Vec<String> = channels::all()?
        .iter()
        .map(|feed| feed.version().to_string())
        .collect();
    versions.sort();
    versions.reverse();

    let version = choose_one("Select macOS version", versions)?;
    let feed = channels::by_version(&version)?
        .with_context(|| format!("no catalog feed for macOS {version}"))?;
    let channel = choose_one("Select release channel", feed.channels())?;
    let url = channels::catalog_url(&version, &channel)?;

    let cancel = CancellationToken::new();
    let service = CatalogService::new(HttpFetcher::swupdate(cancel.clone())?);

    let catalog = service
        .load_catalog(url)
        .await
        .with_context(|| format!("fetch catalog for macOS {version} ({channel})"))?;

    let candidates = service
        .find_install_candidates(&catalog, &version)
        .await
        .context("resolve installer candidates")?;
    if candidates.is_empty() {
        bail!("no installer products in the {channel} catalog match macOS {version}");
    }

    let product_id = choose_one("Select installer product", candidates)?;
    let destination = PathBuf::from(&product_id);

    let downloaded = fetch_packages_for_product(
        &catalog,
        &product_id,
        &destination,
        None,
        DownloadPolicy::AbortOnError,
        &cancel,
    )
    .await
    .with_context(|| format!("download packages for product {product_id}"))?;

    println!(
        "Downloaded {} files into {}",
        downloaded.len(),
        destination.display()
    );
    Ok(())
}

/// `macforge iso <source-dir> <volume-label> [boot-file]`
fn build_iso(args: &[String]) -> Result<()> {
    let (Some(source), Some(label)) = (args.first(), args.get(1)) else {
        bail!("usage: macforge iso <source-dir> <volume-label> [boot-file]");
    };
    let boot_file = args
        .get(2)
        .map(String::as_str)
        .unwrap_or(iso::DEFAULT_BOOT_PATH);

    let image = iso::build_bootable_image(Path::new(source), boot_file, label, Path::new("."))
        .context("assemble bootable image")?;
    println!("Wrote {}", image.display());
    Ok(())
}

/// Download an OpenCore release archive into `bootloader/`. Extraction and
/// subsequent image assembly are separate steps.
async fn download_opencore(tag: Option<&str>) -> Result<()> {
    let tag = tag.unwrap_or(release::LATEST);
    let cancel = CancellationToken::new();
    let fetcher = HttpFetcher::new("macforge/0.1", cancel.clone())?;

    let releases = release::fetch_releases(&fetcher, "acidanthera/OpenCorePkg")
        .await
        .context("fetch OpenCore release list")?;
    let resolved = release::resolve(&releases, tag)?;
    let asset_url = resolved.asset_url(Some("RELEASE"))?;

    let destination = Path::new("bootloader");
    downloader::ensure_directory(destination)
        .with_context(|| format!("create {}", destination.display()))?;

    let client = reqwest::Client::builder()
        .timeout(macforge::client::REQUEST_TIMEOUT)
        .build()?;
    let path = downloader::download_file(
        &client,
        "macforge/0.1",
        asset_url,
        0,
        None,
        destination,
        &cancel,
    )
    .await
    .with_context(|| format!("download OpenCore {}", resolved.tag_name))?;

    println!(
        "Downloaded OpenCore {} to {}",
        resolved.tag_name,
        path.display()
    );
    Ok(())
}

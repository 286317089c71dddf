use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;
use unityfs_env::{BundleFile, PathId};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let bundle_path = args
        .next()
        .context("expected bundle path as first argument")?;
    let path_id = args.next().map(|id| id.parse::<PathId>()).transpose()?;

    let bundle = BundleFile::open(&bundle_path)?;
    println!(
        "{} ({}, {} blocks)",
        bundle.name(),
        bundle.header().engine_version,
        bundle.store().blocks().len()
    );

    for asset in bundle.assets() {
        if asset.is_resource() {
            println!("{}: {} bytes of resource data", asset.name(), asset.size());
            continue;
        }
        println!("{}: {} objects", asset.name(), asset.objects()?.len());

        for handle in asset.handles()? {
            if path_id.is_some_and(|id| id != handle.path_id()) {
                continue;
            }
            let value = match handle.value() {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!("Could not decode {}: {e}", handle.path_id());
                    continue;
                }
            };
            println!(
                "{} {}",
                handle.path_id(),
                serde_json::to_string_pretty(&value.to_json())?
            );
        }
    }

    Ok(())
}

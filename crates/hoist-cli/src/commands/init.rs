use std::path::{Path, PathBuf};

use anyhow::bail;
use hoist_core::HoistConfig;
use hoist_core::config::DEFAULT_CONFIG_FILE;

/// Validate a starter config and write it as `dir/hoist.toml`.
///
/// An existing file is left alone.
pub fn write_scaffold(dir: &Path, namespace: &str, image: &str) -> anyhow::Result<PathBuf> {
    let output = dir.join(DEFAULT_CONFIG_FILE);
    if output.exists() {
        bail!("{} already exists", output.display());
    }

    let config = HoistConfig::scaffold(namespace, image);
    config.validate()?;
    std::fs::write(&output, config.to_toml_string()?)?;
    Ok(output)
}

/// Write a starter hoist.toml into `path`.
pub fn init(path: &str, namespace: &str, image: &str) -> anyhow::Result<()> {
    let output = write_scaffold(Path::new(path), namespace, image)?;
    println!("✓ Generated {}", output.display());
    Ok(())
}

//! `reflex config init` — scaffold a run file.

use std::path::Path;

use anyhow::{Context, Result, bail};
use reflex_core::RunConfig;

pub fn init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let toml = RunConfig::default().to_toml_string()?;
    std::fs::write(path, toml).with_context(|| format!("failed to write {}", path.display()))?;
    println!("✓ Generated {}", path.display());
    Ok(())
}

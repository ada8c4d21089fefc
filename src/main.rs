//! peer-compose - rewrite a local docker-compose file for peer deployments
//!
//! This is the main CLI entry point for peer-compose.

use anyhow::Context;
use clap::Parser;
use peer_compose::compose::document::DEFAULT_OUTPUT_FILE;
use peer_compose::compose::{ComposeDocument, PeerTransform};
use peer_compose::config::{GlobalParameters, PeerConfig, DEFAULT_CONFIG_FILE};
use peer_compose::discovery::{CommandResolver, DockerfileResolver, NoDiscovery};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// peer-compose - prepare a compose file for the peer environment
#[derive(Parser)]
#[command(name = "peer-compose")]
#[command(author = "Evoker Industries")]
#[command(version)]
#[command(about = "Rewrites a local docker-compose file for peer deployments", long_about = None)]
struct Cli {
    /// Image that replaces locally built services
    image: String,

    /// Deployment build name, e.g. pr-42-app
    build_name: String,

    /// Account the deployment runs in (defaults to the legacy account)
    #[arg(long)]
    account: Option<String>,

    /// Product the deployment belongs to
    #[arg(long)]
    product: Option<String>,

    /// Compose file to read
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Compose file to write
    #[arg(short, long, default_value = DEFAULT_OUTPUT_FILE)]
    output: PathBuf,

    /// Per-repository configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Dockerfile to read the app's default command from
    #[arg(long)]
    dockerfile: Option<PathBuf>,

    /// Do not look for a default command
    #[arg(long)]
    no_discovery: bool,

    /// Print the result instead of writing it
    #[arg(long)]
    dry_run: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let working_dir = std::env::current_dir()?;

    let config_path = resolve_path(&working_dir, &cli.config);
    let config = PeerConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let compose_file = match cli.file {
        Some(file) => resolve_path(&working_dir, &file),
        None => ComposeDocument::find_compose_file(&working_dir)
            .with_context(|| format!("no compose file in {}", working_dir.display()))?,
    };
    let mut document = ComposeDocument::parse_file(&compose_file)
        .with_context(|| format!("reading {}", compose_file.display()))?;

    let params = GlobalParameters::new(
        cli.image,
        cli.build_name,
        cli.account.as_deref(),
        cli.product.as_deref(),
    );
    tracing::info!(
        "Preparing {} for {} (account {}, product {})",
        compose_file.display(),
        params.build_name,
        params.account_name,
        params.product_name
    );

    let compose_dir = compose_file
        .parent()
        .map(|dir| dir.to_path_buf())
        .unwrap_or_else(|| working_dir.clone());
    let dockerfile_resolver = match cli.dockerfile {
        Some(path) => DockerfileResolver::new(&compose_dir).dockerfile(resolve_path(&working_dir, &path)),
        None => DockerfileResolver::new(&compose_dir),
    };
    let resolver: &dyn CommandResolver = if cli.no_discovery {
        &NoDiscovery
    } else {
        &dockerfile_resolver
    };

    PeerTransform::new(&params, &config, resolver)
        .apply(&mut document)
        .context("rewriting services")?;

    if cli.dry_run {
        print!("{}", document.to_yaml_string()?);
    } else {
        let output = resolve_path(&working_dir, &cli.output);
        document
            .write_file(&output)
            .with_context(|| format!("writing {}", output.display()))?;
        tracing::info!("Wrote {}", output.display());
    }

    Ok(())
}

/// Resolve a CLI path against the working directory unless it is absolute
fn resolve_path(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_path() {
        let base = Path::new("/work/repo");
        assert_eq!(resolve_path(base, Path::new(".app.json")), PathBuf::from("/work/repo/.app.json"));
        assert_eq!(resolve_path(base, Path::new("/etc/Dockerfile")), PathBuf::from("/etc/Dockerfile"));
    }
}

use anyhow::{Context, Result};
use clap::Parser;
use pkgslot::config::Config;
use pkgslot::package::PackageId;
use std::path::PathBuf;
use std::sync::Arc;

/// pkgslot - concurrent-safe package installer
///
/// Installs exact package versions from an npm-style registry into a shared
/// directory. Any number of pkgslot processes may run against the same
/// directory at once; each package version is downloaded only once.
///
/// Examples:
///   pkgslot install left-pad@1.3.0
///   pkgslot manifest @types/node@20.11.0
///   pkgslot versions left-pad
#[derive(Parser, Debug)]
#[command(author, version = env!("PKGSLOT_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Install root directory (defaults to ~/.pkgslot; also via PKGSLOT_HOME)
    #[arg(
        long = "base-dir",
        short = 'd',
        env = "PKGSLOT_HOME",
        value_name = "PATH",
        global = true
    )]
    pub base_dir: Option<PathBuf>,

    /// Registry URL (defaults to https://registry.npmjs.org/)
    #[arg(
        long = "registry",
        env = "PKGSLOT_REGISTRY",
        value_name = "URL",
        global = true
    )]
    pub registry: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Install a package version and print its directory
    Install(PackageArgs),

    /// Print the dependency manifest of a package version
    Manifest(PackageArgs),

    /// List the published versions of a package
    Versions(VersionsArgs),
}

#[derive(clap::Args, Debug)]
pub struct PackageArgs {
    /// Package and exact version, e.g. "left-pad@1.3.0" or "@scope/name@1.0.0"
    #[arg(value_name = "NAME@VERSION")]
    pub package: PackageId,
}

#[derive(clap::Args, Debug)]
pub struct VersionsArgs {
    #[arg(value_name = "NAME")]
    pub name: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = Arc::new(pkgslot::runtime::RealRuntime);

    let config = Config::new(runtime.as_ref(), cli.base_dir, cli.registry)?;
    let installer = config.into_installer(runtime)?;

    match cli.command {
        Commands::Install(args) => {
            let result = installer.install(&args.package).await?;
            println!("{}", result.path.display());
        }
        Commands::Manifest(args) => {
            let manifest = installer.resolve_manifest(&args.package).await?;
            let json =
                serde_json::to_string_pretty(&manifest).context("Failed to serialize manifest")?;
            println!("{}", json);
        }
        Commands::Versions(args) => {
            for version in installer.list_versions(&args.name).await? {
                println!("{}", version);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_install_parsing() {
        let cli = Cli::try_parse_from(["pkgslot", "install", "sample-lib@1.2.3"]).unwrap();
        match cli.command {
            Commands::Install(args) => {
                assert_eq!(args.package.name(), "sample-lib");
                assert_eq!(args.package.version(), "1.2.3");
            }
            _ => panic!("Expected Install command"),
        }
    }

    #[test]
    fn test_cli_scoped_manifest_parsing() {
        let cli = Cli::try_parse_from(["pkgslot", "manifest", "@scope/widget@2.0.0"]).unwrap();
        match cli.command {
            Commands::Manifest(args) => {
                assert_eq!(args.package.name(), "@scope/widget");
                assert_eq!(args.package.scope(), Some("@scope"));
            }
            _ => panic!("Expected Manifest command"),
        }
    }

    #[test]
    fn test_cli_global_options_parsing() {
        let cli = Cli::try_parse_from([
            "pkgslot",
            "versions",
            "sample-lib",
            "--base-dir",
            "/tmp/pkgs",
            "--registry",
            "http://localhost:4873",
        ])
        .unwrap();
        assert_eq!(cli.base_dir, Some(PathBuf::from("/tmp/pkgs")));
        assert_eq!(cli.registry.as_deref(), Some("http://localhost:4873"));
        match cli.command {
            Commands::Versions(args) => assert_eq!(args.name, "sample-lib"),
            _ => panic!("Expected Versions command"),
        }
    }

    #[test]
    fn test_cli_rejects_package_without_version() {
        assert!(Cli::try_parse_from(["pkgslot", "install", "sample-lib"]).is_err());
        assert!(Cli::try_parse_from(["pkgslot", "install", "../evil@1.0.0"]).is_err());
    }

    #[test]
    fn test_cli_no_subcommand_fails() {
        assert!(Cli::try_parse_from(["pkgslot", "sample-lib@1.2.3"]).is_err());
    }
}

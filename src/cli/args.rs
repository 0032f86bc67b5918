//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// protogen - incremental protobuf code generation
///
/// Runs a sandboxed protoc with Go, TypeScript, C++ and Rust generators,
/// regenerating only packages whose sources changed.
#[derive(Parser, Debug)]
#[command(name = "protogen")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Project directory (defaults to current directory)
    #[arg(short = 'C', long, global = true, env = "PROTOGEN_PROJECT_DIR")]
    pub project_dir: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate code for stale proto packages
    #[command(visible_aliases = ["gen", "genproto"])]
    Generate(GenerateArgs),

    /// Remove generated files and the cache
    Clean(CleanArgs),

    /// Build or install the code generators
    #[command(visible_alias = "protodeps")]
    Deps(DepsArgs),
}

/// Arguments for the generate command
#[derive(Parser, Debug, Default)]
pub struct GenerateArgs {
    /// Proto file patterns to include (repeatable)
    #[arg(short, long)]
    pub targets: Vec<String>,

    /// Proto file patterns to exclude (repeatable)
    #[arg(short, long)]
    pub exclude: Vec<String>,

    /// Regenerate everything, ignoring the cache
    #[arg(short, long)]
    pub force: bool,

    /// Cache manifest path, relative to the project
    #[arg(long)]
    pub cache_file: Option<PathBuf>,

    /// go-lite feature selector
    #[arg(long)]
    pub features: Option<String>,

    /// Tools directory, relative to the project
    #[arg(long)]
    pub tools_dir: Option<PathBuf>,

    /// Skip building missing generators before generating
    #[arg(long)]
    pub no_deps: bool,

    /// Extra arguments passed verbatim to protoc
    #[arg(last = true)]
    pub extra_args: Vec<String>,
}

/// Arguments for the clean command
#[derive(Parser, Debug, Default)]
pub struct CleanArgs {
    /// Cache manifest path, relative to the project
    #[arg(long)]
    pub cache_file: Option<PathBuf>,
}

/// Arguments for the deps command
#[derive(Parser, Debug, Default)]
pub struct DepsArgs {
    /// Tools directory, relative to the project
    #[arg(long)]
    pub tools_dir: Option<PathBuf>,

    /// Rebuild tools that are already installed
    #[arg(long)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_generate_with_extra_args() {
        let cli = Cli::parse_from([
            "protogen",
            "generate",
            "-t",
            "./*.proto",
            "-t",
            "rpc/*.proto",
            "--force",
            "--",
            "--experimental_allow_proto3_optional",
        ]);
        match cli.command {
            Commands::Generate(args) => {
                assert_eq!(args.targets, vec!["./*.proto", "rpc/*.proto"]);
                assert!(args.force);
                assert!(!args.no_deps);
                assert_eq!(args.extra_args, vec!["--experimental_allow_proto3_optional"]);
            }
            _ => panic!("expected Generate command"),
        }
    }

    #[test]
    fn cli_generate_aliases() {
        for alias in ["gen", "genproto"] {
            let cli = Cli::parse_from(["protogen", alias]);
            assert!(matches!(cli.command, Commands::Generate(_)));
        }
    }

    #[test]
    fn cli_parses_clean() {
        let cli = Cli::parse_from(["protogen", "clean", "--cache-file", "build/cache.json"]);
        match cli.command {
            Commands::Clean(args) => {
                assert_eq!(args.cache_file, Some(PathBuf::from("build/cache.json")));
            }
            _ => panic!("expected Clean command"),
        }
    }

    #[test]
    fn cli_parses_deps_alias() {
        let cli = Cli::parse_from(["protogen", "protodeps", "--force"]);
        match cli.command {
            Commands::Deps(args) => assert!(args.force),
            _ => panic!("expected Deps command"),
        }
    }

    #[test]
    fn cli_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["protogen", "clean", "-vv", "-C", "/tmp/proj"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.project_dir, Some(PathBuf::from("/tmp/proj")));
    }
}

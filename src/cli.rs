use std::path::PathBuf;

use clap::Parser;

use crate::input::Mode;

#[derive(Parser, Debug)]
#[command(
    name = "purl-notices",
    about = "Reconcile license and copyright evidence for packages and generate legal notices",
    version
)]
pub struct Cli {
    /// Package URL, package list file, project directory or cache file
    #[arg(short, long)]
    pub input: Option<String>,

    /// How to interpret the input
    #[arg(short, long, default_value = "auto", value_name = "MODE")]
    pub mode: Mode,

    /// Write notices to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Notice format
    #[arg(short, long, default_value = "text", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Cache file location [default: from config, .purl-notices.cache.json]
    #[arg(short, long, value_name = "FILE")]
    pub cache: Option<PathBuf>,

    /// Do not read or write the cache file
    #[arg(long, conflicts_with = "cache")]
    pub no_cache: bool,

    /// Check that a cache file is readable and well-formed, then exit
    #[arg(long, value_name = "FILE")]
    pub validate_cache: Option<PathBuf>,

    /// Config file [default: ./.purl-notices/config.toml, fallback ~/.config/purl-notices/config.toml]
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Packages reconciled concurrently [default: from config, 4]
    #[arg(short, long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..))]
    pub parallel: Option<u16>,

    /// Directory of reference license texts named <SPDX-ID>.txt
    #[arg(long, value_name = "DIR")]
    pub licenses_dir: Option<PathBuf>,

    /// Leave copyright statements out of the notices
    #[arg(long)]
    pub no_copyright: bool,

    /// Leave full license texts out of the notices
    #[arg(long)]
    pub no_license_text: bool,

    /// Path substring to skip when scanning a directory (repeatable)
    #[arg(long, value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// More output: -v shows diagnostics and errors, -vv debug logs
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// No progress bar or summary
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_typical_invocation() {
        let cli = Cli::try_parse_from([
            "purl-notices",
            "-i",
            "purls.txt",
            "--mode",
            "kissbom",
            "-p",
            "8",
            "--format",
            "json",
            "-vv",
            "--no-copyright",
        ])
        .unwrap();
        assert_eq!(cli.input.as_deref(), Some("purls.txt"));
        assert_eq!(cli.mode, Mode::Kissbom);
        assert_eq!(cli.parallel, Some(8));
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.verbose, 2);
        assert!(cli.no_copyright);
    }

    #[test]
    fn test_rejects_zero_parallelism_and_conflicts() {
        assert!(Cli::try_parse_from(["purl-notices", "-p", "0"]).is_err());
        assert!(Cli::try_parse_from(["purl-notices", "--cache", "c.json", "--no-cache"]).is_err());
        assert!(Cli::try_parse_from(["purl-notices", "-q", "-v"]).is_err());
    }
}

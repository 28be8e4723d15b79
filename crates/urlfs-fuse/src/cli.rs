//! Command-line interface of the `urlfs` daemon.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "urlfs")]
#[command(about = "Mount remote URLs as symlinks with streamed fakefiles", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Directory to mount on
    pub mountpoint: PathBuf,

    /// Configuration file (.toml or .json)
    #[arg(short, long, env = "URLFS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Comma-separated mount options, e.g. allow_other,auto_unmount
    #[arg(short = 'o', long = "options")]
    pub options: Option<String>,
}

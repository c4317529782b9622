use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    #[clap(short, long, global = true, help = "Config file (default ~/.mirrorpilot/config.json)")]
    pub config: Option<PathBuf>,
    #[clap(short, long, global = true, help = "Debug logging, also written to ~/.mirrorpilot/logs")]
    pub verbose: bool,
    #[clap(long, global = true, help = "Exit on failure instead of asking what to do")]
    pub no_prompt: bool,
    #[clap(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    #[clap(about = "Mirror the remote tree once (default)", display_order = 1)]
    Run,
    #[clap(about = "Write a template config file", display_order = 2)]
    Init,
    #[clap(about = "Validate and print the config", display_order = 3)]
    Check,
    #[clap(about = "Run the remote restart command once", display_order = 4)]
    Restart,
}

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use mirrorpilot::cli::{Cli, Commands};
use mirrorpilot::config::{self, Config};
use mirrorpilot::{app, logging};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let log_dir = config::logs_dir().ok();
    // held until main returns so the file log is flushed
    let _guard = logging::init(cli.verbose, log_dir.as_deref());

    match dispatch(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("❌ {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn dispatch(cli: Cli) -> Result<u8> {
    let config_path = match cli.config {
        Some(p) => p,
        None => config::default_config_path()?,
    };

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Init => {
            if Config::write_template(&config_path)? {
                println!("✅ Template config written to {}", config_path.display());
                println!("   Edit it, then run `mirrorpilot check`.");
            } else {
                println!("⚠️ Config already exists, left untouched: {}", config_path.display());
            }
            Ok(0)
        }
        Commands::Check => {
            let cfg = Config::load(&config_path)?;
            cfg.show_table()?;
            println!("✅ Config OK: {}", config_path.display());
            Ok(0)
        }
        Commands::Restart => {
            let cfg = Config::load(&config_path)?;
            Ok(exit_byte(app::handle_restart(&cfg)?))
        }
        Commands::Run => {
            let cfg = Config::load(&config_path)?;
            Ok(exit_byte(app::handle_run(&cfg, cli.no_prompt)?))
        }
    }
}

fn exit_byte(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

//! sitedeploy - Entry Point
//!
//! HTTP service that deploys static sites from git repositories to a remote
//! nginx host.

use std::collections::HashMap;
use std::env;
use std::process::ExitCode;

use colored::Colorize;
use sitedeploy::app::options::AppOptions;
use sitedeploy::app::run::run;
use sitedeploy::filesys::file::File;
use sitedeploy::logs::{init_logging, LogOptions};
use sitedeploy::storage::layout::StorageLayout;
use sitedeploy::storage::settings::Settings;
use sitedeploy::utils::version_info;

use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", version.version),
        }
        return ExitCode::SUCCESS;
    }

    // Load settings
    let layout = StorageLayout::default();
    let settings_file = match cli_args.get("config") {
        Some(path) => File::new(path),
        None => layout.settings_file(),
    };
    let settings = match load_settings(&settings_file).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{} {}", "Invalid configuration:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    if cli_args.contains_key("check-config") {
        println!(
            "{} {}",
            "Configuration OK:".green().bold(),
            settings_file.path().display()
        );
        return ExitCode::SUCCESS;
    }

    // Initialize logging, the guard flushes file output on exit
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        log_dir: settings.log_dir.clone(),
        json_format: settings.log_json,
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    print_banner(&settings, &version.version);

    let options = AppOptions::from_settings(&settings, layout);
    info!("Running sitedeploy with options: {:?}", options);
    match run(options, settings, await_shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Failed to run the engine: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn load_settings(file: &File) -> Result<Settings, sitedeploy::errors::EngineError> {
    let mut settings = Settings::load(file).await?;
    settings.apply_env_overrides(|key| env::var(key).ok())?;
    settings.validate()?;
    Ok(settings)
}

fn print_banner(settings: &Settings, version: &str) {
    println!("{} {}", "sitedeploy".bold().cyan(), version.dimmed());
    println!(
        "  {} http://{}:{}",
        "listen  ".dimmed(),
        settings.server.host,
        settings.server.port
    );
    println!(
        "  {} {}@{}:{}",
        "target  ".dimmed(),
        settings.target.user,
        settings.target.host,
        settings.target.site_root
    );
    println!(
        "  {} {}",
        "work dir".dimmed(),
        settings.workspace.base_dir.display()
    );
    println!(
        "  {} {}",
        "registry".dimmed(),
        settings
            .registry
            .base_url
            .as_deref()
            .unwrap_or("disabled")
    );
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!("Unable to listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C received, shutting down...");
    }
}

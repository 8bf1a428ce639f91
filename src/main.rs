use clap::Parser;
use colored::*;
use engine_bridge::cli::{Cli, Commands};
use engine_bridge::error::{BridgeError, Result};
use engine_bridge::{build_engine, Config, EngineService, SearchRequest};
use env_logger::{Builder, Env, Target};
use log::info;
use std::fs;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{stdin, stdout, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli)?;

    let start_time = Instant::now();
    info!("Application started with command: {:?}", cli.command);

    let config = load_config(&cli)?;
    let engine = Arc::new(build_engine(&config, None)?);

    match &cli.command {
        Commands::Serve => {
            let names = engine.registry().names();
            info!(
                "Engine service started with {} engines: {}",
                names.len(),
                names.join(", ")
            );
            let server = EngineService::new(engine).into_server();
            server.run(BufReader::new(stdin()), stdout()).await?;
        }
        Commands::List => {
            let engines = engine.registry().list();
            if engines.is_empty() {
                println!("{}", "No engines registered".yellow());
            }
            for descriptor in engines {
                let state = if descriptor.enabled {
                    "enabled".green()
                } else {
                    "disabled".red()
                };
                println!(
                    "{:<24} {:<9} {}",
                    descriptor.name.bold(),
                    state,
                    descriptor.categories.join(", ").dimmed()
                );
            }
        }
        Commands::Search {
            query,
            engines,
            categories,
            page,
            language,
        } => {
            let mut request = SearchRequest::new(query.clone())?
                .with_page(*page)?
                .with_engines(engines.iter().cloned())
                .with_categories(categories.iter().cloned());
            if let Some(language) = language {
                request = request.with_language(language.clone());
            }

            let response = engine.search(&request).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
            for (name, report) in &response.per_engine_status {
                if let Some(error) = &report.error {
                    eprintln!("{} {}: {}", "warning:".yellow(), name, error);
                }
            }
        }
    }

    info!("Finished in {:.2?}", start_time.elapsed());
    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.engines_dir {
        config.engines.dir = dir.clone();
    }
    if let Some(url) = &cli.upstream {
        config.upstream.url = url.clone();
    }
    Ok(config)
}

fn setup_logging(cli: &Cli) -> Result<()> {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));

    builder.format(|buf, record| {
        use std::io::Write;
        writeln!(
            buf,
            "{} [{}] [{}] {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.module_path().unwrap_or("unknown"),
            record.args()
        )
    });

    // stdout carries the RPC stream, so logs never go there.
    if let Some(log_path) = &cli.log {
        if let Some(parent_dir) = log_path.parent() {
            if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
                fs::create_dir_all(parent_dir).map_err(BridgeError::Io)?;
            }
        }
        let log_file = fs::File::create(log_path).map_err(BridgeError::Io)?;
        builder.target(Target::Pipe(Box::new(log_file)));
    } else {
        builder.target(Target::Stderr);
    }

    builder
        .try_init()
        .map_err(|e| BridgeError::Other(e.to_string()))?;
    Ok(())
}

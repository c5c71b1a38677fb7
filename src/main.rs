use std::io::Read;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod app;
mod cli;
mod config;
mod llm;
mod matching;
mod semantic;
#[cfg(test)]
mod tests;
mod vacancies;
mod web;

use app::{AppFactory, MatchRequest};
use cli::{BoundsArgs, Command};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_resume(resume: Option<String>, resume_file: Option<std::path::PathBuf>) -> anyhow::Result<String> {
    match (resume, resume_file) {
        (Some(text), _) => Ok(text),
        (None, Some(path)) if path.as_os_str() == "-" => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            Ok(text)
        }
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read resume from {}", path.display())),
        (None, None) => anyhow::bail!("either --resume or --resume-file is required"),
    }
}

fn main() -> anyhow::Result<()> {
    init_logging();
    let args = cli::Args::parse();

    let config = AppFactory::load_config()?;

    match args.command {
        Command::Serve { host, port } => {
            config.validate()?;
            let service = AppFactory::create_match_service(&config)?;
            let stats = service.index().build_at_startup();
            if !stats.ready {
                log::warn!("serving without a vector index; match requests will return 503");
            }

            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            web::start_daemon(service, &host, port)
        }

        Command::Match {
            resume,
            resume_file,
            bounds: BoundsArgs {
                k_faiss,
                k_stage1,
                k_stage2,
            },
        } => {
            let request = MatchRequest {
                resume: read_resume(resume, resume_file)?,
                k_faiss,
                k_stage1,
                k_stage2,
            };
            // validate bounds before spending time on the index
            request.bounds(&config.matching)?;

            config.validate()?;
            let service = AppFactory::create_match_service(&config)?;
            service.index().rebuild()?;
            let response = service.run(&request)?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }

        Command::IndexStats {} => {
            config.validate_index()?;
            let stats = AppFactory::create_index_service(&config).build_at_startup();
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
    }
}

// src/main.rs

use anyhow::Result;
use depsolver::request::Request;
use depsolver::{response, service, Error};
use std::io::{self, Read};

fn main() -> Result<()> {
    // Diagnostics go to stderr; stdout carries exactly one JSON document
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let outcome = read_request().and_then(|request| service::handle(&request));

    let mut stdout = io::stdout().lock();
    match outcome {
        Ok(response) => {
            response::write_success(&mut stdout, &response)?;
            Ok(())
        }
        Err(err) => {
            eprintln!("{}: {}", err.kind(), err);
            response::write_error(&mut stdout, &err)?;
            std::process::exit(1);
        }
    }
}

fn read_request() -> depsolver::Result<Request> {
    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;
    serde_json::from_str(&input)
        .map_err(|e| Error::InvalidRequest(format!("malformed request: {}", e)))
}

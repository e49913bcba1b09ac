use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use url::Url;

use resource_router::config::{load_config, load_manifest, RouterConfig};
use resource_router::http::ROUTES_INDEX;
use resource_router::lifecycle::build_router;
use resource_router::routing::{Dispatch, RouteRequest};

#[derive(Parser)]
#[command(name = "route-cli")]
#[command(about = "Inspect and exercise resource routing tables", long_about = None)]
struct Cli {
    /// Router configuration (TOML) used for local commands.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the compiled routing table of a manifest
    Table {
        manifest: PathBuf,
    },
    /// Dispatch one request against a manifest and print the decision
    Resolve {
        manifest: PathBuf,
        method: String,
        path: String,
        #[arg(long)]
        query: Option<String>,
        #[arg(long)]
        accept: Option<String>,
        #[arg(long = "content-type")]
        content_type: Option<String>,
        #[arg(long)]
        body: Option<String>,
        #[arg(long)]
        identity: Option<String>,
    },
    /// Fetch the route index of a running server
    Remote {
        #[arg(short, long, default_value = "http://localhost:8080")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RouterConfig::default(),
    };

    match cli.command {
        Commands::Table { manifest } => {
            let router = build_router(&config, &load_manifest(&manifest)?, Vec::new())?;
            for route in router.routes() {
                println!(
                    "{:<24} {:<40} {:<24} {}",
                    route.verbs.join(","),
                    route.template,
                    route.produces,
                    route.target
                );
            }
        }
        Commands::Resolve {
            manifest,
            method,
            path,
            query,
            accept,
            content_type,
            body,
            identity,
        } => {
            let router = build_router(&config, &load_manifest(&manifest)?, Vec::new())?;

            let mut request = RouteRequest::new(method, path);
            if let Some(q) = query {
                request = request.query(q);
            }
            if let Some(a) = accept {
                request = request.accept(a);
            }
            if let Some(ct) = content_type {
                request = request.content_type(ct);
            }
            if let Some(b) = body {
                request = request.body(b);
            }
            if let Some(id) = identity {
                request = request.identity(id);
            }

            let decision = match router.dispatch(&request) {
                Ok(Dispatch::Invoke(selection)) => json!({
                    "target": selection.binding.target_type,
                    "method": selection.binding.method_name,
                    "template": selection.binding.template().template(),
                    "arguments": selection.arguments,
                    "content_type": selection.content_type,
                }),
                Ok(Dispatch::Options { allow }) => json!({ "allow": allow }),
                Err(e) => json!({ "status": e.status_code(), "error": e.kind(), "message": e.to_string() }),
            };
            println!("{}", serde_json::to_string_pretty(&decision)?);
        }
        Commands::Remote { url } => {
            let index = Url::parse(&url)?.join(ROUTES_INDEX)?;
            let res = reqwest::get(index).await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: server returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

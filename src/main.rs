//! Command-line entry point: runs a single scrape against a target URL and
//! writes the result through every configured exporter.
//!
//! Usage: `iwsa_agent <url> <goal> [config.yaml]`

use std::path::PathBuf;

use iwsa_agent::config::{AppConfig, BackendConfig, BackendKind};
use iwsa_agent::{run, ScrapeRequest};

fn load_config(config_path: Option<&str>) -> anyhow::Result<AppConfig> {
    let config = match config_path {
        Some(path) => iwsa_agent::config::load_yaml_config(&PathBuf::from(path))?,
        None => default_config()?,
    };
    Ok(iwsa_agent::config::apply_env_overlay(config))
}

fn default_config() -> anyhow::Result<AppConfig> {
    let output_dir = std::env::var("IWSA_OUTPUT_DIR").unwrap_or_else(|_| "./iwsa-output".to_string());
    let endpoint = std::env::var("IWSA_LOCAL_LLM_ENDPOINT").unwrap_or_else(|_| "http://127.0.0.1:11434".to_string());

    let config = AppConfig::builder()
        .output_dir(output_dir)
        .llm_backend(BackendConfig {
            name: "local".into(),
            kind: BackendKind::Local,
            endpoint: Some(endpoint),
            api_key_env: None,
            priority: 0,
            rate_limit_rps: 2.0,
            circuit_breaker_failure_threshold: 5,
            circuit_breaker_retry_delay_secs: 60,
            request_timeout_secs: 30,
        })
        .build()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("usage: {} <url> <goal> [config.yaml]", args.first().map(String::as_str).unwrap_or("iwsa_agent"));
        std::process::exit(2);
    }

    let target_url = args[1].clone();
    let goal = args[2].clone();
    let config_path = args.get(3).map(String::as_str);

    let config = load_config(config_path)?;
    let request = ScrapeRequest::new(target_url, goal);

    let result = match run(config, request).await {
        Ok(result) => result,
        Err(err) if err.is_cancelled() => {
            eprintln!("scrape cancelled");
            std::process::exit(130);
        }
        Err(err) => return Err(err.into()),
    };

    println!(
        "scrape {}: {} input rows -> {} output rows, {} export(s) succeeded",
        if result.success { "succeeded" } else { "failed" },
        result.total_input_records,
        result.total_output_records,
        result.export_results.iter().filter(|e| e.success).count(),
    );
    for error in &result.errors {
        eprintln!("error: {error}");
    }

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

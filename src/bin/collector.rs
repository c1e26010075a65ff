use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use telemetry_collector::collector;
use telemetry_collector::config::{CollectorConfig, Encoding, Operation};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = match config_from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err:#}");
            std::process::exit(2);
        }
    };

    match collector::run(config).await {
        Ok(reason) => {
            tracing::info!(?reason, "collector finished");
            std::process::exit(0);
        }
        Err(err) => {
            tracing::error!(error = %err, "fatal error");
            std::process::exit(1);
        }
    }
}

/// Build the run configuration from `TELEMETRY_*` environment variables.
///
/// `TELEMETRY_SERVER` is required; everything else falls back to the same
/// defaults as the flags of the classic collector: subscribe operation,
/// json encoding, no control port, no forwarding, cleanup enabled.
fn config_from_env() -> Result<CollectorConfig> {
    let server = std::env::var("TELEMETRY_SERVER")
        .context("TELEMETRY_SERVER must be set to the device address (host:port)")?;

    let operation: Operation = env_opt("TELEMETRY_OPER")
        .unwrap_or_else(|| "subscribe".to_string())
        .parse()?;
    let encoding: Encoding = env_opt("TELEMETRY_ENCODING")
        .unwrap_or_else(|| "json".to_string())
        .parse()?;

    let mut config = CollectorConfig::new(server)
        .with_operation(operation)
        .with_encoding(encoding)
        .with_subscriptions(env_opt("TELEMETRY_SUBSCRIPTION").unwrap_or_default())
        .with_credentials(
            env_opt("TELEMETRY_USERNAME").unwrap_or_default(),
            env_opt("TELEMETRY_PASSWORD").unwrap_or_default(),
        );

    config.tls_cert = env_opt("TELEMETRY_CERT").map(PathBuf::from);
    if let Some(name) = env_opt("TELEMETRY_SERVER_HOST_OVERRIDE") {
        config.tls_server_name = name;
    }
    config.qos = parse_opt::<u32>("TELEMETRY_QOS")?;
    config.yang_path = env_opt("TELEMETRY_YANG_PATH");
    config.out_file = env_opt("TELEMETRY_OUT_FILE").map(PathBuf::from);
    config.control_port = parse_opt::<u16>("TELEMETRY_SLEEP_PORT")?;
    config.output_ip = env_opt("TELEMETRY_OUTPUT_IP");
    config.output_port = parse_opt::<u16>("TELEMETRY_OUTPUT_PORT")?;
    if let Some(ms) = parse_opt::<u64>("TELEMETRY_INITIAL_SLEEP")? {
        config = config.with_initial_delay_ms(ms);
    }
    config.cleanup_on_exit = !env_flag("TELEMETRY_DONT_CLEAN");

    Ok(config)
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn env_flag(name: &str) -> bool {
    matches!(
        env_opt(name).as_deref(),
        Some("1") | Some("true") | Some("yes")
    )
}

fn parse_opt<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env_opt(name)
        .map(|value| {
            value
                .parse::<T>()
                .with_context(|| format!("{name} must be a number, got '{value}'"))
        })
        .transpose()
}

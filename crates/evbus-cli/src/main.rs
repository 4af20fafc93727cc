//! # evbus CLI
//!
//! Command-line utilities for building, inspecting, and publishing frames.

use anyhow::{Context, Result};
use evbus_proto::{decode_frame, encode_frame, DecodedFrame, TopicPrefix};
use evbus_publisher::{
    Cbor, Event, EventKey, EventName, EventVersion, MemoryRegistry, Publisher, Registry,
    SqliteRegistry,
};
use std::env;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

mod config;

use config::{PublishConfig, RegistryConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "prefix" => {
            if args.len() < 4 {
                eprintln!("Usage: evbus prefix <name> <version>");
                std::process::exit(1);
            }
            let prefix = topic_prefix(&args[2], &args[3])?;
            println!("{}", hex::encode(prefix.as_bytes()));
        }
        "frame" => {
            if args.len() < 6 {
                eprintln!("Usage: evbus frame <name> <version> <key> <payload-hex>");
                std::process::exit(1);
            }
            let frame = build_frame(&args[2], &args[3], &args[4], &args[5])?;
            println!("{}", hex::encode(frame));
        }
        "inspect" => {
            if args.len() < 3 {
                eprintln!("Usage: evbus inspect <frame-hex>");
                std::process::exit(1);
            }
            let bytes = hex::decode(args[2].trim()).context("Frame is not valid hex")?;
            let frame = decode_frame(&bytes).context("Failed to decode frame")?;
            println!("{}", serde_json::to_string_pretty(&frame_json(&frame))?);
        }
        "publish" => {
            init_tracing();
            let config = PublishConfig::from_env()?;
            publish_stdin(config).await?;
        }
        "help" | "--help" | "-h" => {
            print_help();
        }
        cmd => {
            eprintln!("Unknown command: {cmd}");
            print_help();
            std::process::exit(1);
        }
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn topic_prefix(name: &str, version: &str) -> Result<TopicPrefix> {
    let name = EventName::new(name).context("Invalid event name")?;
    let version = EventVersion(version.parse().context("Invalid event version")?);
    Ok(TopicPrefix::new(&name, version))
}

fn build_frame(name: &str, version: &str, key: &str, payload_hex: &str) -> Result<Vec<u8>> {
    let prefix = topic_prefix(name, version)?;
    let key = EventKey::try_from(key).context("Invalid event key")?;
    let payload = hex::decode(payload_hex.trim()).context("Payload is not valid hex")?;
    encode_frame(&prefix, &Event::new(key, payload)).context("Failed to encode frame")
}

fn frame_json(frame: &DecodedFrame) -> serde_json::Value {
    serde_json::json!({
        "event_name": frame.event_name.as_str(),
        "event_version": frame.event_version.0,
        "key": String::from_utf8_lossy(&frame.key),
        "key_hex": hex::encode(&frame.key),
        "payload_hex": hex::encode(&frame.payload),
        "payload_len": frame.payload.len(),
        "topic_len": frame.topic_len(),
    })
}

async fn publish_stdin(config: PublishConfig) -> Result<()> {
    let registry: Box<dyn Registry> = match &config.registry {
        RegistryConfig::Memory => Box::new(MemoryRegistry::new()),
        RegistryConfig::Sqlite(path) => Box::new(
            SqliteRegistry::open(path)
                .with_context(|| format!("Failed to open registry at {}", path.display()))?,
        ),
    };

    let mut publisher = Publisher::<Cbor<String>>::bind(
        config.endpoint.clone(),
        config.event_name.clone(),
        config.event_version,
        &*registry,
    )
    .await
    .context("Failed to start publisher")?;

    tracing::info!(
        endpoint = %config.endpoint,
        local_addr = ?publisher.local_addr(),
        "Publishing stdin lines, Ctrl+C or EOF to stop"
    );

    let outcome = pump_lines(&mut publisher, &config.event_key).await;

    publisher.stop().await.context("Failed to stop publisher")?;
    outcome
}

async fn pump_lines(publisher: &mut Publisher<Cbor<String>>, key: &EventKey) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut published = 0usize;
    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("Failed to listen for Ctrl+C")?;
                tracing::info!("Shutdown requested");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                publisher
                    .publish(&[Event::new(key.clone(), Cbor(line))])
                    .await
                    .context("Failed to publish event")?;
                published += 1;
            }
        }
    }

    tracing::info!(published, "Input finished");
    Ok(())
}

fn print_help() {
    println!(
        r#"evbus CLI

USAGE:
    evbus <COMMAND> [OPTIONS]

COMMANDS:
    prefix <name> <version>                    Print the topic prefix as hex
    frame <name> <version> <key> <payload-hex> Build a frame and print it as hex
    inspect <frame-hex>                        Decode a frame and print it as JSON
    publish                                    Publish stdin lines as CBOR strings
    help                                       Show this help message

ENVIRONMENT (publish):
    EVBUS_ENDPOINT, EVBUS_HOST, EVBUS_PORT, EVBUS_EVENT_NAME, EVBUS_EVENT_VERSION,
    EVBUS_EVENT_KEY, EVBUS_REGISTRY (memory|sqlite), EVBUS_REGISTRY_PATH

EXAMPLES:
    evbus prefix orders 2
    evbus frame orders 2 eu-west 68656c6c6f
    EVBUS_EVENT_NAME=orders evbus publish
"#
    );
}

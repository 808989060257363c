//! Purpose: `recordops` CLI entry point.
//! Role: Binary crate root; parses args, seeds the in-process broker, runs the server.
//! Invariants: Errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{Map, Value, json};

use recordops::api::{Error, ErrorKind, to_exit_code};
use recordops::broker::TimestampType;
use recordops::broker::memory::MemoryBroker;
use recordops::serve::{ServeConfig, serve};

#[derive(Parser, Debug)]
#[command(
    name = "recordops",
    version,
    about = "Inspect topic records and publish test messages over HTTP"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the admin HTTP server backed by an in-process broker.
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1:9780")]
    bind: SocketAddr,
    /// Topic to create at startup; repeatable.
    #[arg(long = "topic", value_name = "NAME[:PARTITIONS]")]
    topics: Vec<String>,
    #[arg(long, value_enum, default_value_t = TimestampTypeCli::CreateTime)]
    timestamp_type: TimestampTypeCli,
    #[arg(long, default_value_t = 20)]
    default_limit: usize,
    #[arg(long, default_value_t = 100)]
    max_limit: usize,
    #[arg(long, default_value_t = 2000)]
    poll_timeout_ms: u64,
    #[arg(long, default_value_t = 1024 * 1024)]
    max_body_bytes: u64,
    #[arg(long)]
    allow_non_loopback: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum TimestampTypeCli {
    CreateTime,
    LogAppendTime,
}

impl From<TimestampTypeCli> for TimestampType {
    fn from(value: TimestampTypeCli) -> Self {
        match value {
            TimestampTypeCli::CreateTime => TimestampType::CreateTime,
            TimestampTypeCli::LogAppendTime => TimestampType::LogAppendTime,
        }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(()) => 0,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<(), Error> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => run_serve(args),
    }
}

fn run_serve(args: ServeArgs) -> Result<(), Error> {
    let broker = MemoryBroker::new();
    for spec in &args.topics {
        let (name, partitions) = parse_topic_spec(spec)?;
        broker.create_topic(name, partitions, args.timestamp_type.into())?;
    }

    let config = ServeConfig {
        bind: args.bind,
        allow_non_loopback: args.allow_non_loopback,
        default_limit: args.default_limit,
        max_limit: args.max_limit,
        poll_timeout: Duration::from_millis(args.poll_timeout_ms),
        max_body_bytes: args.max_body_bytes,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to start async runtime")
                .with_source(err)
        })?;
    runtime.block_on(serve(config, Arc::new(broker)))
}

fn parse_topic_spec(input: &str) -> Result<(String, usize), Error> {
    let (name, partitions) = match input.rsplit_once(':') {
        Some((name, count)) => {
            let partitions = count.parse::<usize>().map_err(|err| {
                Error::new(ErrorKind::Usage)
                    .with_message(format!("invalid partition count in --topic {input}"))
                    .with_hint("Use NAME or NAME:PARTITIONS, e.g. orders:3.")
                    .with_source(err)
            })?;
            (name, partitions)
        }
        None => (input, 1),
    };
    if name.is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("topic name must not be empty")
            .with_hint("Use NAME or NAME:PARTITIONS, e.g. orders:3."));
    }
    if partitions == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("topic {name} needs at least one partition"))
            .with_topic(name));
    }
    Ok((name.to_string(), partitions))
}

fn emit_error(err: &Error) {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert(
        "message".to_string(),
        json!(err.message().unwrap_or("error")),
    );
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(topic) = err.topic() {
        inner.insert("topic".to_string(), json!(topic));
    }
    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    eprintln!("{}", Value::Object(outer));
}

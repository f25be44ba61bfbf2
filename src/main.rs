use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tdengine_sink::db::TaosConnector;
use tdengine_sink::dlq::KafkaDeadLetterReporter;
use tdengine_sink::{Config, Result, SinkRuntime, SinkTaskContext, TDengineSinkTask};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "tdengine-sink")]
#[command(about = "Kafka to TDengine sink using schemaless inserts", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    info!("Starting tdengine-sink");
    info!("Loading configuration from {:?}", args.config);

    let config = match Config::from_file(&args.config) {
        Ok(cfg) => {
            info!("Configuration loaded successfully");
            cfg
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    info!(
        tdengine_url = %config.tdengine.url,
        tdengine_database = %config.tdengine.database,
        kafka_brokers = ?config.kafka.brokers,
        kafka_topics = ?config.kafka.topics,
        batch_size = config.sink.batch_size,
        max_retries = config.sink.max_retries,
        dead_letter_topic = ?config.kafka.dead_letter_topic,
        "Configuration summary"
    );

    let mut context = SinkTaskContext::new();
    if let Some(topic) = &config.kafka.dead_letter_topic {
        let reporter = KafkaDeadLetterReporter::new(&config.kafka.brokers, topic)?;
        context = context.with_reporter(Arc::new(reporter));
    }

    let task = TDengineSinkTask::new(TaosConnector::new(&config.tdengine), context);
    let mut runtime = SinkRuntime::new(&config, task)?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    };

    if let Err(e) = runtime.run(shutdown).await {
        error!("Sink stopped with error: {}", e);
        return Err(e);
    }

    info!("tdengine-sink terminated");
    Ok(())
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("tdengine_sink=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("tdengine_sink=info,warn"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

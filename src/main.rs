use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;

use pingpong::config::{
    ClientConfig, ConfigSource, ConsumerConfig, DemoConfig, QueueServiceConfig, ServerConfig,
};
use pingpong::lifecycle::startup::{connect_queue, init_observability, trigger_on_signal};
use pingpong::lifecycle::Shutdown;
use pingpong::observability::{EventLog, TracingLog};
use pingpong::queue::{service, MemoryQueue};
use pingpong::{Drainer, HttpServer, Pinger, Responder};

#[derive(Parser)]
#[command(name = "pingpong")]
#[command(about = "Ping/pong services with traced HTTP and queue hops", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ping every address in SERVER_ADDR
    Client,
    /// Answer GET /ping on HTTP_PORT and enqueue to QUEUE_URL
    Server,
    /// Drain QUEUE_URL
    Consumer,
    /// Serve an in-memory queue on QUEUE_BIND
    Queue,
    /// Run every role in one process around an in-memory queue
    Demo,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let source = ConfigSource::from_env();

    match cli.command {
        Command::Client => run_client(source.client()?).await?,
        Command::Server => run_server(source.server()?).await?,
        Command::Consumer => run_consumer(source.consumer()?).await?,
        Command::Queue => run_queue(source.queue_service()?).await?,
        Command::Demo => run_demo(source.demo()?).await?,
    }
    Ok(())
}

fn event_log() -> Arc<dyn EventLog> {
    Arc::new(TracingLog)
}

fn shutdown_on_signal() -> Arc<Shutdown> {
    let shutdown = Arc::new(Shutdown::new());
    trigger_on_signal(shutdown.clone());
    shutdown
}

async fn run_client(config: ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    init_observability(&config.observability)?;
    tracing::info!(
        endpoints = ?config.endpoints.iter().map(|u| u.as_str()).collect::<Vec<_>>(),
        "pingpong client starting"
    );

    let shutdown = shutdown_on_signal();
    let pinger = Pinger::from_config(&config)?.with_log(event_log());
    pinger.run(shutdown.subscribe()).await;
    Ok(())
}

async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    init_observability(&config.observability)?;
    tracing::info!(port = config.port, queue = %config.queue, "pingpong server starting");

    let queue = connect_queue(&config.queue)?;
    let responder = Responder::new(queue)
        .with_log(event_log())
        .with_settings(config.responder);

    let listener = TcpListener::bind(config.bind_address()).await?;
    let shutdown = shutdown_on_signal();
    HttpServer::new(Arc::new(responder), config.request_timeout)
        .run(listener, shutdown.subscribe())
        .await?;
    Ok(())
}

async fn run_consumer(config: ConsumerConfig) -> Result<(), Box<dyn std::error::Error>> {
    init_observability(&config.observability)?;
    tracing::info!(queue = %config.queue, "pingpong consumer starting");

    let queue = connect_queue(&config.queue)?;
    let drainer = Drainer::new(queue)
        .with_log(event_log())
        .with_settings(config.drainer);

    let shutdown = shutdown_on_signal();
    drainer.run(shutdown.subscribe()).await;
    Ok(())
}

async fn run_queue(config: QueueServiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    init_observability(&config.observability)?;

    let listener = TcpListener::bind(config.bind_address).await?;
    let shutdown = shutdown_on_signal();
    service::serve(
        Arc::new(MemoryQueue::new("pingpong")),
        listener,
        shutdown.subscribe(),
    )
    .await?;
    Ok(())
}

async fn run_demo(config: DemoConfig) -> Result<(), Box<dyn std::error::Error>> {
    init_observability(&config.observability)?;
    tracing::info!(port = config.port, "pingpong demo starting");

    let queue = Arc::new(MemoryQueue::new("demo"));
    let log = event_log();
    let shutdown = shutdown_on_signal();

    let listener = TcpListener::bind(("127.0.0.1", config.port)).await?;
    let endpoint = url::Url::parse(&format!("http://{}/ping", listener.local_addr()?))?;

    let responder = Responder::new(queue.clone())
        .with_log(log.clone())
        .with_settings(config.responder);
    let server = HttpServer::new(Arc::new(responder), config.request_timeout);
    let server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    let drainer = Drainer::new(queue)
        .with_log(log.clone())
        .with_settings(config.drainer);
    let drainer_signal = shutdown.subscribe();
    let drainer_task = tokio::spawn(async move { drainer.run(drainer_signal).await });

    let pinger = Pinger::new(vec![endpoint], reqwest::Client::builder().no_proxy().build()?)?
        .with_log(log)
        .with_settings(config.pinger);
    pinger.run(shutdown.subscribe()).await;

    drainer_task.await?;
    server_task.await??;
    Ok(())
}

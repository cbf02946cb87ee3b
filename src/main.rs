//! BlazeRPC CLI - Main entry point.
//!
//! Serves a small demo model set so the framework can be exercised end to
//! end with `grpcurl` or the in-crate client. Real deployments embed
//! [`BlazeApp`] in their own binary and register their own models.

use blazerpc::app::BlazeApp;
use blazerpc::cli::{Cli, Commands};
use blazerpc::config::BlazeConfig;
use blazerpc::error::BlazeError;
use blazerpc::registry::ModelBuilder;
use blazerpc::schema;
use blazerpc::types::{TypeDescriptor, Value};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    match cli.command {
        Commands::Serve {
            host,
            port,
            no_batching,
            max_batch_size,
            batch_timeout_ms,
            grace_period_secs,
            workers,
        } => {
            let mut config = match &cli.config {
                Some(path) => BlazeConfig::from_file(path)?,
                None => BlazeConfig::default(),
            };
            config.observability.log_level = cli.log_level;
            config.server.host = host;
            config.server.port = port;
            config.server.grace_period = std::time::Duration::from_secs(grace_period_secs);
            config.batching.enabled = !no_batching;
            config.batching.max_batch_size = max_batch_size;
            config.batching.batch_timeout = std::time::Duration::from_millis(batch_timeout_ms);
            config.executor.worker_threads = workers;

            blazerpc::observability::init(&config.observability)?;

            let app = demo_app(config)?;

            // Startup banner.
            println!();
            println!("⚡ BlazeRPC server starting...");
            for model in app.registry().list() {
                let tag = if model.streaming() { " (stream)" } else { "" };
                println!("  ✓ Loaded model: {} v{}{}", model.name, model.version, tag);
            }
            println!(
                "  ✓ Server listening on {}:{}",
                app.config().server.host,
                app.config().server.port
            );
            println!();

            let host = app.config().server.host.clone();
            let port = app.config().server.port;
            app.serve(&host, port).await?;
        }

        Commands::Proto { output_dir } => {
            let app = demo_app(BlazeConfig::default())?;
            let path = schema::export_proto(app.registry(), &output_dir)?;
            println!("✓ Proto written to {}", path.display());
        }

        Commands::Version => {
            println!("BlazeRPC v{}", env!("CARGO_PKG_VERSION"));
            println!("Lightning-fast gRPC serving for ML inference");
        }
    }

    Ok(())
}

/// The demo model set: a unary echo, a batched doubler, and a streaming
/// token generator.
fn demo_app(config: BlazeConfig) -> anyhow::Result<BlazeApp> {
    let mut app = BlazeApp::with_config("demo", config);

    app.register(
        ModelBuilder::new("echo")
            .param("s", TypeDescriptor::string())
            .returns(TypeDescriptor::string())
            .handler_fn(|kwargs| async move {
                kwargs
                    .get("s")
                    .cloned()
                    .ok_or_else(|| BlazeError::validation("s", "missing argument"))
            })
            .build()?,
    )?;

    app.register(
        ModelBuilder::new("double")
            .param("x", TypeDescriptor::int64())
            .returns(TypeDescriptor::int64())
            .batch_fn(|batch| async move {
                let column = batch
                    .get("x")
                    .cloned()
                    .ok_or_else(|| BlazeError::validation("x", "missing argument"))?;
                Ok(column
                    .into_iter()
                    .map(|value| {
                        value
                            .as_i64()
                            .map(|v| Value::Int(v * 2))
                            .ok_or_else(|| {
                                BlazeError::validation(
                                    "x",
                                    format!("expected int64, got {}", value.kind()),
                                )
                            })
                    })
                    .collect())
            })
            .build()?,
    )?;

    app.register(
        ModelBuilder::new("generate")
            .param("prompt", TypeDescriptor::string())
            .param("count", TypeDescriptor::int64())
            .returns(TypeDescriptor::string())
            .blocking_stream_fn(|kwargs| {
                let prompt = kwargs
                    .get("prompt")
                    .and_then(|v| v.as_str().map(str::to_owned))
                    .unwrap_or_default();
                let count = kwargs.get("count").and_then(|v| v.as_i64()).unwrap_or(3);
                (0..count).map(move |i| Ok(Value::Str(format!("{}-{}", prompt, i))))
            })
            .build()?,
    )?;

    Ok(app)
}

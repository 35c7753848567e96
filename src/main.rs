//! imgserv - An image transformation server.
//!
//! This binary starts the HTTP server and configures all components.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use imgserv::{
    admission::AdmissionController,
    cache::CachedStore,
    config::{Cli, Command, ServeConfig, SignConfig, SignatureMethod},
    create_s3_client,
    io::{BufferPool, S3OriginStore, DEFAULT_MAX_POOLED},
    params::{OperationParser, Presets},
    server::{auth::SignatureVerifier, create_router, RouterConfig},
    stats::Stats,
    transform::{EncodingPolicy, ImageService, UploadLimits},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(config) => run_serve(config).await,
        Command::Sign(config) => run_sign(config),
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("imgserv v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  S3 bucket: {}", config.s3_bucket);
    if let Some(ref endpoint) = config.s3_endpoint {
        info!("  S3 endpoint: {}", endpoint);
    }
    info!("  S3 region: {}", config.s3_region);
    info!("  Cache path: {}", config.cache_path.display());
    info!(
        "  Admission: {} clients, {} concurrent jobs",
        config.max_clients, config.concurrency
    );
    info!("  Output: {:?}", config.output_format);

    if config.signature_method == SignatureMethod::None {
        warn!("  Signatures: DISABLED - any transform can be requested");
    } else {
        info!("  Signatures: {:?}", config.signature_method);
    }

    let presets = match &config.presets {
        Some(path) => match Presets::from_file(path) {
            Ok(presets) => presets,
            Err(e) => {
                error!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        None => Presets::empty(),
    };
    info!("  Presets: {}", presets.len());

    let s3_client = create_s3_client(config.s3_endpoint.as_deref(), &config.s3_region).await;

    info!("");
    info!("Connecting to S3...");
    if let Err(e) = test_s3_connection(&s3_client, &config.s3_bucket).await {
        error!("  Failed to connect to S3: {}", e);
        error!("");
        error!("  Please check:");
        error!("    - Your AWS credentials are configured correctly");
        error!(
            "    - The bucket '{}' exists and is accessible",
            config.s3_bucket
        );
        error!("    - The S3 endpoint is correct (if using MinIO/custom S3)");
        return ExitCode::FAILURE;
    }
    info!("  Connected successfully");

    let origin = S3OriginStore::new(s3_client, config.s3_bucket.clone());
    let pool = BufferPool::with_limits(config.pool_max_buffer, DEFAULT_MAX_POOLED);
    let cache = match CachedStore::new(origin, &config.cache_path, pool) {
        Ok(cache) => cache,
        Err(e) => {
            error!("Failed to open cache: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let queue_timeout = (config.queue_timeout > 0).then(|| Duration::from_secs(config.queue_timeout));
    let admission = AdmissionController::new(
        config.max_clients,
        config.concurrency,
        queue_timeout,
        Arc::new(Stats::new()),
    );

    let service = ImageService::new(
        cache,
        OperationParser::new(Arc::new(presets)),
        config.signature_verifier(),
        admission,
    )
    .with_encoding(EncodingPolicy {
        output: config.output_format,
        jpeg_correction: config.jpeg_quality_correction,
        webp_correction: config.webp_quality_correction,
    })
    .with_upload_limits(UploadLimits {
        max_width: config.upload_max_width,
        max_height: config.upload_max_height,
    });

    let router = create_router(service, build_router_config(&config));

    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!("    curl http://{}/stat", addr);
    info!("    curl http://{}/r300x200,q85/<key>", addr);
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Check that the bucket exists and is reachable.
async fn test_s3_connection(client: &aws_sdk_s3::Client, bucket: &str) -> Result<(), String> {
    client
        .head_bucket()
        .bucket(bucket)
        .send()
        .await
        .map_err(|e| format!("{}", e))?;
    Ok(())
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "imgserv=debug,tower_http=debug"
    } else {
        "imgserv=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new().with_cache_max_age(config.cache_max_age);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config.with_tracing(!config.no_tracing)
}

// =============================================================================
// Sign Command
// =============================================================================

fn run_sign(config: SignConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let verifier = SignatureVerifier::t3(config.secret);
    println!("{}", verifier.sign(&config.path));

    ExitCode::SUCCESS
}

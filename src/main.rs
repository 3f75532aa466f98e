use std::{future::IntoFuture, process, sync::Arc};

use reelcache::{
    application::{
        blobs::BlobResolver,
        context::{OriginEndpoints, PipelineContext},
        error::AppError,
        jobs::{sweep_monitor, sweep_plan},
        reconcile::{Reconciler, SweepReport},
        resolver::ReadThroughResolver,
    },
    cache::{CacheConfig, FastCache, MemoryCache, RedisCache},
    config::{self, ReconcileArgs},
    infra::{
        blobs::FsBlobStore,
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        origin::HttpOrigin,
        telemetry,
    },
};
use tokio::sync::Notify;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Reconcile(args) => run_reconcile(settings, args).await,
    }
}

struct Pipeline {
    repositories: PostgresRepositories,
    resolver: Arc<ReadThroughResolver>,
    blobs: Arc<BlobResolver>,
    reconciler: Reconciler,
}

async fn build_pipeline(settings: &config::Settings) -> Result<Pipeline, AppError> {
    let pool = PostgresRepositories::connect(
        &settings.database.url,
        settings.database.max_connections.get(),
        settings.database.acquire_timeout,
    )
    .await
    .map_err(|err| InfraError::database(err.to_string()))?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| InfraError::database(format!("migrations failed: {err}")))?;
    let repositories = PostgresRepositories::new(pool);

    let cache = init_fast_cache(settings).await?;
    let blob_store = FsBlobStore::new(&settings.blobs.directory, &settings.blobs.container);
    let origin = HttpOrigin::new(settings.origin.timeout)?;

    let ctx = PipelineContext::new(
        cache,
        Arc::new(repositories.clone()),
        Arc::new(blob_store),
        Arc::new(origin),
        CacheConfig::from(&settings.cache),
        OriginEndpoints {
            api_base: settings.origin.api_base.clone(),
            image_host: settings.origin.image_host.clone(),
        },
    );

    let resolver = Arc::new(ReadThroughResolver::new(ctx.clone()));
    let blobs = Arc::new(BlobResolver::new(ctx));
    let reconciler = Reconciler::new(resolver.clone(), blobs.clone());

    Ok(Pipeline {
        repositories,
        resolver,
        blobs,
        reconciler,
    })
}

async fn init_fast_cache(settings: &config::Settings) -> Result<Arc<dyn FastCache>, AppError> {
    match settings.cache.redis_url.as_deref() {
        Some(url) => {
            let redis = RedisCache::connect(url)
                .await
                .map_err(|err| InfraError::cache(err.to_string()))?;
            redis
                .ping()
                .await
                .map_err(|err| InfraError::cache(format!("redis ping failed: {err}")))?;
            info!(target = "reelcache::bootstrap", "fast cache backed by redis");
            Ok(Arc::new(redis))
        }
        None => {
            warn!(
                target = "reelcache::bootstrap",
                "no redis url configured; fast cache is process-local"
            );
            Ok(Arc::new(MemoryCache::new()))
        }
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let pipeline = build_pipeline(&settings).await?;

    let monitor_handle = if settings.reconcile.enabled {
        let plan = sweep_plan(
            &settings.reconcile.tag_schedule,
            &settings.reconcile.blob_schedule,
        )
        .map_err(|err| AppError::validation(err.to_string()))?;
        let monitor = sweep_monitor(&pipeline.reconciler, plan);
        Some(tokio::spawn(async move {
            if let Err(err) = monitor.run().await {
                error!(error = %err, "sweep monitor stopped");
            }
        }))
    } else {
        info!(target = "reelcache::bootstrap", "scheduled sweeps disabled");
        None
    };

    let state = HttpState {
        resolver: pipeline.resolver,
        blobs: pipeline.blobs,
        repositories: Some(pipeline.repositories),
    };
    let result = serve_http(&settings, state).await;

    if let Some(handle) = monitor_handle {
        handle.abort();
        let _ = handle.await;
    }

    result
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;
    info!(
        target = "reelcache::bootstrap",
        addr = %settings.server.addr,
        "listening"
    );

    let shutdown = Arc::new(Notify::new());
    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown({
        let shutdown = shutdown.clone();
        async move { shutdown.notified().await }
    });
    let grace = settings.server.graceful_shutdown;

    tokio::select! {
        result = server.into_future() => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = async {
            shutdown_signal().await;
            shutdown.notify_one();
            tokio::time::sleep(grace).await;
        } => {
            warn!(
                target = "reelcache::bootstrap",
                grace_secs = grace.as_secs(),
                "in-flight requests did not drain before the shutdown deadline"
            );
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!(target = "reelcache::bootstrap", "shutdown signal received");
}

async fn run_reconcile(settings: config::Settings, args: ReconcileArgs) -> Result<(), AppError> {
    let pipeline = build_pipeline(&settings).await?;
    let mut total = SweepReport::default();

    if args.run_tags() {
        total.merge(pipeline.reconciler.sweep_all_tags().await);
    }
    if args.run_blobs() {
        total.merge(pipeline.reconciler.sweep_blobs().await);
    }

    info!(target = "reelcache::reconcile", report = %total, "reconciliation finished");
    Ok(())
}

use tour_booking_reservation::adapter::driven::{
    InMemoryReservationStore, LoggingNotifier, MySqlHoldLedger, MySqlInventoryRepository,
    TracingLogger,
};
use tour_booking_reservation::adapter::driver::rest_api::{create_router, AppStateInner};
use tour_booking_reservation::adapter::{AppConfig, DatabaseConfig, DatabaseMigration, StoreKind};
use tour_booking_reservation::application::{
    ExpirySweeper, HoldPolicy, InventoryApplicationService, RateLimiter, ReservationService,
    SettlementService,
};
use tour_booking_reservation::domain::port::{HoldLedger, InventoryRepository, Logger, Notifier};

use sqlx::mysql::MySqlPoolOptions;
use std::sync::Arc;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .envファイルから環境変数を読み込む
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!(store = ?config.store, addr = %config.server_addr, "設定を読み込みました");

    let (inventory_repository, hold_ledger) = build_store(config.store).await?;

    let logger: Arc<dyn Logger> = Arc::new(TracingLogger::new());
    let notifier: Arc<dyn Notifier> = Arc::new(LoggingNotifier::new());
    let policy = HoldPolicy::from_std(config.hold_duration, config.max_hold_duration)?;

    let reservation_service = ReservationService::new(
        inventory_repository.clone(),
        hold_ledger.clone(),
        notifier.clone(),
        logger.clone(),
        policy,
    );
    let inventory_service = InventoryApplicationService::new(inventory_repository, logger.clone());
    let settlement_service =
        SettlementService::new(hold_ledger.clone(), notifier.clone(), logger.clone());
    let sweeper = Arc::new(ExpirySweeper::new(
        hold_ledger,
        notifier,
        logger,
        config.sweep_batch_size,
    ));
    let rate_limiter = Arc::new(RateLimiter::new(
        config.rate_limit_max_requests,
        config.rate_limit_window,
    ));

    // バックグラウンドタスク（スイーパー・レート制限の掃除）を起動
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper_task = tokio::spawn(
        sweeper
            .clone()
            .run(config.sweep_interval, shutdown_rx.clone()),
    );
    let eviction_task = tokio::spawn(rate_limiter.clone().run_eviction(shutdown_rx));

    // アプリケーション状態を作成
    let app_state = AppStateInner {
        reservation_service: Arc::new(reservation_service),
        inventory_service: Arc::new(inventory_service),
        settlement_service: Arc::new(settlement_service),
        sweeper,
        rate_limiter,
    };

    // REST APIルーターを作成
    let app = create_router()
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(app_state);

    // サーバーを起動
    let listener = tokio::net::TcpListener::bind(config.server_addr).await?;
    tracing::info!(addr = %config.server_addr, "REST APIサーバーが起動しました");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // バックグラウンドタスクを停止
    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(sweeper_task, eviction_task);
    tracing::info!("シャットダウンしました");

    Ok(())
}

async fn build_store(
    store: StoreKind,
) -> Result<(Arc<dyn InventoryRepository>, Arc<dyn HoldLedger>), Box<dyn std::error::Error>> {
    match store {
        StoreKind::MySql => {
            let db_config = DatabaseConfig::from_env()?;
            tracing::info!(database = %db_config.display_target(), "データベースに接続します");

            let pool = MySqlPoolOptions::new()
                .max_connections(db_config.max_connections)
                .connect(&db_config.connection_string())
                .await?;

            DatabaseMigration::new(pool.clone()).run().await?;

            let inventory: Arc<dyn InventoryRepository> =
                Arc::new(MySqlInventoryRepository::new(pool.clone()));
            let ledger: Arc<dyn HoldLedger> = Arc::new(MySqlHoldLedger::new(pool));
            Ok((inventory, ledger))
        }
        StoreKind::Memory => {
            tracing::warn!("インメモリストアを使用します（再起動でデータは失われます）");
            let store = InMemoryReservationStore::new();
            let inventory: Arc<dyn InventoryRepository> = Arc::new(store.clone());
            let ledger: Arc<dyn HoldLedger> = Arc::new(store);
            Ok((inventory, ledger))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl-Cハンドラーを登録できませんでした");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERMハンドラーを登録できませんでした");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("シャットダウン信号を受信しました");
}

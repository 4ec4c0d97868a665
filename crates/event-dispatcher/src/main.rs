//! 事件分发器入口

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{error, info};

use cashback_bulk_pipeline::BulkRunner;
use cashback_dispatcher::{
    BulkHandler, CancelHandler, CreditHandler, DebitHandler, Dispatcher, HandlerRegistry,
    PromoteHandler, RefundHandler,
};
use cashback_ledger::LedgerService;
use cashback_ledger::collaborators::{
    HttpAnalyticsSink, HttpEmailNotifier, HttpEngagementPlatform, HttpOrderDirectory,
};
use cashback_shared::config::AppConfig;
use cashback_shared::database::Database;
use cashback_shared::events::Topic;
use cashback_shared::observability::init_tracing;
use cashback_shared::queue::EventQueue;
use cashback_shared::storage::ObjectStorage;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load("dispatcher")?;
    init_tracing(&config.service_name, &config.observability);

    info!(environment = %config.environment, "事件分发器启动中");

    let database = Database::connect(&config.database).await?;
    let queue = EventQueue::connect(&config.queue).await;
    let storage = ObjectStorage::connect(&config.storage).await;

    let analytics = Arc::new(HttpAnalyticsSink::new(config.analytics.clone()));
    let engagement = Arc::new(HttpEngagementPlatform::new(config.engagement.clone()));
    let directory = Arc::new(HttpOrderDirectory::new(config.directory.clone()));
    let email = Arc::new(HttpEmailNotifier::new(config.email.clone()));

    let ledger = Arc::new(LedgerService::new(
        database.pool().clone(),
        analytics,
        engagement,
    ));
    let runner = Arc::new(BulkRunner::new(
        database.pool().clone(),
        storage,
        ledger.clone(),
        email,
        config.email.clone(),
        config.bulk.clone(),
    ));

    let registry = HandlerRegistry::new()
        .register(Topic::OrderCreate, Arc::new(CreditHandler::new(ledger.clone())))
        .register(
            Topic::OrderDelivered,
            Arc::new(PromoteHandler::new(ledger.clone())),
        )
        .register(
            Topic::CashbackUtilised,
            Arc::new(DebitHandler::new(ledger.clone(), directory.clone())),
        )
        .register(Topic::OrderCancel, Arc::new(CancelHandler::new(ledger.clone())))
        .register(
            Topic::CashbackRefund,
            Arc::new(RefundHandler::new(ledger.clone(), directory)),
        )
        .register(Topic::BulkDistribution, Arc::new(BulkHandler::new(runner)));

    let dispatcher = Dispatcher::new(
        queue,
        registry,
        database.pool().clone(),
        config.dispatcher.default_concurrency,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "监听停机信号失败");
        }
        let _ = shutdown_tx.send(true);
    });

    dispatcher.run(shutdown_rx).await?;

    database.close().await;
    info!("事件分发器已退出");
    Ok(())
}

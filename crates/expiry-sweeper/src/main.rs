//! 过期清扫任务入口
//!
//! 按 cron 表达式周期执行一轮清扫（默认 IST 凌晨，对应 UTC 的
//! 01:30 之前），`run_once` 配置打开时执行一轮即退出，便于运维
//! 手动补跑。清扫本身幂等，错过或重复执行都无害。

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use cron::Schedule;
use tracing::{error, info};

use cashback_ledger::ExpirySweeper;
use cashback_ledger::collaborators::{HttpAnalyticsSink, HttpEngagementPlatform};
use cashback_shared::config::AppConfig;
use cashback_shared::database::Database;
use cashback_shared::observability::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load("sweeper")?;
    init_tracing(&config.service_name, &config.observability);

    info!(environment = %config.environment, "过期清扫任务启动中");

    let database = Database::connect(&config.database).await?;
    let analytics = Arc::new(HttpAnalyticsSink::new(config.analytics.clone()));
    let engagement = Arc::new(HttpEngagementPlatform::new(config.engagement.clone()));

    let sweeper = ExpirySweeper::new(
        database.pool().clone(),
        config.sweeper.batch_size,
        analytics,
        engagement,
    );

    if config.sweeper.run_once {
        let summary = sweeper.run_once(Utc::now()).await?;
        info!(expired = summary.expired, "单次清扫完成，退出");
        database.close().await;
        return Ok(());
    }

    let schedule = Schedule::from_str(&config.sweeper.schedule)
        .with_context(|| format!("无效的 cron 表达式: {}", config.sweeper.schedule))?;

    loop {
        let Some(next) = schedule.upcoming(Utc).next() else {
            anyhow::bail!("cron 表达式没有下一次触发时间: {}", config.sweeper.schedule);
        };
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        info!(next = %next, "等待下一轮清扫");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                match sweeper.run_once(Utc::now()).await {
                    Ok(summary) => info!(
                        scanned = summary.scanned,
                        expired = summary.expired,
                        skipped = summary.skipped,
                        amount = summary.amount_expired,
                        "本轮清扫完成"
                    ),
                    // 失败不退出，下一轮调度还会重试
                    Err(e) => error!(error = %e, "本轮清扫失败"),
                }
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!(error = %e, "监听停机信号失败");
                }
                info!("收到停机信号，退出");
                break;
            }
        }
    }

    database.close().await;
    Ok(())
}

//! 批量发放执行
//!
//! 行按批次聚合后并发执行：外层信号量限制同时在跑的批次数，
//! 批次内再用内层信号量限制行并发。在途批次达到外层并发的
//! 三倍时先等它们全部收尾再继续读流，整条管道的内存占用与
//! 并发度都有上界。

use std::sync::Arc;

use aws_sdk_s3::primitives::ByteStream;
use futures::future::join_all;
use sqlx::PgPool;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use cashback_ledger::LedgerService;
use cashback_ledger::collaborators::EmailNotifier;
use cashback_ledger::service::DistributionRequest;
use cashback_shared::config::{BulkConfig, EmailConfig};
use cashback_shared::error::{LedgerError, Result};

use crate::csv::{CsvReader, resolve_columns, split_fields};
use crate::jobs::JobRepository;
use crate::row::{BulkRow, RowFailure, parse_row};

/// 失败样本保留上限
pub const MAX_FAILED_SAMPLES: usize = 50;

/// 在途批次达到外层并发的该倍数时等待收尾
const FLUSH_MULTIPLIER: usize = 3;

/// BULK_DISTRIBUTION 事件的载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkJobPayload {
    pub job_id: Uuid,
    pub bucket: String,
    pub object_key: String,
}

/// 汇总结果
#[derive(Debug, Clone, Default)]
pub struct BulkSummary {
    pub total_rows: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failed_samples: Vec<RowFailure>,
}

impl BulkSummary {
    fn record_failure(&mut self, failure: RowFailure) {
        self.failed += 1;
        if self.failed_samples.len() < MAX_FAILED_SAMPLES {
            self.failed_samples.push(failure);
        }
    }
}

/// 单行发放的执行方
///
/// 生产实现是账本服务的手工发放；测试用插桩实现验证并发边界
/// 与行隔离。
#[async_trait]
pub trait RowDistributor: Send + Sync {
    async fn distribute_row(&self, row: &BulkRow, source_ref: &str) -> Result<()>;
}

#[async_trait]
impl RowDistributor for LedgerService {
    async fn distribute_row(&self, row: &BulkRow, source_ref: &str) -> Result<()> {
        let request = DistributionRequest {
            phone: row.phone.clone(),
            amount: row.amount,
            expires_on: row.expires_on,
            source_ref: source_ref.to_string(),
        };
        match self.distribute(&request).await {
            Ok(_) => Ok(()),
            // 任务重跑时已发放的行直接视为成功
            Err(LedgerError::DuplicateOperation { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// 消费整个对象流，返回汇总结果
///
/// 行级幂等引用为 "{job_id}:{row_index}"，任务中断重跑不会重复发放。
#[instrument(skip(stream, distributor, config))]
pub async fn process_stream<D: RowDistributor + 'static>(
    job_id: Uuid,
    stream: ByteStream,
    distributor: Arc<D>,
    config: &BulkConfig,
) -> Result<BulkSummary> {
    let mut reader = CsvReader::new(stream);

    let header = reader
        .next_line()
        .await?
        .ok_or_else(|| LedgerError::Validation("文件为空".to_string()))?;
    let columns = resolve_columns(&split_fields(&header))?;

    let outer = Arc::new(Semaphore::new(config.outer_concurrency));
    let flush_at = config.outer_concurrency * FLUSH_MULTIPLIER;

    let mut summary = BulkSummary::default();
    let mut batch: Vec<BulkRow> = Vec::with_capacity(config.batch_size);
    let mut in_flight: Vec<JoinHandle<(usize, Vec<RowFailure>)>> = Vec::new();
    let mut row_index = 0_usize;

    while let Some(line) = reader.next_line().await? {
        if line.is_empty() {
            continue;
        }
        summary.total_rows += 1;

        match parse_row(row_index, &split_fields(&line), &columns) {
            Ok(row) => batch.push(row),
            Err(failure) => summary.record_failure(failure),
        }
        row_index += 1;

        if batch.len() >= config.batch_size {
            in_flight.push(
                spawn_batch(
                    job_id,
                    std::mem::take(&mut batch),
                    distributor.clone(),
                    outer.clone(),
                    config.inner_concurrency,
                )
                .await?,
            );
            batch = Vec::with_capacity(config.batch_size);

            // 在途批次太多时先收尾，避免无界堆积
            if in_flight.len() >= flush_at {
                drain_batches(&mut in_flight, &mut summary).await;
            }
        }
    }

    if !batch.is_empty() {
        in_flight.push(
            spawn_batch(
                job_id,
                batch,
                distributor.clone(),
                outer.clone(),
                config.inner_concurrency,
            )
            .await?,
        );
    }
    drain_batches(&mut in_flight, &mut summary).await;

    info!(
        %job_id,
        total = summary.total_rows,
        succeeded = summary.succeeded,
        failed = summary.failed,
        "批量发放流消费完成"
    );

    Ok(summary)
}

/// 占住一个外层并发额度后把批次丢进后台执行
async fn spawn_batch<D: RowDistributor + 'static>(
    job_id: Uuid,
    rows: Vec<BulkRow>,
    distributor: Arc<D>,
    outer: Arc<Semaphore>,
    inner_concurrency: usize,
) -> Result<JoinHandle<(usize, Vec<RowFailure>)>> {
    let permit = outer
        .acquire_owned()
        .await
        .map_err(|e| LedgerError::Internal(format!("外层信号量已关闭: {e}")))?;

    Ok(tokio::spawn(async move {
        let _permit = permit;
        run_batch(job_id, rows, distributor, inner_concurrency).await
    }))
}

/// 批次内按内层并发逐行发放，返回 (成功数, 失败样本)
async fn run_batch<D: RowDistributor>(
    job_id: Uuid,
    rows: Vec<BulkRow>,
    distributor: Arc<D>,
    inner_concurrency: usize,
) -> (usize, Vec<RowFailure>) {
    let inner = Arc::new(Semaphore::new(inner_concurrency));

    let futures = rows.iter().map(|row| {
        let inner = inner.clone();
        let distributor = distributor.clone();
        async move {
            let Ok(_permit) = inner.acquire().await else {
                return Err(RowFailure {
                    row_index: row.row_index,
                    reason: "内层信号量已关闭".to_string(),
                });
            };
            let source_ref = format!("{job_id}:{}", row.row_index);
            distributor
                .distribute_row(row, &source_ref)
                .await
                .map_err(|e| RowFailure {
                    row_index: row.row_index,
                    reason: e.to_string(),
                })
        }
    });

    let mut succeeded = 0;
    let mut failures = Vec::new();
    for result in join_all(futures).await {
        match result {
            Ok(()) => succeeded += 1,
            Err(failure) => failures.push(failure),
        }
    }

    (succeeded, failures)
}

/// 等待全部在途批次并合并结果
async fn drain_batches(
    in_flight: &mut Vec<JoinHandle<(usize, Vec<RowFailure>)>>,
    summary: &mut BulkSummary,
) {
    for result in join_all(in_flight.drain(..)).await {
        match result {
            Ok((succeeded, failures)) => {
                summary.succeeded += succeeded;
                for failure in failures {
                    summary.record_failure(failure);
                }
            }
            Err(e) => {
                // 批次任务本身 panic：行数已无从归属，只记日志
                warn!(error = %e, "批次任务异常退出");
            }
        }
    }
}

/// 批量任务执行器：任务记录流转 + 流式发放 + 摘要邮件
pub struct BulkRunner {
    pool: PgPool,
    storage: cashback_shared::storage::ObjectStorage,
    ledger: Arc<LedgerService>,
    email: Arc<dyn EmailNotifier>,
    email_config: EmailConfig,
    bulk_config: BulkConfig,
}

impl BulkRunner {
    pub fn new(
        pool: PgPool,
        storage: cashback_shared::storage::ObjectStorage,
        ledger: Arc<LedgerService>,
        email: Arc<dyn EmailNotifier>,
        email_config: EmailConfig,
        bulk_config: BulkConfig,
    ) -> Self {
        Self {
            pool,
            storage,
            ledger,
            email,
            email_config,
            bulk_config,
        }
    }

    /// 执行一个批量任务直到完成或整体失败
    #[instrument(skip(self, payload), fields(job_id = %payload.job_id))]
    pub async fn run(&self, payload: &BulkJobPayload) -> Result<BulkSummary> {
        JobRepository::mark_running(&self.pool, payload.job_id).await?;

        let result = match self
            .storage
            .get_stream(&payload.bucket, &payload.object_key)
            .await
        {
            Ok(stream) => {
                process_stream(
                    payload.job_id,
                    stream,
                    self.ledger.clone(),
                    &self.bulk_config,
                )
                .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(summary) => {
                JobRepository::complete(&self.pool, payload.job_id, &summary).await?;
                self.send_summary(payload.job_id, &summary).await;
                Ok(summary)
            }
            Err(e) => {
                JobRepository::fail(&self.pool, payload.job_id, &e.to_string()).await?;
                Err(e)
            }
        }
    }

    /// best-effort 摘要邮件，限时发送，失败与超时都不影响任务结果
    async fn send_summary(&self, job_id: Uuid, summary: &BulkSummary) {
        let subject = format!("批量发放任务 {job_id} 完成");
        let mut body = format!(
            "总行数: {}\n成功: {}\n失败: {}\n",
            summary.total_rows, summary.succeeded, summary.failed
        );
        for sample in &summary.failed_samples {
            body.push_str(&format!("行 {}: {}\n", sample.row_index, sample.reason));
        }

        let timeout = std::time::Duration::from_secs(self.email_config.timeout_seconds);
        match tokio::time::timeout(
            timeout,
            self.email.send(&self.email_config.summary_to, &subject, &body),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(%job_id, error = %e, "摘要邮件发送失败（忽略）"),
            Err(_) => warn!(%job_id, "摘要邮件发送超时（忽略）"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(batch: usize, outer: usize, inner: usize) -> BulkConfig {
        BulkConfig {
            batch_size: batch,
            outer_concurrency: outer,
            inner_concurrency: inner,
        }
    }

    /// 全部成功的插桩发放方
    struct AlwaysOk;

    #[async_trait]
    impl RowDistributor for AlwaysOk {
        async fn distribute_row(&self, _row: &BulkRow, _source_ref: &str) -> Result<()> {
            Ok(())
        }
    }

    /// 统计瞬时并发峰值的插桩发放方
    struct ConcurrencyProbe {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ConcurrencyProbe {
        fn new() -> Self {
            Self {
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RowDistributor for ConcurrencyProbe {
        async fn distribute_row(&self, _row: &BulkRow, _source_ref: &str) -> Result<()> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// 生成 1000 行 CSV，指定行号填入非法手机号
    fn csv_with_bad_rows(total: usize, bad: &[usize]) -> ByteStream {
        let mut data = String::from("phone,amount,expiry\n");
        for i in 0..total {
            if bad.contains(&i) {
                data.push_str("1234567890,50,2026-12-31\n");
            } else {
                // 行号编进手机号，保证各行互不相同
                data.push_str(&format!("98765{i:05},50,2026-12-31\n"));
            }
        }
        ByteStream::from(data.into_bytes())
    }

    #[tokio::test]
    async fn test_row_failures_are_isolated() {
        // 1000 行，第 5/200/999 行手机号非法
        let stream = csv_with_bad_rows(1000, &[5, 200, 999]);

        let summary = process_stream(
            Uuid::new_v4(),
            stream,
            Arc::new(AlwaysOk),
            &config(100, 3, 5),
        )
        .await
        .unwrap();

        assert_eq!(summary.total_rows, 1000);
        assert_eq!(summary.succeeded, 997);
        assert_eq!(summary.failed, 3);

        let mut indices: Vec<usize> = summary
            .failed_samples
            .iter()
            .map(|s| s.row_index)
            .collect();
        indices.sort_unstable();
        assert_eq!(indices, vec![5, 200, 999]);
    }

    #[tokio::test]
    async fn test_failed_samples_capped() {
        // 100 行全部非法，样本只留前 50 条，计数仍是全量
        let stream = csv_with_bad_rows(100, &(0..100).collect::<Vec<_>>());

        let summary = process_stream(
            Uuid::new_v4(),
            stream,
            Arc::new(AlwaysOk),
            &config(10, 2, 5),
        )
        .await
        .unwrap();

        assert_eq!(summary.failed, 100);
        assert_eq!(summary.failed_samples.len(), MAX_FAILED_SAMPLES);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_stays_bounded() {
        let probe = Arc::new(ConcurrencyProbe::new());
        let stream = csv_with_bad_rows(600, &[]);

        let cfg = config(50, 3, 5);
        process_stream(Uuid::new_v4(), stream, probe.clone(), &cfg)
            .await
            .unwrap();

        let peak = probe.peak.load(Ordering::SeqCst);
        assert!(peak >= 1);
        // 峰值不超过外层 x 内层
        assert!(
            peak <= cfg.outer_concurrency * cfg.inner_concurrency,
            "peak = {peak}"
        );
    }

    #[tokio::test]
    async fn test_empty_file_is_rejected() {
        let stream = ByteStream::from(Vec::new());
        let err = process_stream(Uuid::new_v4(), stream, Arc::new(AlwaysOk), &config(10, 2, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[tokio::test]
    async fn test_header_without_required_columns() {
        let stream = ByteStream::from(b"name,city\nfoo,bar\n".to_vec());
        let err = process_stream(Uuid::new_v4(), stream, Arc::new(AlwaysOk), &config(10, 2, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }
}

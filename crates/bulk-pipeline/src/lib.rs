//! 批量发放管道
//!
//! 从对象存储增量读取 CSV（整个文件从不一次性载入内存），逐行
//! 校验后按批次并发发放。单行失败只影响该行，汇总结果写回任务
//! 记录并以邮件摘要通知运营。

mod csv;
mod jobs;
mod pipeline;
mod row;

pub use csv::{ColumnMap, CsvReader, resolve_columns, split_fields};
pub use jobs::{BulkJob, JobRepository, JobStatus};
pub use pipeline::{
    BulkJobPayload, BulkRunner, BulkSummary, MAX_FAILED_SAMPLES, RowDistributor, process_stream,
};
pub use row::{BulkRow, RowFailure, parse_row};

//! 对象存储封装（AWS S3）
//!
//! 批量发放管道从这里取得行式文件的字节流，逐块消费，
//! 从不把整个文件读入内存。

use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use tracing::info;

use crate::config::StorageConfig;
use crate::error::{LedgerError, Result};

/// S3 对象存储封装
#[derive(Clone)]
pub struct ObjectStorage {
    client: Client,
}

impl ObjectStorage {
    /// 创建存储客户端
    ///
    /// `endpoint_url` 配置后启用 path-style 访问，兼容 MinIO 等
    /// S3 协议实现。
    pub async fn connect(config: &StorageConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(ref region) = config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }

        let aws_config = loader.load().await;

        let client = match config.endpoint_url {
            Some(ref endpoint) => {
                let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
                    .endpoint_url(endpoint)
                    .force_path_style(true)
                    .build();
                Client::from_conf(s3_config)
            }
            None => Client::new(&aws_config),
        };

        info!("S3 存储客户端已创建");

        Self { client }
    }

    /// 获取对象的字节流
    pub async fn get_stream(&self, bucket: &str, key: &str) -> Result<ByteStream> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                LedgerError::external("s3", format!("读取对象失败 {bucket}/{key}: {e}"))
            })?;

        Ok(output.body)
    }
}

//! 仓库同步器
//!
//! 启动与周期定时器上向对端发 RequestConfig；收到 RequestConfig 时回以
//! 非空全量快照；收到 AdvertiseConfig 时逐条合并且不再转发（防回声风暴）。
//! 本地发起的修改经 apply_local_update 进入，合并后立即全量广告。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::AntError;
use crate::external::SyncChannel;
use crate::repository::{Item, Repository};
use crate::sync::{SyncAction, SyncEnvelope};

pub struct RepositorySynchronizer {
    namespace: String,
    repository: Arc<Repository>,
    channel: Arc<dyn SyncChannel>,
}

impl RepositorySynchronizer {
    pub fn new(
        namespace: impl Into<String>,
        repository: Arc<Repository>,
        channel: Arc<dyn SyncChannel>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            repository,
            channel,
        }
    }

    /// 请求所有对端广告其配置（重启或迟到加入后收敛用）
    pub async fn request_remote_configs(&self) -> Result<(), AntError> {
        self.channel
            .publish(SyncEnvelope::new(
                self.namespace.clone(),
                SyncAction::RequestConfig,
            ))
            .await
    }

    /// 广告全量仓库快照；空仓库不发送
    pub async fn advertise(&self) -> Result<(), AntError> {
        let snapshot = self.repository.flatten().await;
        if snapshot.is_empty() {
            tracing::debug!("Repository is empty, skipping advertisement");
            return Ok(());
        }
        tracing::info!("Advertising {} items to other namespaces", snapshot.len());
        let payload = serde_json::to_value(snapshot)?;
        self.channel
            .publish(
                SyncEnvelope::new(self.namespace.clone(), SyncAction::AdvertiseConfig)
                    .with_payload(payload),
            )
            .await
    }

    /// 本地发起的批量修改：合并后立即广告，失败条目返回给调用方
    pub async fn apply_local_update(&self, items: Vec<Item>) -> Vec<Item> {
        let failed = self.repository.update_batch(items, false).await;
        if let Err(e) = self.advertise().await {
            tracing::warn!("Advertisement after local update failed: {}", e);
        }
        failed
    }

    /// 处理一条入站同步消息（传输层可能回送自身消息，按命名空间过滤）
    pub async fn handle(&self, envelope: SyncEnvelope) -> Result<(), AntError> {
        if envelope.namespace == self.namespace {
            return Ok(());
        }
        match envelope.action {
            SyncAction::RequestConfig => self.advertise().await,
            SyncAction::AdvertiseConfig => {
                let items: Vec<Item> = serde_json::from_value(envelope.payload)?;
                tracing::debug!(
                    "Received a payload of {} items from '{}'",
                    items.len(),
                    envelope.namespace
                );
                // 合并来自其他命名空间的状态，不触发再广告
                let failed = self.repository.update_batch(items, false).await;
                if !failed.is_empty() {
                    tracing::warn!(
                        "{} items from '{}' could not be merged",
                        failed.len(),
                        envelope.namespace
                    );
                }
                Ok(())
            }
            SyncAction::RemoveConfig => {
                tracing::debug!(
                    "Ignoring RemoveConfig on the repository channel from '{}'",
                    envelope.namespace
                );
                Ok(())
            }
        }
    }

    /// 同步主循环：周期性 RequestConfig（首个 tick 立即触发，覆盖启动时请求）
    /// 与入站消息处理，直到取消信号。
    pub async fn run(
        self: Arc<Self>,
        mut inbound: mpsc::UnboundedReceiver<SyncEnvelope>,
        request_interval: Duration,
        shutdown: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(request_interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!("Repository synchronizer stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.request_remote_configs().await {
                        tracing::warn!("RequestConfig publication failed: {}", e);
                    }
                }
                received = inbound.recv() => {
                    match received {
                        Some(envelope) => {
                            if let Err(e) = self.handle(envelope).await {
                                tracing::warn!("Sync message handling failed: {}", e);
                            }
                        }
                        None => break, // 传输端关闭
                    }
                }
            }
        }
    }
}

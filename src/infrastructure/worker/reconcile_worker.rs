//! Reconcile Worker - 文件事件分发
//!
//! 按路径哈希把事件分到固定数量的通道：同一路径的事件严格按到达顺序处理，
//! 不同路径并行。重命名按源路径分区，目标路径上的事件由引擎的路径锁串行化。

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::FileEvent;
use crate::application::{ReconcileError, Reconciler};

/// Worker 配置
#[derive(Debug, Clone)]
pub struct ReconcileWorkerConfig {
    /// 并行通道数
    pub workers: usize,
    /// 每个通道的队列容量
    pub lane_capacity: usize,
}

impl Default for ReconcileWorkerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            lane_capacity: 256,
        }
    }
}

/// 协调 Worker
///
/// 从监听器队列消费事件，交给 Reconciler 处理；只记录失败
pub struct ReconcileWorker {
    config: ReconcileWorkerConfig,
    queue_receiver: mpsc::Receiver<FileEvent>,
    reconciler: Reconciler,
    shutdown: CancellationToken,
}

impl ReconcileWorker {
    pub fn new(
        config: ReconcileWorkerConfig,
        queue_receiver: mpsc::Receiver<FileEvent>,
        reconciler: Reconciler,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            queue_receiver,
            reconciler,
            shutdown,
        }
    }

    /// 启动 Worker，直到队列关闭或收到停止信号
    ///
    /// 停止时已分发到通道的事件会处理完再返回。
    pub async fn run(mut self) {
        let workers = self.config.workers.max(1);
        tracing::info!(workers, "ReconcileWorker started");

        let mut lanes = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for lane in 0..workers {
            let (tx, rx) = mpsc::channel(self.config.lane_capacity.max(1));
            lanes.push(tx);
            handles.push(tokio::spawn(Self::run_lane(
                lane,
                rx,
                self.reconciler.clone(),
            )));
        }

        loop {
            let event = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                event = self.queue_receiver.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            let lane = event.partition(workers);
            if lanes[lane].send(event).await.is_err() {
                tracing::error!(lane, "Reconcile lane closed unexpectedly");
                break;
            }
        }

        drop(lanes);
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Reconcile lane panicked");
            }
        }

        tracing::info!("ReconcileWorker stopped");
    }

    async fn run_lane(lane: usize, mut rx: mpsc::Receiver<FileEvent>, reconciler: Reconciler) {
        while let Some(event) = rx.recv().await {
            tracing::debug!(lane, event = %event, "Reconciling");
            // 成功的结果由引擎记录并广播
            match reconciler.handle(event).await {
                Ok(_) => {}
                Err(ReconcileError::Storage(e)) => {
                    tracing::error!(lane, error = %e, "Storage failure, path state unchanged");
                }
                Err(e) => {
                    tracing::error!(lane, error = %e, "Reconcile failed");
                }
            }
        }
    }
}

use std::time::Duration;

use tokio::signal;
use tracing::{error, info, warn};

use crate::postback::DeliveryExecutor;

/// 等待 Ctrl+C 后停止重试调度，并在超时内等待在途投递完成
///
/// 关闭期间完成的尝试仍会写入重试队列，重启后继续执行；
/// 超时仍未结束的尝试以相同序号重新入队。
pub async fn listen_for_shutdown(executor: &DeliveryExecutor, drain_timeout: Duration) {
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received, draining in-flight postbacks...");
        }
        Err(e) => {
            warn!(
                "Failed to listen for Ctrl+C: {}. Proceeding with shutdown anyway.",
                e
            );
        }
    }

    executor.shutdown_signal().trigger();

    let pending = executor.in_flight_count();
    if pending > 0 {
        info!("Waiting for {} in-flight postback attempt(s)", pending);
    }

    if executor.wait_idle(drain_timeout).await {
        info!("All in-flight postbacks finished");
    } else {
        let chains = executor.abandon_in_flight().await;
        error!(
            "Postback drain timed out after {:?}, {} attempt(s) requeued: {}",
            drain_timeout,
            chains.len(),
            chains.join(", ")
        );
    }
}

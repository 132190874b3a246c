//! The outbound send worker pool.
//!
//! N pre-spawned workers drain the backend's outgoing queue. Each message
//! is dispatched through the owning handler's `send`, the returned error is
//! classified into a terminal status, and the attempt's ChannelLog is
//! persisted. There is no per-channel serialization: concurrent sends on
//! one channel are expected.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use courier_backend::Backend;
use courier_core::{
    ChannelEvent, ChannelEventType, ChannelLog, ChannelLogType, LogError, MsgOut, MsgStatus,
    SendError, SendResult, StatusUpdate,
};

use crate::server::RuntimeContext;

const IDLE_POLL_DELAY: Duration = Duration::from_millis(500);
const ERROR_POLL_DELAY: Duration = Duration::from_secs(1);

/// Pool of workers draining the outgoing message queue.
pub struct SendWorkerPool {
    workers: usize,
    send_timeout: Duration,
    shutdown_tx: broadcast::Sender<()>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl SendWorkerPool {
    pub fn new(workers: usize, send_timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            workers,
            send_timeout,
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawns the worker tasks.
    pub fn start(&self, ctx: Arc<RuntimeContext>) {
        info!(workers = self.workers, "starting send worker pool");
        let mut handles = self.handles.lock();
        for worker_id in 0..self.workers {
            let ctx = ctx.clone();
            let send_timeout = self.send_timeout;
            let mut shutdown_rx = self.shutdown_tx.subscribe();
            handles.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        popped = ctx.backend.pop_next_outgoing_msg() => match popped {
                            Ok(Some(msg)) => {
                                process_msg(&ctx, msg, send_timeout).await;
                            }
                            Ok(None) => {
                                tokio::select! {
                                    _ = shutdown_rx.recv() => break,
                                    _ = tokio::time::sleep(IDLE_POLL_DELAY) => {}
                                }
                            }
                            Err(e) => {
                                warn!(worker_id, error = %e, "error popping outgoing msg");
                                tokio::select! {
                                    _ = shutdown_rx.recv() => break,
                                    _ = tokio::time::sleep(ERROR_POLL_DELAY) => {}
                                }
                            }
                        }
                    }
                }
                debug!(worker_id, "send worker exited");
            }));
        }
    }

    /// Signals shutdown and waits for in-flight sends to finish.
    pub async fn stop(&self) {
        info!("stopping send worker pool");
        let _ = self.shutdown_tx.send(());
        let handles = {
            let mut guard = self.handles.lock();
            std::mem::take(&mut *guard)
        };
        for handle in handles {
            let _ = handle.await;
        }
    }
}

/// Dispatches one message and persists its status and log.
async fn process_msg(ctx: &RuntimeContext, msg: MsgOut, send_timeout: Duration) {
    let channel = msg.channel.clone();

    let Some(handler) = ctx.registry.get(channel.channel_type().as_str()) else {
        error!(
            channel_type = %channel.channel_type(),
            msg_id = msg.id,
            "no handler registered for channel type"
        );
        let status = StatusUpdate::by_id(&channel, msg.id, MsgStatus::Failed);
        if let Err(e) = ctx.backend.write_status_update(&status).await {
            error!(error = %e, "error writing status for unroutable msg");
        }
        return;
    };

    let mut log = ChannelLog::new(
        ChannelLogType::MsgSend,
        Some(&channel),
        handler.redact_values(&channel),
    );
    let mut result = SendResult::new();

    let handler_ctx = ctx.handler_context();
    let sent = match tokio::time::timeout(
        send_timeout,
        handler.send(&handler_ctx, &msg, &mut result, &mut log),
    )
    .await
    {
        Ok(sent) => sent,
        Err(_) => {
            log.error(LogError::connection("send attempt timed out"));
            Err(SendError::ConnectionFailed)
        }
    };

    let mut stop_event = None;
    let status_value = match &sent {
        Ok(()) => {
            if result.primary_external_id().is_none() {
                log.error(LogError::response_value_missing("external id"));
            }
            MsgStatus::Wired
        }
        Err(SendError::ContactStopped) => {
            log.error(LogError::other("contact has stopped, failing message"));
            stop_event = Some(ChannelEvent::new(
                &channel,
                ChannelEventType::StopContact,
                msg.urn.clone(),
            ));
            MsgStatus::Failed
        }
        Err(SendError::ChannelConfig(key)) => {
            log.error(LogError::channel_config(format!("missing config: {key}")));
            MsgStatus::Failed
        }
        Err(SendError::ConnectionFailed) => {
            log.error(LogError::connection("connection to provider failed"));
            MsgStatus::Errored
        }
        Err(SendError::ResponseStatus(status)) => {
            log.error(LogError::response_status(*status));
            MsgStatus::Errored
        }
        Err(
            e @ (SendError::ResponseContent(_)
            | SendError::ResponseUnexpected(_)
            | SendError::Other(_)),
        ) => {
            log.error(LogError::other(e.to_string()));
            MsgStatus::Errored
        }
    };

    // ids accumulated before a partial failure are kept for correlation
    let mut status = StatusUpdate::by_id(&channel, msg.id, status_value);
    if let Some(external_id) = result.primary_external_id() {
        status = status.with_external_id(external_id);
    }

    debug!(
        msg_id = msg.id,
        channel_type = %channel.channel_type(),
        status = ?status_value,
        external_ids = result.external_ids().len(),
        "send attempt finished"
    );

    if let Err(e) = ctx.backend.write_status_update(&status).await {
        error!(msg_id = msg.id, error = %e, "error writing send status");
    }
    if let Some(event) = stop_event {
        if let Err(e) = ctx.backend.write_channel_event(&event).await {
            error!(msg_id = msg.id, error = %e, "error writing stop contact event");
        }
    }

    log.finalize();
    if let Err(e) = ctx.backend.write_channel_log(&log).await {
        error!(msg_id = msg.id, error = %e, "error writing channel log");
    }
}

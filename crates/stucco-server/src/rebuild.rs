//! Re-running tasks when watched sources change.

use std::sync::Arc;

use stucco_tasks::TaskGraph;
use tokio::sync::mpsc;

use crate::reload::{ReloadHub, ReloadMessage};
use crate::watcher::WatchAction;

/// Carry out one watch action. Browsers are notified only when the task
/// succeeded; a failure is logged and `false` returned.
pub async fn handle_action(graph: &TaskGraph, hub: &ReloadHub, action: WatchAction) -> bool {
    match action {
        WatchAction::Reload => {
            hub.send(ReloadMessage::Reload);
            true
        }
        WatchAction::Run { task, css } => match graph.run(&[task.as_str()]).await {
            Ok(_) => {
                hub.send(if css {
                    ReloadMessage::Css
                } else {
                    ReloadMessage::Reload
                });
                true
            }
            Err(e) => {
                tracing::error!("Rebuild of '{}' failed: {}", task, e);
                false
            }
        },
    }
}

/// Handle actions one at a time until the watcher goes away.
pub async fn rebuild_on_change(
    graph: Arc<TaskGraph>,
    mut rx: mpsc::Receiver<WatchAction>,
    hub: ReloadHub,
) {
    while let Some(action) = rx.recv().await {
        handle_action(&graph, &hub, action).await;
    }
}

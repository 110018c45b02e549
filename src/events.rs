//! Lifecycle events
//!
//! Long-running operations report started/progress/completed through an
//! `EventSink`. The default sink logs through tracing; tests swap in a
//! channel sink and assert on what was emitted.

use serde::{Deserialize, Serialize};

/// Who a stream of events belongs to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventContext {
    pub organization_slug: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub agent_slug: Option<String>,
}

impl EventContext {
    pub fn for_org(org: &str) -> Self {
        Self {
            organization_slug: org.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineEvent {
    Started {
        operation: String,
    },
    Progress {
        operation: String,
        percent: u8,
        message: String,
    },
    Completed {
        operation: String,
        success: bool,
    },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, ctx: &EventContext, event: PipelineEvent);
}

/// Default sink: structured log lines, nothing persisted.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, ctx: &EventContext, event: PipelineEvent) {
        match &event {
            PipelineEvent::Started { operation } => {
                tracing::info!(org = %ctx.organization_slug, operation, "operation started");
            }
            PipelineEvent::Progress {
                operation,
                percent,
                message,
            } => {
                tracing::debug!(
                    org = %ctx.organization_slug,
                    operation,
                    percent,
                    "{}",
                    message
                );
            }
            PipelineEvent::Completed { operation, success } => {
                tracing::info!(
                    org = %ctx.organization_slug,
                    operation,
                    success,
                    "operation completed"
                );
            }
        }
    }
}

/// Test sink: collects events for assertions.
pub struct ChannelSink {
    tx: tokio::sync::mpsc::UnboundedSender<(EventContext, PipelineEvent)>,
}

impl ChannelSink {
    pub fn new() -> (
        Self,
        tokio::sync::mpsc::UnboundedReceiver<(EventContext, PipelineEvent)>,
    ) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, ctx: &EventContext, event: PipelineEvent) {
        // Receiver dropped means nobody is listening; that is fine.
        let _ = self.tx.send((ctx.clone(), event));
    }
}

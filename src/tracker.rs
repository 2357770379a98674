//! Per-pipeline correlation state.
//!
//! A pipeline moves through [`Phase`]s as its notifications arrive, in any
//! order. Each facet of the state lives in its own concurrent map keyed by
//! pipeline id, and the phase is derived from which facets hold the id. Work
//! on one pipeline is serialized by a per-pipeline lock; different pipelines
//! never contend.

use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use log::debug;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::events::{CiEvent, EventType, Parameter};
use crate::hooks::{Notification, PipelineId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing known about the pipeline.
    New,
    /// Events are buffered until the root is published.
    RootPending,
    RootPublished,
    /// The terminal job finished after the root was published.
    TerminalDone,
}

/// The part a notification plays in its pipeline's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    PipelineStart,
    /// Any pipeline notification other than its start.
    PipelineEnd,
    Job {
        /// The pipeline's last job finishing.
        terminal: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Publish the root event, then flush the buffer.
    PublishRoot,
    Buffer,
    /// Flush the buffer, then publish the event.
    Publish,
}

/// The action to take for a notification and the phase it leaves the
/// pipeline in.
pub fn transition(phase: Phase, role: Role) -> (Action, Phase) {
    use Phase::*;

    match (role, phase) {
        // A repeated start overwrites the lifecycle in progress.
        (Role::PipelineStart, _) => (Action::PublishRoot, RootPublished),

        (Role::Job { terminal: true }, RootPublished | TerminalDone) => {
            (Action::Publish, TerminalDone)
        }
        (Role::Job { terminal: true }, New | RootPending) => (Action::Publish, New),

        (Role::Job { terminal: false }, New | RootPending) => (Action::Buffer, RootPending),
        (Role::Job { terminal: false }, published) => (Action::Publish, published),

        (Role::PipelineEnd, New | RootPending) => (Action::Buffer, RootPending),
        (Role::PipelineEnd, RootPublished | TerminalDone) => (Action::Publish, New),
    }
}

/// An event held back until its pipeline's root is published.
#[derive(Debug, Clone)]
pub struct BufferedEvent {
    pub event: CiEvent,
    pub notification: Notification,
}

#[derive(Default)]
pub struct PipelineTracker {
    locks: DashMap<PipelineId, Arc<Mutex<()>>>,
    variables: DashMap<PipelineId, Vec<Parameter>>,
    buffered: DashMap<PipelineId, Vec<BufferedEvent>>,
    last_job: DashMap<PipelineId, String>,
    published_roots: DashSet<PipelineId>,
    completed: DashSet<PipelineId>,
    /// Pipelines whose finish was published while their jobs still ran.
    ended: DashSet<PipelineId>,
}

impl PipelineTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to a pipeline's state.
    pub async fn lock(&self, pipeline_id: PipelineId) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(pipeline_id).or_default().clone();
        lock.lock_owned().await
    }

    /// Gives up access to a pipeline's state, forgetting its lock once the
    /// pipeline holds no state and nobody else waits on it.
    pub fn unlock(&self, pipeline_id: PipelineId, guard: OwnedMutexGuard<()>) {
        drop(guard);
        if self.phase(pipeline_id) == Phase::New
            && !self.variables.contains_key(&pipeline_id)
            && !self.last_job.contains_key(&pipeline_id)
        {
            self.locks
                .remove_if(&pipeline_id, |_, lock| Arc::strong_count(lock) == 1);
        }
    }

    pub fn phase(&self, pipeline_id: PipelineId) -> Phase {
        if self.published_roots.contains(&pipeline_id) {
            Phase::RootPublished
        } else if self.completed.contains(&pipeline_id) {
            Phase::TerminalDone
        } else if self
            .buffered
            .get(&pipeline_id)
            .is_some_and(|events| !events.is_empty())
        {
            Phase::RootPending
        } else {
            Phase::New
        }
    }

    pub fn role(&self, pipeline_id: PipelineId, notification: &Notification) -> Role {
        let event_type = notification.event_type();
        match notification {
            Notification::Pipeline(_) if event_type == EventType::Started => Role::PipelineStart,
            Notification::Pipeline(_) => Role::PipelineEnd,
            _ => Role::Job {
                terminal: event_type == EventType::Finished
                    && notification
                        .build_name()
                        .is_some_and(|name| self.is_last_job(pipeline_id, name)),
            },
        }
    }

    fn is_last_job(&self, pipeline_id: PipelineId, name: &str) -> bool {
        self.last_job
            .get(&pipeline_id)
            .is_some_and(|last| last.as_str() == name)
    }

    #[cfg(test)]
    pub fn last_job(&self, pipeline_id: PipelineId) -> Option<String> {
        self.last_job.get(&pipeline_id).map(|name| name.clone())
    }

    pub fn set_last_job(&self, pipeline_id: PipelineId, name: String) {
        debug!("Pipeline {pipeline_id} ends with job '{name}'");
        self.last_job.insert(pipeline_id, name);
    }

    pub fn capture_variables(&self, pipeline_id: PipelineId, variables: Vec<Parameter>) {
        self.variables.insert(pipeline_id, variables);
    }

    pub fn variables(&self, pipeline_id: PipelineId) -> Option<Vec<Parameter>> {
        self.variables.get(&pipeline_id).map(|vars| vars.clone())
    }

    pub fn buffer(&self, pipeline_id: PipelineId, event: BufferedEvent) {
        let mut events = self.buffered.entry(pipeline_id).or_default();
        events.push(event);
        debug!(
            "Buffered event for pipeline {pipeline_id}, {} waiting",
            events.len()
        );
    }

    /// Takes every buffered event of the pipeline, oldest first.
    pub fn drain(&self, pipeline_id: PipelineId) -> Vec<BufferedEvent> {
        self.buffered
            .remove(&pipeline_id)
            .map(|(_, events)| events)
            .unwrap_or_default()
    }

    /// Records a pipeline finish that was flushed out of the buffer right
    /// after the root. The lifecycle stays open for the jobs still running
    /// and closes with the terminal job.
    pub fn mark_ended(&self, pipeline_id: PipelineId) {
        debug!("Pipeline {pipeline_id} finished before its last job");
        self.ended.insert(pipeline_id);
    }

    /// Moves the pipeline to `next` after a notification with `role` was
    /// handled.
    pub fn settle(&self, pipeline_id: PipelineId, role: Role, next: Phase) {
        let next = match role {
            Role::Job { terminal: true } => {
                self.last_job.remove(&pipeline_id);
                self.variables.remove(&pipeline_id);
                if self.ended.remove(&pipeline_id).is_some() {
                    Phase::New
                } else {
                    next
                }
            }
            Role::PipelineEnd if next == Phase::New => {
                self.variables.remove(&pipeline_id);
                next
            }
            Role::PipelineStart => {
                self.ended.remove(&pipeline_id);
                next
            }
            _ => next,
        };

        match next {
            Phase::New => {
                self.published_roots.remove(&pipeline_id);
                self.completed.remove(&pipeline_id);
                self.ended.remove(&pipeline_id);
            }
            Phase::RootPending => {}
            Phase::RootPublished => {
                self.published_roots.insert(pipeline_id);
                self.completed.remove(&pipeline_id);
            }
            Phase::TerminalDone => {
                self.published_roots.remove(&pipeline_id);
                self.completed.insert(pipeline_id);
            }
        }
    }

    /// Whether the tracker holds anything at all for the pipeline.
    #[cfg(test)]
    pub fn is_forgotten(&self, pipeline_id: PipelineId) -> bool {
        self.phase(pipeline_id) == Phase::New
            && !self.variables.contains_key(&pipeline_id)
            && !self.last_job.contains_key(&pipeline_id)
            && !self.buffered.contains_key(&pipeline_id)
            && !self.ended.contains(&pipeline_id)
            && !self.locks.contains_key(&pipeline_id)
    }
}

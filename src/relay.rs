//! Turns webhook notifications into ordered CI events.

use std::sync::Arc;

use log::{debug, info, warn};
use serde_json::Value;

use crate::artifacts::ArtifactPipeline;
use crate::config::Config;
use crate::downstream::CiServers;
use crate::error::Result;
use crate::events::{CiEvent, EventBuilder, EventType, Identity, Parameter};
use crate::hooks::{Notification, PipelineHook, PipelineId};
use crate::merge_requests::MergeRequestForwarder;
use crate::providers::gitlab::GitLabApi;
use crate::tracker::{transition, Action, BufferedEvent, Phase, PipelineTracker, Role};

pub struct EventRelay {
    gitlab: Arc<dyn GitLabApi>,
    servers: CiServers,
    builder: EventBuilder,
    tracker: PipelineTracker,
    artifacts: ArtifactPipeline,
    merge_requests: MergeRequestForwarder,
}

impl EventRelay {
    pub fn new(gitlab: Arc<dyn GitLabApi>, servers: CiServers, config: &Config) -> Self {
        Self {
            builder: EventBuilder::new(gitlab.clone(), config.job_ci_id_prefix.clone()),
            tracker: PipelineTracker::new(),
            artifacts: ArtifactPipeline::new(gitlab.clone(), servers.clone(), config),
            merge_requests: MergeRequestForwarder::new(
                gitlab.clone(),
                servers.clone(),
                config.variables.clone(),
            ),
            gitlab,
            servers,
        }
    }

    pub fn servers(&self) -> &CiServers {
        &self.servers
    }

    pub fn gitlab(&self) -> &dyn GitLabApi {
        self.gitlab.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn tracker(&self) -> &PipelineTracker {
        &self.tracker
    }

    /// Handles one webhook delivery.
    ///
    /// Never fails: errors are logged and the non-fatal warnings collected
    /// along the way are returned for the response body.
    pub async fn handle(&self, raw: Value) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Err(e) = self.try_handle(raw, &mut warnings).await {
            warn!("An error occurred while handling a GitLab event: {e}");
        }
        warnings.retain(|warning| !warning.is_empty());
        warnings
    }

    async fn try_handle(&self, raw: Value, warnings: &mut Vec<String>) -> Result<()> {
        let notification = Notification::parse(raw)?;

        if let Notification::MergeRequest(hook) = &notification {
            if let Some(warning) = self.merge_requests.forward(hook).await? {
                warnings.push(warning);
            }
            return Ok(());
        }

        let event_type = notification.event_type();
        if matches!(event_type, EventType::Queued | EventType::Undefined) {
            debug!(
                "Ignoring {:?} notification with status '{}'",
                notification.kind(),
                notification.status()
            );
            return Ok(());
        }

        let identity = self.builder.identify(&notification).await;

        let Some(pipeline_id) = notification.pipeline_id() else {
            let event = self.builder.build(&notification, &identity, Vec::new())?;
            info!(
                "Branch {} of {} was deleted, nothing to publish",
                identity.branch, event.project
            );
            return Ok(());
        };

        let guard = self.tracker.lock(pipeline_id).await;
        let result = self
            .correlate(pipeline_id, notification, &identity, warnings)
            .await;
        self.tracker.unlock(pipeline_id, guard);
        result
    }

    /// Publishes, buffers or flushes the event of a pipeline or job
    /// notification. The caller holds the pipeline's lock.
    async fn correlate(
        &self,
        pipeline_id: PipelineId,
        notification: Notification,
        identity: &Identity,
        warnings: &mut Vec<String>,
    ) -> Result<()> {
        if let Notification::Pipeline(pipeline) = &notification {
            self.tracker
                .capture_variables(pipeline_id, pipeline_parameters(pipeline));
        }

        let inherits_parameters = notification.is_pipeline()
            || notification.event_type() == EventType::Started;
        let parameters = if inherits_parameters {
            self.tracker.variables(pipeline_id).unwrap_or_default()
        } else {
            Vec::new()
        };

        let event = self.builder.build(&notification, identity, parameters)?;
        trace_event(&event);

        let role = self.tracker.role(pipeline_id, &notification);
        let phase = self.tracker.phase(pipeline_id);
        let (action, next) = transition(phase, role);
        debug!("Pipeline {pipeline_id}: {role:?} in {phase:?} -> {action:?}, {next:?}");

        match action {
            Action::Buffer => {
                self.tracker
                    .buffer(pipeline_id, BufferedEvent { event, notification });
                self.tracker.settle(pipeline_id, role, next);
            }
            Action::PublishRoot => {
                if let Notification::Pipeline(pipeline) = &notification {
                    self.tracker
                        .set_last_job(pipeline_id, pipeline.last_job_name());
                }
                self.tracker.settle(pipeline_id, role, next);

                info!("Publishing root event of pipeline {pipeline_id}");
                self.servers.publish_event(&event).await;
                if let Some(scm_event) = self.builder.scm_event(&notification, identity).await {
                    self.servers.publish_event(&scm_event).await;
                }

                self.flush(pipeline_id, warnings).await;
            }
            Action::Publish => {
                self.flush(pipeline_id, warnings).await;
                self.servers.publish_event(&event).await;

                if role == (Role::Job { terminal: true }) {
                    self.run_artifacts(&notification, warnings).await;
                }
                // The flush may have moved the pipeline along.
                let (_, next) = transition(self.tracker.phase(pipeline_id), role);
                self.tracker.settle(pipeline_id, role, next);
            }
        }

        Ok(())
    }

    /// Publishes every buffered event of the pipeline in arrival order.
    async fn flush(&self, pipeline_id: PipelineId, warnings: &mut Vec<String>) {
        let buffered = self.tracker.drain(pipeline_id);
        if buffered.is_empty() {
            return;
        }
        info!(
            "Flushing {} buffered events of pipeline {pipeline_id}",
            buffered.len()
        );

        for BufferedEvent { event, notification } in buffered {
            self.servers.publish_event(&event).await;

            let role = self.tracker.role(pipeline_id, &notification);
            let phase = self.tracker.phase(pipeline_id);
            if role == Role::PipelineEnd && phase == Phase::RootPublished {
                self.tracker.mark_ended(pipeline_id);
                continue;
            }
            // Flushing never buffers again; only lifecycle changes apply.
            if let (Action::Publish, next) = transition(phase, role) {
                if role == (Role::Job { terminal: true }) {
                    self.run_artifacts(&notification, warnings).await;
                }
                self.tracker.settle(pipeline_id, role, next);
            }
        }
    }

    async fn run_artifacts(&self, notification: &Notification, warnings: &mut Vec<String>) {
        if let Notification::Build(build) = notification {
            info!(
                "Job '{}' closes pipeline {}, processing its artifacts",
                build.build_name, build.pipeline_id
            );
            warnings.push(self.artifacts.run(build.project_id, build.build_id).await);
        }
    }
}

fn pipeline_parameters(pipeline: &PipelineHook) -> Vec<Parameter> {
    pipeline
        .object_attributes
        .variables
        .iter()
        .map(|variable| Parameter::string(&variable.key, &variable.value))
        .collect()
}

fn trace_event(event: &CiEvent) {
    if log::log_enabled!(log::Level::Trace) {
        match serde_json::to_string(event) {
            Ok(json) => log::trace!("Incoming event {json}"),
            Err(e) => debug!("Failed to trace an incoming event: {e}"),
        }
    }
}

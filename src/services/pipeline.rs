use crate::api::error::AppError;
use crate::config::AppConfig;
use crate::services::intake::ValidatedUpload;
use crate::services::notifier::{NotificationMessage, UploadNotifier};
use crate::services::presence::PresenceCache;
use crate::services::staging::StagingSink;
use std::sync::Arc;

/// Request lifecycle. Stages advance strictly in declaration order; the
/// first failure jumps to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IngestState {
    Received,
    Authenticated,
    Validated,
    Staged,
    CachePending,
    Notified,
    Responded,
    Rejected(Rejection),
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Rejection {
    Unauthorized,
    BadRequest,
}

impl IngestState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            IngestState::Responded | IngestState::Rejected(_) | IngestState::Failed
        )
    }
}

/// Records transitions for one request and refuses to move backwards.
#[derive(Debug)]
pub struct StateTracker {
    state: IngestState,
    history: Vec<IngestState>,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self {
            state: IngestState::Received,
            history: vec![IngestState::Received],
        }
    }
}

impl StateTracker {
    pub fn state(&self) -> IngestState {
        self.state
    }

    pub fn history(&self) -> &[IngestState] {
        &self.history
    }

    pub fn advance(&mut self, next: IngestState) {
        debug_assert!(
            !self.state.is_terminal() && next > self.state,
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::debug!(from = ?self.state, to = ?next, "ingest transition");
        self.state = next;
        self.history.push(next);
    }

    /// Moves to the terminal state matching `err` and hands the error back.
    pub fn fail(&mut self, err: AppError) -> AppError {
        let terminal = match &err {
            AppError::Unauthorized(_) => IngestState::Rejected(Rejection::Unauthorized),
            AppError::BadRequest(_) => IngestState::Rejected(Rejection::BadRequest),
            _ => IngestState::Failed,
        };
        self.advance(terminal);
        err
    }
}

/// Side effects that run after the file is staged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostWriteAction {
    PresenceMarker,
    Notify,
}

/// Whether a post-write action's failure fails the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fatality {
    Required,
    BestEffort,
}

/// Executed in order after a successful staging write.
pub const POST_WRITE_ACTIONS: &[(PostWriteAction, Fatality)] = &[
    (PostWriteAction::PresenceMarker, Fatality::Required),
    (PostWriteAction::Notify, Fatality::BestEffort),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    pub composite_key: String,
    pub bytes_written: u64,
    pub presence_marked: bool,
    pub notified: bool,
}

/// Composes staging, presence bookkeeping and notification for a
/// validated upload.
pub struct IngestPipeline {
    config: Arc<AppConfig>,
    staging: StagingSink,
    presence: Arc<dyn PresenceCache>,
    notifier: Arc<dyn UploadNotifier>,
}

impl IngestPipeline {
    pub fn new(
        config: Arc<AppConfig>,
        presence: Arc<dyn PresenceCache>,
        notifier: Arc<dyn UploadNotifier>,
    ) -> Self {
        let staging = StagingSink::new(config.namespace_root(), config.copy_buffer_size);
        Self {
            config,
            staging,
            presence,
            notifier,
        }
    }

    pub fn staging(&self) -> &StagingSink {
        &self.staging
    }

    pub fn presence(&self) -> &Arc<dyn PresenceCache> {
        &self.presence
    }

    pub fn notifier(&self) -> &Arc<dyn UploadNotifier> {
        &self.notifier
    }

    /// Runs everything after validation. `tracker` must be at `Validated`.
    pub async fn ingest(
        &self,
        upload: ValidatedUpload,
        tracker: &mut StateTracker,
    ) -> Result<IngestOutcome, AppError> {
        let composite_key = upload.composite_key();

        let path = self
            .staging
            .path_for(&upload.origin, &upload.key, &upload.file_name)
            .map_err(|e| tracker.fail(e.into()))?;
        let bytes_written = self
            .staging
            .write(&path, upload.file)
            .await
            .map_err(|e| tracker.fail(e.into()))?;
        tracker.advance(IngestState::Staged);

        let mut outcome = IngestOutcome {
            composite_key,
            bytes_written,
            presence_marked: false,
            notified: false,
        };

        for &(action, fatality) in POST_WRITE_ACTIONS {
            match self.run_action(action, &mut outcome, tracker).await {
                Ok(()) => {}
                Err(e) if fatality == Fatality::Required => return Err(tracker.fail(e)),
                Err(e) => {
                    tracing::warn!(
                        action = ?action,
                        key = %outcome.composite_key,
                        "Best-effort post-write action failed: {}",
                        e
                    );
                }
            }
        }

        tracker.advance(IngestState::Responded);
        tracing::info!(
            key = %outcome.composite_key,
            bytes = outcome.bytes_written,
            presence = outcome.presence_marked,
            notified = outcome.notified,
            "✅ Upload ingested"
        );
        Ok(outcome)
    }

    async fn run_action(
        &self,
        action: PostWriteAction,
        outcome: &mut IngestOutcome,
        tracker: &mut StateTracker,
    ) -> Result<(), AppError> {
        match action {
            PostWriteAction::PresenceMarker => {
                if !self.config.deployment_mode.writes_presence_markers() {
                    return Ok(());
                }
                self.presence
                    .mark_present(&outcome.composite_key, self.config.presence_ttl)
                    .await?;
                outcome.presence_marked = true;
                tracker.advance(IngestState::CachePending);
                Ok(())
            }
            PostWriteAction::Notify => {
                let message = NotificationMessage {
                    destination: self.config.upload_queue.clone(),
                    payload: outcome.composite_key.clone(),
                };
                self.notifier
                    .notify(&message)
                    .await
                    .map_err(|e| AppError::Internal(e.to_string()))?;
                outcome.notified = true;
                tracker.advance(IngestState::Notified);
                Ok(())
            }
        }
    }
}

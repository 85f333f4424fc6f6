//! Profile editor: permission routing in front of the write paths
//!
//! Control flow for one edit:
//! 1. resolve the actor's [`AccessMode`] for the target (fresh, never cached)
//! 2. `ReadOnly` / `Blocked`: refuse with no network write
//! 3. `Suggest`: file a suggestion (media uploaded first, then referenced)
//! 4. `Direct`: submit through the CAS controller; with media, the upload runs
//!    first and the whole patch plus media reference is linked in one call

use crate::config::EditorConfig;
use crate::error::EditError;
use crate::types::{EditOutcome, EditRequest};
use kin_media::{
    AbandonHandle, Committed, LinkReceipt, MediaCommitPipeline, MediaOptimizer, ObjectStorage,
    OrphanLedger, PassthroughOptimizer, PatchLinker, SuggestionLinker,
};
use kin_mutation::{
    MutationRpc, RecordCache, Suggestion, SuggestionSink, VersionedMutationController,
};
use kin_permission::{AccessMode, Authorizer, PermissionDecision, PermissionGate};
use kin_record::{
    ActorId, MutationOutcome, MutationRequest, ProfileRecord, RecordId, RequestError,
};
use std::sync::Arc;

/// Controller over a shared RPC handle
pub type Controller = VersionedMutationController<Arc<dyn MutationRpc>>;

/// Pipeline over shared collaborator handles
pub type Pipeline = MediaCommitPipeline<Arc<dyn MediaOptimizer>, Arc<dyn ObjectStorage>>;

/// External systems the editor talks to
#[derive(Clone)]
pub struct Collaborators {
    pub rpc: Arc<dyn MutationRpc>,
    pub suggestions: Arc<dyn SuggestionSink>,
    pub authorizer: Arc<dyn Authorizer>,
    pub storage: Arc<dyn ObjectStorage>,
    /// Defaults to [`PassthroughOptimizer`]
    pub optimizer: Option<Arc<dyn MediaOptimizer>>,
}

impl Collaborators {
    #[must_use]
    pub fn new(
        rpc: Arc<dyn MutationRpc>,
        suggestions: Arc<dyn SuggestionSink>,
        authorizer: Arc<dyn Authorizer>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self {
            rpc,
            suggestions,
            authorizer,
            storage,
            optimizer: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_optimizer(mut self, optimizer: Arc<dyn MediaOptimizer>) -> Self {
        self.optimizer = Some(optimizer);
        self
    }
}

/// End-to-end profile editing
pub struct ProfileEditor {
    config: EditorConfig,
    controller: Arc<Controller>,
    suggestions: Arc<dyn SuggestionSink>,
    gate: PermissionGate<Arc<dyn Authorizer>>,
    pipeline: Pipeline,
    cache: RecordCache,
}

impl ProfileEditor {
    #[must_use]
    pub fn new(config: EditorConfig, collaborators: Collaborators) -> Self {
        let cache = config.record_cache();
        let controller = VersionedMutationController::new(collaborators.rpc)
            .with_classifier(config.classifier())
            .with_retry_policy(config.retry_policy())
            .with_snapshot_on_conflict(config.mutation.snapshot_on_conflict)
            .with_cache(cache.clone());

        let optimizer: Arc<dyn MediaOptimizer> = match collaborators.optimizer {
            Some(optimizer) => optimizer,
            None => Arc::new(PassthroughOptimizer::new().with_max_bytes(config.media.max_bytes)),
        };
        let pipeline = MediaCommitPipeline::new(optimizer, collaborators.storage)
            .with_key_prefix(config.media.key_prefix.clone())
            .with_abandon_policy(config.abandon.policy)
            .with_cleanup_retry(config.cleanup_retry());

        let gate =
            PermissionGate::new(collaborators.authorizer).with_timeout(config.resolve_timeout());

        Self {
            config,
            controller: Arc::new(controller),
            suggestions: collaborators.suggestions,
            gate,
            pipeline,
            cache,
        }
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn cache(&self) -> &RecordCache {
        &self.cache
    }

    #[inline]
    #[must_use]
    pub fn controller(&self) -> &Arc<Controller> {
        &self.controller
    }

    #[inline]
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    #[inline]
    #[must_use]
    pub fn orphans(&self) -> &OrphanLedger {
        self.pipeline.orphans()
    }

    /// Current permission decision for `actor` on `target`
    pub async fn resolve(&self, actor: &ActorId, target: &RecordId) -> PermissionDecision {
        self.gate.resolve(actor, target).await
    }

    /// Record through the cache
    ///
    /// # Errors
    /// Returns the classified read failure
    pub async fn load(&self, id: &RecordId) -> Result<Arc<ProfileRecord>, EditError> {
        self.cache
            .get_or_fetch(self.controller.rpc(), id)
            .await
            .map_err(|e| {
                EditError::from_class(self.controller.classifier().classify(&e), id, None)
            })
    }

    /// Drop the cached copy and read the record again
    ///
    /// # Errors
    /// Returns the classified read failure
    pub async fn reload(&self, id: &RecordId) -> Result<Arc<ProfileRecord>, EditError> {
        self.cache.invalidate(id).await;
        self.load(id).await
    }

    /// Run one edit
    ///
    /// # Errors
    /// Returns an [`EditError`]; see [`EditError::effect`] for what happened
    pub async fn edit(&self, request: EditRequest) -> Result<EditOutcome, EditError> {
        self.edit_with(request, &AbandonHandle::new()).await
    }

    /// Run one edit, honoring `abandon` at media step boundaries
    ///
    /// # Errors
    /// As [`edit`](Self::edit)
    pub async fn edit_with(
        &self,
        request: EditRequest,
        abandon: &AbandonHandle,
    ) -> Result<EditOutcome, EditError> {
        if request.is_empty() {
            return Err(RequestError::EmptyPatch.into());
        }
        if !request.expected_version.is_valid() {
            return Err(RequestError::InvalidVersion(request.expected_version).into());
        }

        let decision = self.gate.resolve(&request.actor, &request.target).await;
        match decision.mode {
            AccessMode::Direct => self.write_direct(request, abandon).await,
            AccessMode::Suggest => self.write_suggestion(request, abandon).await,
            AccessMode::ReadOnly | AccessMode::Blocked => {
                tracing::info!(
                    "Edit of {} by {} refused before write: {} ({:?})",
                    request.target,
                    request.actor,
                    decision.mode,
                    decision.source
                );
                Err(EditError::PermissionDenied {
                    mode: Some(decision.mode),
                })
            }
        }
    }

    async fn write_direct(
        &self,
        request: EditRequest,
        abandon: &AbandonHandle,
    ) -> Result<EditOutcome, EditError> {
        let EditRequest {
            target,
            expected_version,
            patch,
            media,
            ..
        } = request;

        let Some(local) = media else {
            let request = MutationRequest::new(target.clone(), expected_version, patch)?;
            return match self.controller.submit(&request).await {
                MutationOutcome::Applied { new_version } => Ok(EditOutcome::Applied {
                    new_version,
                    asset: None,
                }),
                MutationOutcome::Conflict {
                    current_version,
                    current_snapshot,
                } => Err(EditError::Conflict {
                    current_version,
                    snapshot: current_snapshot,
                }),
                MutationOutcome::Rejected { reason } => Err(EditError::rejected(reason, &target)),
                MutationOutcome::TransportFailure { retryable } => {
                    Err(EditError::Transport { retryable })
                }
            };
        };

        let linker = PatchLinker::new(Arc::clone(&self.controller), expected_version, patch);
        let committed = self.pipeline.commit_with(local, &target, &linker, abandon).await?;
        Ok(self.media_outcome(&target, committed).await)
    }

    async fn write_suggestion(
        &self,
        request: EditRequest,
        abandon: &AbandonHandle,
    ) -> Result<EditOutcome, EditError> {
        let EditRequest {
            actor,
            target,
            expected_version,
            patch,
            media,
        } = request;

        let Some(local) = media else {
            let suggestion = Suggestion::new(target.clone(), actor, expected_version, patch);
            return match self.suggestions.propose(&suggestion).await {
                Ok(suggestion_id) => {
                    tracing::info!("Filed suggestion {} for {}", suggestion_id, target);
                    Ok(EditOutcome::Suggested {
                        suggestion_id,
                        asset: None,
                    })
                }
                Err(e) => Err(EditError::from_class(
                    self.controller.classifier().classify(&e),
                    &target,
                    Some(expected_version),
                )),
            };
        };

        let linker = SuggestionLinker::new(Arc::clone(&self.suggestions), actor, expected_version)
            .with_patch(patch)
            .with_classifier(self.controller.classifier().clone());
        let committed = self.pipeline.commit_with(local, &target, &linker, abandon).await?;
        Ok(self.media_outcome(&target, committed).await)
    }

    async fn media_outcome(&self, target: &RecordId, committed: Committed) -> EditOutcome {
        let Committed { asset, receipt } = committed;
        match receipt {
            LinkReceipt::Applied { new_version } => EditOutcome::Applied {
                new_version,
                asset: Some(asset),
            },
            LinkReceipt::Verified { observed_version } => {
                // The controller saw a transport failure, so the cache was left alone.
                self.cache.invalidate(target).await;
                EditOutcome::Applied {
                    new_version: observed_version,
                    asset: Some(asset),
                }
            }
            LinkReceipt::Suggested { suggestion_id } => {
                tracing::info!("Filed media suggestion {} for {}", suggestion_id, target);
                EditOutcome::Suggested {
                    suggestion_id,
                    asset: Some(asset),
                }
            }
        }
    }
}

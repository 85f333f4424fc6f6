//! Edit session for one actor on one record
//!
//! Holds the baseline version that every submission is made against. A
//! conflict marks the session stale; it refuses further submissions until
//! [`EditSession::reload`] re-reads the record.

use crate::editor::ProfileEditor;
use crate::error::EditError;
use crate::types::{EditOutcome, EditRequest};
use kin_media::{AbandonHandle, LocalMedia};
use kin_record::{ActorId, FieldPatch, ProfileRecord, RecordId, Version};
use std::sync::Arc;

pub struct EditSession<'a> {
    editor: &'a ProfileEditor,
    actor: ActorId,
    target: RecordId,
    snapshot: Arc<ProfileRecord>,
    baseline: Version,
    stale: bool,
}

impl ProfileEditor {
    /// Start editing `target` as `actor`, reading through the cache
    ///
    /// # Errors
    /// Returns the classified read failure
    pub async fn open(
        &self,
        actor: ActorId,
        target: RecordId,
    ) -> Result<EditSession<'_>, EditError> {
        let snapshot = self.load(&target).await?;
        tracing::debug!("Opened {} at {} for {}", target, snapshot.version, actor);
        Ok(EditSession {
            editor: self,
            actor,
            target,
            baseline: snapshot.version,
            snapshot,
            stale: false,
        })
    }
}

impl EditSession<'_> {
    #[inline]
    #[must_use]
    pub fn baseline(&self) -> Version {
        self.baseline
    }

    /// Record as last loaded; not patched locally after writes
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> &ProfileRecord {
        &self.snapshot
    }

    #[inline]
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    #[inline]
    #[must_use]
    pub fn target(&self) -> &RecordId {
        &self.target
    }

    /// Submit field edits against the baseline
    ///
    /// # Errors
    /// [`EditError::StaleSession`] while stale, otherwise as [`ProfileEditor::edit`]
    pub async fn submit(&mut self, patch: FieldPatch) -> Result<EditOutcome, EditError> {
        self.submit_with(patch, None, &AbandonHandle::new()).await
    }

    /// Submit field edits together with a new image
    ///
    /// # Errors
    /// As [`submit`](Self::submit)
    pub async fn submit_media(
        &mut self,
        patch: FieldPatch,
        media: LocalMedia,
    ) -> Result<EditOutcome, EditError> {
        self.submit_with(patch, Some(media), &AbandonHandle::new()).await
    }

    /// # Errors
    /// As [`submit`](Self::submit)
    pub async fn submit_with(
        &mut self,
        patch: FieldPatch,
        media: Option<LocalMedia>,
        abandon: &AbandonHandle,
    ) -> Result<EditOutcome, EditError> {
        if self.stale {
            return Err(EditError::StaleSession {
                baseline: self.baseline,
            });
        }

        let mut request = EditRequest::new(self.actor.clone(), self.target.clone(), self.baseline)
            .with_patch(patch);
        request.media = media;

        let result = self.editor.edit_with(request, abandon).await;
        match &result {
            Ok(EditOutcome::Applied { new_version, .. }) => {
                tracing::debug!(
                    "Session on {} advanced {} -> {}",
                    self.target,
                    self.baseline,
                    new_version
                );
                self.baseline = *new_version;
            }
            Err(e) if e.requires_reload() => {
                tracing::warn!("Session on {} is stale at {}: {}", self.target, self.baseline, e);
                self.stale = true;
            }
            _ => {}
        }
        result
    }

    /// Re-read the record and clear the stale flag
    ///
    /// # Errors
    /// Returns the classified read failure; the session stays stale
    pub async fn reload(&mut self) -> Result<Version, EditError> {
        let snapshot = self.editor.reload(&self.target).await?;
        self.baseline = snapshot.version;
        self.snapshot = snapshot;
        self.stale = false;
        Ok(self.baseline)
    }
}

//! Persistence seam for concept papers

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use paperflow_types::{
    ConceptPaper, PaperId, PaperSnapshot, StageId, StorageResult, UserId, WorkflowStage,
};

/// An open stage together with the paper it belongs to
#[derive(Clone, Debug, PartialEq)]
pub struct StageRecord {
    pub paper: PaperSnapshot,
    pub stage: WorkflowStage,
}

/// Storage for concept papers and their stages.
///
/// A paper is always read and written as a whole, stages included, so a
/// transition is persisted in one write or not at all.
#[async_trait]
pub trait PaperStore: Send + Sync {
    /// Allocate the next tracking sequence number for `year`, starting at 1
    async fn next_tracking_sequence(&self, year: i32) -> StorageResult<u32>;

    /// Insert a new paper. Fails with `Conflict` on a duplicate id or
    /// tracking number. Returns the stored paper at version 1.
    async fn insert_paper(&self, paper: ConceptPaper) -> StorageResult<ConceptPaper>;

    /// Get a paper by ID
    async fn get_paper(&self, id: &PaperId) -> StorageResult<Option<ConceptPaper>>;

    /// Replace a paper if its stored version still equals `expected_version`.
    /// Returns the stored paper with its version bumped.
    async fn update_paper(
        &self,
        paper: ConceptPaper,
        expected_version: u64,
    ) -> StorageResult<ConceptPaper>;

    /// Get the paper owning a stage
    async fn find_paper_by_stage(&self, stage_id: &StageId) -> StorageResult<Option<ConceptPaper>>;

    /// List all papers
    async fn list_papers(&self) -> StorageResult<Vec<ConceptPaper>>;

    /// List papers submitted by a requisitioner, newest first
    async fn list_papers_for_requisitioner(
        &self,
        requisitioner: &UserId,
    ) -> StorageResult<Vec<ConceptPaper>>;

    /// Stages in status pending or in_progress whose deadline is before `now`
    async fn list_overdue_stages(&self, now: DateTime<Utc>) -> StorageResult<Vec<StageRecord>>;

    /// Papers not completed whose deadline date is at or before `now`
    async fn list_papers_past_deadline(
        &self,
        now: DateTime<Utc>,
    ) -> StorageResult<Vec<ConceptPaper>>;
}

//! In-memory paper store

use crate::store::{PaperStore, StageRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use paperflow_types::{
    ConceptPaper, PaperId, PaperSnapshot, StageId, StorageError, StorageResult, TrackingNumber,
    UserId,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory storage for development and testing
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaperStore {
    papers: Arc<RwLock<HashMap<PaperId, ConceptPaper>>>,
    tracking_index: Arc<RwLock<HashMap<TrackingNumber, PaperId>>>,
    sequences: Arc<RwLock<HashMap<i32, u32>>>,
}

impl InMemoryPaperStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.papers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.papers.read().await.is_empty()
    }
}

#[async_trait]
impl PaperStore for InMemoryPaperStore {
    async fn next_tracking_sequence(&self, year: i32) -> StorageResult<u32> {
        let mut sequences = self.sequences.write().await;
        let next = sequences.entry(year).or_insert(0);
        *next += 1;
        Ok(*next)
    }

    async fn insert_paper(&self, mut paper: ConceptPaper) -> StorageResult<ConceptPaper> {
        // Lock order: papers, then tracking_index
        let mut papers = self.papers.write().await;
        let mut tracking_index = self.tracking_index.write().await;

        if papers.contains_key(&paper.id) {
            return Err(StorageError::Conflict(format!("paper {} already exists", paper.id)));
        }
        if tracking_index.contains_key(&paper.tracking_number) {
            return Err(StorageError::Conflict(format!(
                "tracking number {} already in use",
                paper.tracking_number
            )));
        }

        paper.version = 1;
        tracking_index.insert(paper.tracking_number.clone(), paper.id.clone());
        papers.insert(paper.id.clone(), paper.clone());
        Ok(paper)
    }

    async fn get_paper(&self, id: &PaperId) -> StorageResult<Option<ConceptPaper>> {
        let papers = self.papers.read().await;
        Ok(papers.get(id).cloned())
    }

    async fn update_paper(
        &self,
        mut paper: ConceptPaper,
        expected_version: u64,
    ) -> StorageResult<ConceptPaper> {
        let mut papers = self.papers.write().await;
        let stored = papers
            .get_mut(&paper.id)
            .ok_or_else(|| StorageError::NotFound(format!("paper {}", paper.id)))?;

        if stored.version != expected_version {
            return Err(StorageError::Conflict(format!(
                "paper {} is at version {}, expected {}",
                paper.id, stored.version, expected_version
            )));
        }

        paper.version = expected_version + 1;
        *stored = paper.clone();
        Ok(paper)
    }

    async fn find_paper_by_stage(&self, stage_id: &StageId) -> StorageResult<Option<ConceptPaper>> {
        let papers = self.papers.read().await;
        Ok(papers
            .values()
            .find(|p| p.stage_by_id(stage_id).is_some())
            .cloned())
    }

    async fn list_papers(&self) -> StorageResult<Vec<ConceptPaper>> {
        let papers = self.papers.read().await;
        Ok(papers.values().cloned().collect())
    }

    async fn list_papers_for_requisitioner(
        &self,
        requisitioner: &UserId,
    ) -> StorageResult<Vec<ConceptPaper>> {
        let papers = self.papers.read().await;
        let mut found: Vec<_> = papers
            .values()
            .filter(|p| &p.requisitioner == requisitioner)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(found)
    }

    async fn list_overdue_stages(&self, now: DateTime<Utc>) -> StorageResult<Vec<StageRecord>> {
        let papers = self.papers.read().await;
        let mut found: Vec<_> = papers
            .values()
            .flat_map(|paper| {
                paper
                    .stages
                    .iter()
                    .filter(move |s| s.is_overdue(now))
                    .map(move |s| StageRecord {
                        paper: PaperSnapshot::from(paper),
                        stage: s.clone(),
                    })
            })
            .collect();
        found.sort_by(|a, b| a.stage.deadline.cmp(&b.stage.deadline));
        Ok(found)
    }

    async fn list_papers_past_deadline(
        &self,
        now: DateTime<Utc>,
    ) -> StorageResult<Vec<ConceptPaper>> {
        let papers = self.papers.read().await;
        let mut found: Vec<_> = papers
            .values()
            .filter(|p| p.is_past_deadline(now))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.deadline_date.cmp(&b.deadline_date));
        Ok(found)
    }
}

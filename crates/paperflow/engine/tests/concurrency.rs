//! Racing transitions on the same paper

mod common;

use common::*;
use paperflow_engine::PaperStore;
use paperflow_types::*;
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_double_approve_has_exactly_one_winner() {
    let env = TestEnv::new();
    let paper = env.submit().await;
    let stage_id = paper.stage(1).unwrap().id.clone();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&env.engine);
            let stage_id = stage_id.clone();
            tokio::spawn(async move {
                engine
                    .approve(&as_role(Role::Sps), &stage_id, "sig", None)
                    .await
            })
        })
        .collect();

    let mut successes = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(e) if e.kind() == ErrorKind::StateConflict => conflicts += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(conflicts, 7);

    let stored = env.paper(&paper.id).await;
    assert_eq!(stored.current_stage_order, Some(2));
    assert_eq!(stored.version, 2);
    stored.check_invariants().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn approve_racing_return_never_leaves_two_current_stages() {
    let env = TestEnv::new();
    let paper = env.submit().await;
    let paper = env.approve_current(&paper).await;
    let stage_id = paper.stage(2).unwrap().id.clone();

    let approve = {
        let engine = Arc::clone(&env.engine);
        let stage_id = stage_id.clone();
        tokio::spawn(async move {
            engine
                .approve(&as_role(Role::VpAcad), &stage_id, "sig", None)
                .await
        })
    };
    let give_back = {
        let engine = Arc::clone(&env.engine);
        let stage_id = stage_id.clone();
        tokio::spawn(async move {
            engine
                .return_stage(&as_role(Role::VpAcad), &stage_id, "needs work")
                .await
        })
    };

    let results = [approve.await.unwrap(), give_back.await.unwrap()];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);

    let stored = env.paper(&paper.id).await;
    stored.check_invariants().unwrap();
    let in_progress = stored
        .stages
        .iter()
        .filter(|s| s.status == StageStatus::InProgress)
        .count();
    assert_eq!(in_progress, 1);
}

#[tokio::test]
async fn stale_version_write_is_a_state_conflict() {
    let env = TestEnv::new();
    let paper = env.submit().await;

    // Another writer sharing the store saves first
    let mut elsewhere = env.paper(&paper.id).await;
    elsewhere.title = "Edited elsewhere".into();
    env.store.update_paper(elsewhere, 1).await.unwrap();

    let err = env
        .store
        .update_paper(paper.clone(), 1)
        .await
        .map_err(WorkflowError::from)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateConflict);
}

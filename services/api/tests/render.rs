mod common;

use api_lib::web::{
    protocol::{SceneStatusView, ServerMessage},
    render_task::{finish_render, render_worker, spawn_render, start_render},
};
use chrono::{Duration, Utc};
use common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use storyboard_core::{
    domain::{scenes_from_drafts, AccessState, ImagePayload, QualityTier, SceneStatus},
    ports::PortError,
};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn scene_is_generating_before_the_gateway_answers() {
    let latch = Latch::new();
    let h = harness(
        unused_script(),
        MockImage::succeeding().latched(latch.clone()),
        unused_chat(),
        None,
    );
    let scenes = seed_scenes(&h.state, &["a lighthouse"]).await;
    let id = scenes[0].id.clone();

    let view = spawn_render(&h.state, &id).await.unwrap();
    assert_eq!(view.status, SceneStatusView::Generating);
    assert!(view.image_url.is_none());
    assert!(matches!(
        h.state.session.lock().await.storyboard.scene(&id).unwrap().status(),
        SceneStatus::Generating { .. }
    ));

    latch.release(1);
    wait_until(&h.state, "the scene completes", |s| {
        s.storyboard.scene(&id).is_some_and(|scene| scene.image().is_some())
    })
    .await;

    let session = h.state.session.lock().await;
    let image = session.storyboard.scene(&id).unwrap().image().unwrap();
    assert_eq!(image.as_str(), "data:image/png;base64,iVBORw0KGgo=");
}

#[tokio::test]
async fn generation_uses_the_selected_quality() {
    let h = harness(unused_script(), MockImage::succeeding(), unused_chat(), None);
    let scenes = seed_scenes(&h.state, &["a lighthouse"]).await;
    h.state.session.lock().await.storyboard.quality = QualityTier::FourK;

    let (ticket, _) = start_render(&h.state, &scenes[0].id, false).await.unwrap();
    finish_render(&h.state, ticket).await;

    let prompts = h.image.prompts.lock().unwrap().clone();
    assert_eq!(prompts, vec![("a lighthouse".to_string(), QualityTier::FourK)]);
}

#[tokio::test]
async fn failed_regeneration_clears_the_old_image() {
    let h = harness(
        unused_script(),
        MockImage::new(|_| Err(PortError::Unexpected("quota exceeded".to_string()))),
        unused_chat(),
        None,
    );
    let scenes = seed_scenes(&h.state, &["a lighthouse"]).await;
    let id = scenes[0].id.clone();
    {
        let mut session = h.state.session.lock().await;
        let scene = session.storyboard.scene_mut(&id).unwrap();
        let attempt = scene.begin_generation();
        scene
            .complete_generation(attempt, png().to_image_ref().unwrap())
            .unwrap();
    }
    let mut events = h.state.subscribe();

    let (ticket, _) = start_render(&h.state, &id, false).await.unwrap();
    let status = finish_render(&h.state, ticket).await.unwrap();

    assert!(matches!(status, SceneStatus::Error(ref reason) if reason.contains("quota exceeded")));
    let session = h.state.session.lock().await;
    let scene = session.storyboard.scene(&id).unwrap();
    assert!(scene.image().is_none());
    assert_eq!(session.access, AccessState::Unknown);
    drop(session);

    let mut statuses = Vec::new();
    while let Ok(ServerMessage::SceneUpdated { scene }) = events.try_recv() {
        statuses.push(scene.status);
    }
    assert_eq!(
        statuses,
        vec![SceneStatusView::Generating, SceneStatusView::Error]
    );
}

#[tokio::test]
async fn empty_image_payload_is_an_error() {
    let h = harness(
        unused_script(),
        MockImage::new(|_| {
            Ok(ImagePayload {
                mime_type: "image/png".to_string(),
                data: String::new(),
            })
        }),
        unused_chat(),
        None,
    );
    let scenes = seed_scenes(&h.state, &["a lighthouse"]).await;

    let (ticket, _) = start_render(&h.state, &scenes[0].id, false).await.unwrap();
    let status = finish_render(&h.state, ticket).await.unwrap();

    assert!(matches!(status, SceneStatus::Error(ref reason) if reason.contains("No image data")));
}

#[tokio::test]
async fn credential_failure_closes_the_gate() {
    let h = harness(
        unused_script(),
        MockImage::new(|_| {
            Err(PortError::Unexpected(
                "Requested entity was not found.".to_string(),
            ))
        }),
        unused_chat(),
        None,
    );
    let scenes = seed_scenes(&h.state, &["a lighthouse"]).await;

    let (ticket, _) = start_render(&h.state, &scenes[0].id, false).await.unwrap();
    finish_render(&h.state, ticket).await;

    let session = h.state.session.lock().await;
    assert_eq!(session.access, AccessState::Denied);
    assert!(matches!(
        session.storyboard.scene(&scenes[0].id).unwrap().status(),
        SceneStatus::Error(_)
    ));
}

#[tokio::test]
async fn newer_request_decides_the_frame() {
    let h = harness(
        unused_script(),
        MockImage::new(|_| {
            Ok(ImagePayload {
                mime_type: "image/png".to_string(),
                data: "NEWER".to_string(),
            })
        }),
        unused_chat(),
        None,
    );
    let scenes = seed_scenes(&h.state, &["a lighthouse"]).await;
    let id = scenes[0].id.clone();

    let (first, _) = start_render(&h.state, &id, false).await.unwrap();
    h.state.session.lock().await.storyboard.quality = QualityTier::FourK;
    let (second, _) = start_render(&h.state, &id, false).await.unwrap();
    assert_eq!(first.quality, QualityTier::OneK);
    assert_eq!(second.quality, QualityTier::FourK);

    // The superseded 1K attempt settles first and must not claim the scene.
    assert!(finish_render(&h.state, first).await.is_none());
    assert!(matches!(
        h.state.session.lock().await.storyboard.scene(&id).unwrap().status(),
        SceneStatus::Generating { .. }
    ));

    let status = finish_render(&h.state, second).await.unwrap();
    assert!(matches!(status, SceneStatus::Completed(_)));
    let prompts = h.image.prompts.lock().unwrap().clone();
    assert_eq!(prompts[1].1, QualityTier::FourK);
}

#[tokio::test]
async fn stale_failure_does_not_override_a_newer_success() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let h = harness(
        unused_script(),
        MockImage::new(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(png())
            } else {
                Err(PortError::Unexpected("timed out".to_string()))
            }
        }),
        unused_chat(),
        None,
    );
    let scenes = seed_scenes(&h.state, &["a lighthouse"]).await;
    let id = scenes[0].id.clone();

    let (older, _) = start_render(&h.state, &id, false).await.unwrap();
    let (newer, _) = start_render(&h.state, &id, false).await.unwrap();

    assert!(matches!(
        finish_render(&h.state, newer).await,
        Some(SceneStatus::Completed(_))
    ));
    assert!(finish_render(&h.state, older).await.is_none());

    let session = h.state.session.lock().await;
    let scene = session.storyboard.scene(&id).unwrap();
    assert!(scene.image().is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unknown_scene_is_not_generated() {
    let h = harness(unused_script(), MockImage::succeeding(), unused_chat(), None);
    seed_scenes(&h.state, &["a lighthouse"]).await;

    assert!(spawn_render(&h.state, "scene-9-0").await.is_none());
    assert!(h.image.prompts().is_empty());
}

#[tokio::test]
async fn result_for_a_replaced_scene_is_dropped() {
    let h = harness(unused_script(), MockImage::succeeding(), unused_chat(), None);
    let scenes = seed_scenes(&h.state, &["old"]).await;
    let (ticket, _) = start_render(&h.state, &scenes[0].id, false).await.unwrap();

    let replacement = scenes_from_drafts(vec![draft(1, "new")], Utc::now() + Duration::seconds(1));
    h.state
        .session
        .lock()
        .await
        .storyboard
        .replace_scenes(replacement.clone());

    assert!(finish_render(&h.state, ticket).await.is_none());
    let session = h.state.session.lock().await;
    assert_eq!(session.storyboard.scenes, replacement);
}

#[tokio::test]
async fn generate_all_runs_awaiting_scenes_in_order_one_at_a_time() {
    let mut h = harness(unused_script(), MockImage::succeeding(), unused_chat(), None);
    let scenes = seed_scenes(&h.state, &["first", "done already", "third", "fourth"]).await;
    {
        let mut session = h.state.session.lock().await;
        let done = session.storyboard.scene_mut(&scenes[1].id).unwrap();
        let attempt = done.begin_generation();
        done.complete_generation(attempt, png().to_image_ref().unwrap())
            .unwrap();
        let failed = session.storyboard.scene_mut(&scenes[3].id).unwrap();
        let attempt = failed.begin_generation();
        failed.fail_generation(attempt, "earlier failure").unwrap();
    }

    let token = CancellationToken::new();
    let worker = tokio::spawn(render_worker(
        h.state.clone(),
        h.jobs.take().unwrap(),
        token.clone(),
    ));

    let queued = h.state.render_queue.enqueue_awaiting(&h.state).await;
    assert_eq!(
        queued,
        vec![scenes[0].id.clone(), scenes[2].id.clone(), scenes[3].id.clone()]
    );

    wait_until(&h.state, "the batch settles", |s| {
        s.storyboard
            .scenes
            .iter()
            .all(|scene| matches!(scene.status(), SceneStatus::Completed(_)))
    })
    .await;

    assert_eq!(h.image.prompts(), vec!["first", "third", "fourth"]);
    assert_eq!(h.image.max_in_flight.load(Ordering::SeqCst), 1);

    token.cancel();
    worker.await.unwrap();
}

#[tokio::test]
async fn batch_skips_scenes_that_were_generated_meanwhile() {
    let mut h = harness(unused_script(), MockImage::succeeding(), unused_chat(), None);
    let scenes = seed_scenes(&h.state, &["first", "second"]).await;

    let queued = h.state.render_queue.enqueue_awaiting(&h.state).await;
    assert_eq!(queued.len(), 2);

    // Settle the second scene on its own before the worker reaches it.
    let (ticket, _) = start_render(&h.state, &scenes[1].id, false).await.unwrap();
    finish_render(&h.state, ticket).await;

    let token = CancellationToken::new();
    let worker = tokio::spawn(render_worker(
        h.state.clone(),
        h.jobs.take().unwrap(),
        token.clone(),
    ));
    wait_until(&h.state, "the first scene completes", |s| {
        s.storyboard
            .scene(&scenes[0].id)
            .is_some_and(|scene| scene.image().is_some())
    })
    .await;

    assert_eq!(h.image.prompts(), vec!["second", "first"]);
    token.cancel();
    worker.await.unwrap();
}

#[tokio::test]
async fn nothing_is_queued_when_every_scene_is_done() {
    let h = harness(unused_script(), MockImage::succeeding(), unused_chat(), None);
    assert!(h.state.render_queue.enqueue_awaiting(&h.state).await.is_empty());
}

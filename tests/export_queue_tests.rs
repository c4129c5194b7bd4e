// Integration tests for the export queue against a scripted ffmpeg

mod common;

use std::time::Duration;

use atacut_export::app::export_queue::ExportEvent;
use atacut_export::domain::model::{ExportStep, TextOverlay};
use atacut_export::error::ExportError;
use atacut_export::{Clip, JobStatus};

use common::*;

fn progress_values(events: &[ExportEvent]) -> Vec<u8> {
    events
        .iter()
        .filter(|e| matches!(e, ExportEvent::JobProgress { .. }))
        .map(|e| e.job().progress)
        .collect()
}

fn assert_monotonic(values: &[u8]) {
    assert!(
        values.windows(2).all(|w| w[0] <= w[1]),
        "progress went backwards: {:?}",
        values
    );
}

#[tokio::test]
async fn test_fast_path_job_is_remuxed_in_one_pass() {
    let h = Harness::new(FakeRunner::new(), 2);
    let mut events = h.queue.subscribe();

    let id = h
        .queue
        .submit(h.job("final.mp4", vec![plain_clip("a"), plain_clip("b")]))
        .await
        .unwrap();
    let seen = events_until_terminal(&mut events, id).await;

    assert_eq!(seen.first().unwrap().name(), "job-queued");
    assert_eq!(seen[1].name(), "job-started");
    let last = seen.last().unwrap();
    assert_eq!(last.name(), "job-completed");
    assert_eq!(last.job().progress, 100);
    assert!(last.job().temp_artifacts.is_empty());

    let progress = progress_values(&seen);
    assert_monotonic(&progress);
    assert!(progress.iter().all(|p| *p <= 99));

    let calls = h.runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].label, "concat");
    assert!(calls[0].args.windows(2).any(|w| w == ["-c", "copy"]));
    let manifest = calls[0].manifest.clone().unwrap();
    assert_eq!(
        manifest,
        "file '/media/a.mp4'\nfile '/media/b.mp4'"
    );

    assert!(h.output("final.mp4").exists());
    assert_eq!(h.temp_entries(), 0);
}

#[tokio::test]
async fn test_smart_render_only_renders_modified_clips() {
    let h = Harness::new(FakeRunner::new(), 1);
    let mut events = h.queue.subscribe();

    let id = h
        .queue
        .submit(h.job(
            "final.mp4",
            vec![plain_clip("a"), graded_clip("b"), plain_clip("c")],
        ))
        .await
        .unwrap();
    let seen = events_until_terminal(&mut events, id).await;

    assert_eq!(seen.last().unwrap().job().status, JobStatus::Completed);
    assert_eq!(h.runner.labels(), vec!["render clip b", "concat"]);

    let manifest = h.runner.calls()[1].manifest.clone().unwrap();
    let lines: Vec<&str> = manifest.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "file '/media/a.mp4'");
    assert!(lines[1].contains(&id.to_string()), "segment not in work dir: {}", lines[1]);
    assert_eq!(lines[2], "file '/media/c.mp4'");

    let progress = progress_values(&seen);
    assert_monotonic(&progress);
    assert!(progress.contains(&90));
    assert!(progress.iter().all(|p| *p <= 99));
    assert!(seen.iter().any(|e| e.job().step == Some(ExportStep::Rendering { index: 0, total: 1 })));
    assert!(seen.iter().any(|e| e.job().step == Some(ExportStep::Concatenating)));

    assert_eq!(h.temp_entries(), 0);
}

#[tokio::test]
async fn test_text_clip_is_rendered_from_a_generated_canvas() {
    let h = Harness::new(FakeRunner::new(), 1);
    let overlay = TextOverlay {
        text: "Title".to_string(),
        ..TextOverlay::default()
    };

    let id = h
        .queue
        .submit(h.job(
            "titled.mp4",
            vec![Clip::text("t", overlay, 2.0), plain_clip("a")],
        ))
        .await
        .unwrap();
    let done = h.queue.wait_for(id).await.unwrap();

    assert_eq!(done.status, JobStatus::Completed);
    let calls = h.runner.calls();
    assert_eq!(calls[0].label, "render clip t");
    assert!(calls[0].args.iter().any(|a| a == "lavfi"));
    assert!(calls[0].args.iter().any(|a| a.contains("drawtext")));
}

#[tokio::test]
async fn test_jobs_start_in_submission_order_within_the_limit() {
    let runner = FakeRunner::new().on(
        "concat",
        Behavior::Succeed {
            delay: Duration::from_millis(40),
        },
    );
    let h = Harness::new(runner, 1);
    let mut events = h.queue.subscribe();

    let mut ids = Vec::new();
    for name in ["one.mp4", "two.mp4", "three.mp4"] {
        ids.push(h.queue.submit(h.job(name, vec![plain_clip("a")])).await.unwrap());
    }
    assert_eq!(h.queue.queued_count().await.unwrap(), 2);

    let mut started = Vec::new();
    let mut finished = 0;
    while finished < ids.len() {
        let event = next_event(&mut events, |_| true).await;
        match event {
            ExportEvent::JobStarted { job } => started.push(job.id),
            e if e.is_terminal() => finished += 1,
            _ => {}
        }
    }

    assert_eq!(started, ids);
    assert_eq!(h.runner.max_running(), 1);
}

#[tokio::test]
async fn test_concurrent_jobs_respect_the_limit() {
    let runner = FakeRunner::new().on(
        "concat",
        Behavior::Succeed {
            delay: Duration::from_millis(40),
        },
    );
    let h = Harness::new(runner, 2);

    let mut ids = Vec::new();
    for i in 0..5 {
        let job = h.job(&format!("out-{}.mp4", i), vec![plain_clip("a")]);
        ids.push(h.queue.submit(job).await.unwrap());
    }
    for id in ids {
        assert_eq!(h.queue.wait_for(id).await.unwrap().status, JobStatus::Completed);
    }

    assert_eq!(h.runner.max_running(), 2);
    assert_eq!(h.queue.active_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_cancel_processing_job_stops_ffmpeg_and_cleans_up() {
    let runner = FakeRunner::new().on("render", Behavior::Block);
    let h = Harness::new(runner, 1);
    let mut events = h.queue.subscribe();

    let id = h
        .queue
        .submit(h.job("final.mp4", vec![graded_clip("a"), plain_clip("b")]))
        .await
        .unwrap();
    next_event(&mut events, |e| {
        e.job().step == Some(ExportStep::Rendering { index: 0, total: 1 })
    })
    .await;
    tokio::time::timeout(Duration::from_secs(5), async {
        while h.queue.process_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    h.queue.cancel(id).await.unwrap();
    assert_eq!(h.queue.snapshot(id).await.unwrap().status, JobStatus::Cancelled);

    let cancelled = next_event(&mut events, |e| e.is_terminal()).await;
    assert_eq!(cancelled.name(), "job-cancelled");
    assert!(cancelled.job().error.is_none());

    assert_eq!(h.queue.process_count(), 0);
    assert_eq!(h.temp_entries(), 0);
    assert!(!h.output("final.mp4").exists());
    assert_eq!(h.runner.labels(), vec!["render clip a"]);
    assert!(matches!(
        h.queue.cancel(id).await,
        Err(ExportError::NotCancellable {
            status: JobStatus::Cancelled,
            ..
        })
    ));
}

#[tokio::test]
async fn test_cancel_queued_job_never_starts_it() {
    let runner = FakeRunner::new().on("concat", Behavior::Block);
    let h = Harness::new(runner, 1);
    let mut events = h.queue.subscribe();

    let first = h.queue.submit(h.job("one.mp4", vec![plain_clip("a")])).await.unwrap();
    let second = h.queue.submit(h.job("two.mp4", vec![plain_clip("b")])).await.unwrap();
    assert_eq!(h.queue.snapshot(second).await.unwrap().status, JobStatus::Queued);

    h.queue.cancel(second).await.unwrap();
    let event = next_event(&mut events, |e| e.job_id() == second && e.is_terminal()).await;
    assert_eq!(event.name(), "job-cancelled");
    assert_eq!(h.queue.queued_count().await.unwrap(), 0);

    h.queue.cancel(first).await.unwrap();
    h.queue.wait_for(first).await.unwrap();
    assert!(h
        .runner
        .calls()
        .iter()
        .all(|c| !c.manifest.as_deref().unwrap_or("").contains("/media/b.mp4")));
}

#[tokio::test]
async fn test_completed_job_is_not_cancellable() {
    let h = Harness::new(FakeRunner::new(), 1);
    let id = h.queue.submit(h.job("final.mp4", vec![plain_clip("a")])).await.unwrap();
    h.queue.wait_for(id).await.unwrap();

    let err = h.queue.cancel(id).await.unwrap_err();
    assert!(matches!(
        err,
        ExportError::NotCancellable {
            status: JobStatus::Completed,
            ..
        }
    ));
}

#[tokio::test]
async fn test_failed_render_fails_job_without_concatenating() {
    let runner = FakeRunner::new().on(
        "render",
        Behavior::Fail {
            code: 1,
            stderr: "Invalid data found when processing input".to_string(),
        },
    );
    let h = Harness::new(runner, 1);
    let mut events = h.queue.subscribe();

    let id = h
        .queue
        .submit(h.job("final.mp4", vec![graded_clip("a")]))
        .await
        .unwrap();
    let seen = events_until_terminal(&mut events, id).await;

    match seen.last().unwrap() {
        ExportEvent::JobFailed { error, job } => {
            assert!(error.contains("Invalid data found"), "{}", error);
            assert_eq!(job.error.as_deref(), Some(error.as_str()));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(h.runner.labels(), vec!["render clip a"]);
    assert_eq!(h.temp_entries(), 0);
    assert!(!h.output("final.mp4").exists());
}

#[tokio::test]
async fn test_failed_concat_removes_partial_output() {
    let runner = FakeRunner::new().on(
        "concat",
        Behavior::Fail {
            code: 1,
            stderr: "Conversion failed!".to_string(),
        },
    );
    let h = Harness::new(runner, 1);

    let id = h.queue.submit(h.job("final.mp4", vec![plain_clip("a")])).await.unwrap();
    let done = h.queue.wait_for(id).await.unwrap();

    assert_eq!(done.status, JobStatus::Failed);
    assert!(!h.output("final.mp4").exists());
}

#[tokio::test]
async fn test_failed_render_keeps_existing_output() {
    let runner = FakeRunner::new().on(
        "render",
        Behavior::Fail {
            code: 1,
            stderr: "error".to_string(),
        },
    );
    let h = Harness::new(runner, 1);
    std::fs::write(h.output("final.mp4"), b"previous export").unwrap();

    let id = h.queue.submit(h.job("final.mp4", vec![graded_clip("a")])).await.unwrap();
    assert_eq!(h.queue.wait_for(id).await.unwrap().status, JobStatus::Failed);

    assert_eq!(std::fs::read(h.output("final.mp4")).unwrap(), b"previous export");
}

#[tokio::test]
async fn test_tiny_output_fails_verification() {
    let runner = FakeRunner::new().on("concat", Behavior::TinyOutput);
    let h = Harness::new(runner, 1);

    let id = h.queue.submit(h.job("final.mp4", vec![plain_clip("a")])).await.unwrap();
    let done = h.queue.wait_for(id).await.unwrap();

    assert_eq!(done.status, JobStatus::Failed);
    assert!(done
        .error
        .unwrap_or_default()
        .contains("output file missing or too small"));
    assert!(!h.output("final.mp4").exists());
}

#[tokio::test]
async fn test_shutdown_cancels_queued_and_running_jobs() {
    let runner = FakeRunner::new().on("concat", Behavior::Block);
    let h = Harness::new(runner, 1);
    let mut events = h.queue.subscribe();

    let running = h.queue.submit(h.job("one.mp4", vec![plain_clip("a")])).await.unwrap();
    let waiting = h.queue.submit(h.job("two.mp4", vec![plain_clip("b")])).await.unwrap();
    next_event(&mut events, |e| {
        e.job_id() == running && e.job().step == Some(ExportStep::Concatenating)
    })
    .await;

    tokio::time::timeout(Duration::from_secs(10), h.queue.shutdown())
        .await
        .unwrap()
        .unwrap();

    let mut cancelled = Vec::new();
    while let Ok(event) = events.try_recv() {
        if event.name() == "job-cancelled" {
            cancelled.push(event.job_id());
        }
    }
    assert!(cancelled.contains(&waiting));
    assert!(cancelled.contains(&running));
    assert_eq!(h.temp_entries(), 0);
    assert!(matches!(
        h.queue.submit(h.job("three.mp4", vec![plain_clip("c")])).await,
        Err(ExportError::QueueClosed)
    ));
}

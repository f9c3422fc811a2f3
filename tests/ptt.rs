//! Push-to-talk integration tests

use std::sync::Arc;
use std::time::Duration;

use party_hub::sim::SimulatedAudio;
use party_hub::{
    CloseOutcome, Error, ManualClock, OpenOutcome, PushToTalkCoordinator, Role, SessionStatus,
    TranscriptAggregator,
};

mod common;

use common::wait_ms;

struct Fixture {
    audio: Arc<SimulatedAudio>,
    transcript: Arc<TranscriptAggregator>,
    clock: Arc<ManualClock>,
    ptt: PushToTalkCoordinator,
}

fn fixture(grace: Duration, latency: Duration) -> Fixture {
    let transcript = Arc::new(TranscriptAggregator::new());
    let clock = Arc::new(ManualClock::new(10_000));
    let audio = Arc::new(
        SimulatedAudio::new(grace)
            .with_transcript(transcript.clone(), clock.clone())
            .with_capture_latency(latency),
    );
    let ptt = PushToTalkCoordinator::new(audio.clone(), clock.clone());

    Fixture {
        audio,
        transcript,
        clock,
        ptt,
    }
}

#[tokio::test(start_paused = true)]
async fn test_double_open_starts_one_capture() {
    let f = fixture(Duration::ZERO, Duration::from_millis(200));
    f.audio.set_status(SessionStatus::Connected);

    let (first, second) = tokio::join!(f.ptt.open(), f.ptt.open());

    assert_eq!(first.unwrap(), OpenOutcome::Opened { opened_at_ms: 10_000 });
    assert_eq!(second.unwrap(), OpenOutcome::AlreadyOpen);
    assert_eq!(f.audio.starts(), 1);
    assert_eq!(f.audio.peak_captures(), 1);
    assert_eq!(f.audio.interruptions(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_open_while_closing_is_busy() {
    let f = fixture(Duration::ZERO, Duration::from_millis(200));
    f.audio.set_status(SessionStatus::Connected);
    f.ptt.open().await.unwrap();

    let (closed, reopened) = tokio::join!(f.ptt.close(), async {
        wait_ms(50).await;
        f.ptt.open().await
    });

    assert_eq!(closed.unwrap(), CloseOutcome::Closed { opened_at_ms: 10_000 });
    assert_eq!(reopened.unwrap(), OpenOutcome::Busy);
    assert_eq!(f.audio.active_captures(), 0);
    assert!(f.ptt.can_open());
}

#[tokio::test(start_paused = true)]
async fn test_open_refused_until_audio_ready() {
    let f = fixture(Duration::from_secs(2), Duration::ZERO);

    assert_eq!(f.ptt.open().await.unwrap(), OpenOutcome::Unavailable);

    f.audio.set_status(SessionStatus::Connected);
    assert_eq!(f.ptt.open().await.unwrap(), OpenOutcome::Unavailable);
    assert!(!f.ptt.can_open());

    wait_ms(2_000).await;
    assert!(f.ptt.can_open());
    assert!(matches!(
        f.ptt.open().await.unwrap(),
        OpenOutcome::Opened { .. }
    ));
    assert_eq!(f.audio.starts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_capture_leaves_window_closed() {
    let f = fixture(Duration::ZERO, Duration::ZERO);
    f.audio.set_status(SessionStatus::Connected);
    f.audio.fail_next_capture();

    assert!(matches!(f.ptt.open().await, Err(Error::Audio(_))));
    assert!(!f.ptt.session().is_open);
    assert_eq!(f.ptt.close().await.unwrap(), CloseOutcome::NotOpen);

    assert!(matches!(
        f.ptt.open().await.unwrap(),
        OpenOutcome::Opened { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_each_window_reads_only_its_own_speech() {
    let f = fixture(Duration::ZERO, Duration::ZERO);
    f.audio.set_status(SessionStatus::Connected);

    f.audio.queue_utterance("first answer");
    let OpenOutcome::Opened { opened_at_ms: first } = f.ptt.open().await.unwrap() else {
        panic!("window should open");
    };
    f.clock.advance(800);
    f.ptt.close().await.unwrap();

    f.clock.advance(1_000);
    let OpenOutcome::Opened { opened_at_ms: second } = f.ptt.open().await.unwrap() else {
        panic!("window should open");
    };
    f.clock.advance(800);
    f.ptt.close().await.unwrap();

    assert_eq!(
        f.transcript.latest_since(Role::Player, first).unwrap().text,
        "first answer"
    );
    assert!(f.transcript.latest_since(Role::Player, second).is_none());
    assert_eq!(f.audio.stops(), 2);
}

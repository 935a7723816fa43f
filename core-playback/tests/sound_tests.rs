//! Sound instance behavior: the state machine, timers, fades, and the
//! position arithmetic, all on the paused tokio timeline.

mod support;

use bridge_desktop::device::DeviceActivity;
use bridge_desktop::NullOutputDevice;
use core_playback::{
    Engine, EngineConfig, EngineError, FadeCurve, GroupId, ResourceId, Sound, SoundArgs,
    SoundState,
};
use core_runtime::events::{EngineEvent, SoundEvent};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use support::{engine_with, payload, FakeFetcher};

const CLIP: &str = "clip.wav";

/// Engine set up around a single loaded clip of `ms` milliseconds, with the
/// device activity counters exposed.
async fn ready_engine(ms: usize) -> (Arc<Engine>, Arc<DeviceActivity>) {
    let device = Arc::new(NullOutputDevice::new());
    let activity = device.activity();
    let fetcher = Arc::new(FakeFetcher::new().serve(CLIP, payload(ms)));
    let engine = engine_with(device, fetcher, EngineConfig::default());
    engine.setup().await.unwrap();
    engine.load(&[ResourceId::from(CLIP)]).await;
    (engine, activity)
}

fn make_sound(engine: &Engine, args: SoundArgs) -> Sound {
    engine
        .sound(&ResourceId::from(CLIP), &GroupId::from("g"), args)
        .unwrap()
}

async fn next_sound_event(events: &mut core_runtime::events::Receiver<EngineEvent>) -> SoundEvent {
    loop {
        if let EngineEvent::Sound(e) = events.recv().await.unwrap() {
            return e;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn play_pause_resume_stop_cycle() {
    let (engine, activity) = ready_engine(10_000).await;
    let sound = make_sound(&engine, SoundArgs::default());
    assert_eq!(sound.state(), SoundState::Ready);

    sound.play().unwrap();
    assert_eq!(sound.state(), SoundState::Playing);
    assert_eq!(activity.renders_started.load(Ordering::SeqCst), 1);
    // Playing again is a no-op, not a restart.
    sound.play().unwrap();
    assert_eq!(activity.renders_started.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    sound.pause().unwrap();
    assert_eq!(sound.state(), SoundState::Paused);
    assert_eq!(sound.position(), Duration::from_secs(2));

    // Resuming creates a fresh single-use node at the captured offset.
    sound.play().unwrap();
    assert_eq!(activity.renders_started.load(Ordering::SeqCst), 2);
    assert_eq!(sound.position(), Duration::from_secs(2));

    sound.stop().unwrap();
    assert_eq!(sound.state(), SoundState::Ready);
    assert_eq!(sound.position(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn end_timer_scales_with_rate() {
    let (engine, _) = ready_engine(10_000).await;
    let sound = make_sound(
        &engine,
        SoundArgs {
            rate: 2.0,
            ..Default::default()
        },
    );
    let mut events = engine.emitter().subscribe();

    let started = tokio::time::Instant::now();
    sound.play().unwrap();
    loop {
        if matches!(next_sound_event(&mut events).await, SoundEvent::Ended { .. }) {
            break;
        }
    }
    // A 10 second clip at rate 2.0 ends after 5 seconds of wall time.
    assert_eq!(started.elapsed(), Duration::from_secs(5));
    assert_eq!(sound.state(), SoundState::Ready);
}

#[tokio::test(start_paused = true)]
async fn position_reflects_rate_scaled_elapsed_time() {
    let (engine, _) = ready_engine(10_000).await;
    let sound = make_sound(
        &engine,
        SoundArgs {
            rate: 2.0,
            ..Default::default()
        },
    );

    sound.play().unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(sound.position(), Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn rate_change_rebases_position_and_rearms_the_end_timer() {
    let (engine, _) = ready_engine(10_000).await;
    let sound = make_sound(&engine, SoundArgs::default());
    let mut events = engine.emitter().subscribe();

    let started = tokio::time::Instant::now();
    sound.play().unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    sound.set_rate(2.0).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(sound.position(), Duration::from_secs(4));

    loop {
        if matches!(next_sound_event(&mut events).await, SoundEvent::Ended { .. }) {
            break;
        }
    }
    // 2s at rate 1 covers 2s of media; the remaining 8s at rate 2 takes 4s.
    assert_eq!(started.elapsed(), Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn stale_end_timer_after_stop_is_a_no_op() {
    let (engine, _) = ready_engine(10_000).await;
    let sound = make_sound(&engine, SoundArgs::default());
    let mut events = engine.emitter().subscribe();

    sound.play().unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    sound.stop().unwrap();

    // Long past where the segment would have ended.
    tokio::time::sleep(Duration::from_secs(20)).await;
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let EngineEvent::Sound(e) = event {
            seen.push(e);
        }
    }
    assert!(matches!(seen[0], SoundEvent::Played { .. }));
    assert!(matches!(seen[1], SoundEvent::Stopped { .. }));
    assert!(!seen.iter().any(|e| matches!(e, SoundEvent::Ended { .. })));
}

#[tokio::test(start_paused = true)]
async fn sprite_range_clamps_playback_and_seeks() {
    let (engine, _) = ready_engine(10_000).await;
    let sound = make_sound(
        &engine,
        SoundArgs {
            start: Duration::from_secs(2),
            end: Some(Duration::from_secs(4)),
            ..Default::default()
        },
    );
    let mut events = engine.emitter().subscribe();

    assert!(matches!(
        sound.seek(Duration::from_secs(5)),
        Err(EngineError::InvalidArgument(_))
    ));
    assert!(matches!(
        sound.seek(Duration::from_secs(1)),
        Err(EngineError::InvalidArgument(_))
    ));

    let started = tokio::time::Instant::now();
    sound.play().unwrap();
    assert_eq!(sound.position(), Duration::from_secs(2));
    loop {
        if matches!(next_sound_event(&mut events).await, SoundEvent::Ended { .. }) {
            break;
        }
    }
    // Only the 2 second sub-range plays.
    assert_eq!(started.elapsed(), Duration::from_secs(2));
    assert_eq!(sound.position(), Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn resumed_looping_sound_still_wraps_to_the_range_start() {
    let (engine, activity) = ready_engine(10_000).await;
    let sound = make_sound(
        &engine,
        SoundArgs {
            start: Duration::from_secs(1),
            end: Some(Duration::from_secs(4)),
            looping: true,
            ..Default::default()
        },
    );

    sound.play().unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    sound.pause().unwrap();
    assert_eq!(sound.position(), Duration::from_secs(2));

    // The render resumes mid-segment but loops back to the range start,
    // not to the resume point.
    sound.play().unwrap();
    let params = activity.last_render.lock().clone().unwrap();
    assert!(params.looping);
    assert_eq!(params.offset, Duration::from_secs(2));
    assert_eq!(params.loop_start, Duration::from_secs(1));
    assert_eq!(params.duration, Some(Duration::from_secs(2)));
}

#[tokio::test(start_paused = true)]
async fn seek_while_playing_restarts_at_the_new_offset() {
    let (engine, activity) = ready_engine(10_000).await;
    let sound = make_sound(&engine, SoundArgs::default());
    let mut events = engine.emitter().subscribe();

    sound.play().unwrap();
    sound.seek(Duration::from_secs(7)).unwrap();

    assert_eq!(sound.state(), SoundState::Playing);
    assert_eq!(sound.position(), Duration::from_secs(7));
    // pause + restart means a second render began.
    assert_eq!(activity.renders_started.load(Ordering::SeqCst), 2);

    let mut kinds = Vec::new();
    for _ in 0..4 {
        kinds.push(next_sound_event(&mut events).await);
    }
    assert!(matches!(kinds[3], SoundEvent::Seeked { position_ms: 7000, .. }));
}

#[tokio::test(start_paused = true)]
async fn destroy_is_idempotent_and_fires_once() {
    let (engine, _) = ready_engine(1_000).await;
    let sound = make_sound(&engine, SoundArgs::default());
    let mut events = engine.emitter().subscribe();

    sound.play().unwrap();
    sound.destroy();
    sound.destroy();
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }

    let mut destroyed = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, EngineEvent::Sound(SoundEvent::Destroyed { .. })) {
            destroyed += 1;
        }
    }
    assert_eq!(destroyed, 1);
    assert_eq!(sound.state(), SoundState::Destroyed);
    assert!(matches!(sound.play(), Err(EngineError::SoundDestroyed)));
}

#[tokio::test(start_paused = true)]
async fn transient_one_shot_destroys_itself_at_segment_end() {
    let (engine, _) = ready_engine(1_000).await;
    let sound = make_sound(
        &engine,
        SoundArgs {
            transient: true,
            ..Default::default()
        },
    );
    let mut events = engine.emitter().subscribe();

    sound.play().unwrap();
    loop {
        if matches!(
            next_sound_event(&mut events).await,
            SoundEvent::Destroyed { .. }
        ) {
            break;
        }
    }
    assert_eq!(sound.state(), SoundState::Destroyed);
    assert!(engine.get_sound(sound.id()).is_none());
}

#[tokio::test(start_paused = true)]
async fn fade_completion_lands_on_the_target_volume() {
    let (engine, _) = ready_engine(10_000).await;
    let sound = make_sound(&engine, SoundArgs::default());
    let mut events = engine.emitter().subscribe();

    sound.play().unwrap();
    sound
        .fade(0.2, Duration::from_secs(1), FadeCurve::Linear)
        .unwrap();

    loop {
        if let SoundEvent::FadeEnded { volume, .. } = next_sound_event(&mut events).await {
            assert_eq!(volume, 0.2);
            break;
        }
    }
    assert_eq!(sound.volume(), 0.2);
}

#[tokio::test(start_paused = true)]
async fn fade_stop_snapshots_the_mid_ramp_gain() {
    let (engine, _) = ready_engine(10_000).await;
    let sound = make_sound(&engine, SoundArgs::default());

    sound.play().unwrap();
    sound
        .fade(0.0, Duration::from_secs(1), FadeCurve::Linear)
        .unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    sound.fade_stop();
    let snapshot = sound.volume();
    assert!(snapshot > 0.2 && snapshot < 0.8, "snapshot = {}", snapshot);

    // The cancelled ramp must not keep running.
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(sound.volume(), snapshot);
}

#[tokio::test(start_paused = true)]
async fn a_new_fade_cancels_the_previous_ramp() {
    let (engine, _) = ready_engine(10_000).await;
    let sound = make_sound(&engine, SoundArgs::default());
    let mut events = engine.emitter().subscribe();

    sound.play().unwrap();
    sound
        .fade(0.0, Duration::from_secs(10), FadeCurve::Linear)
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    sound
        .fade(1.0, Duration::from_millis(200), FadeCurve::Linear)
        .unwrap();

    loop {
        if let SoundEvent::FadeEnded { volume, .. } = next_sound_event(&mut events).await {
            // Only the second fade completes.
            assert_eq!(volume, 1.0);
            break;
        }
    }
    assert_eq!(sound.volume(), 1.0);
}

#[tokio::test(start_paused = true)]
async fn mute_preserves_the_logical_volume() {
    let (engine, _) = ready_engine(10_000).await;
    let sound = make_sound(
        &engine,
        SoundArgs {
            volume: 0.7,
            ..Default::default()
        },
    );

    sound.mute();
    assert!(sound.is_muted());
    assert_eq!(sound.volume(), 0.7);

    sound.unmute();
    assert!(!sound.is_muted());
    assert_eq!(sound.volume(), 0.7);

    assert!(sound.set_volume(1.5).is_err());
    assert!(sound.set_rate(0.1).is_err());
    assert!(sound.set_rate(6.0).is_err());
}

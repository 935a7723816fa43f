//! Sound instances.
//!
//! A [`Sound`] is one playable occurrence of a resource: a state machine
//! (`Ready → Playing ⇄ Paused`, terminal `Destroyed`) plus a private gain
//! stage, seek/rate/loop control, fades, and an optional sprite sub-range.
//! Handles are cheap clones over shared state, so the heap, the engine, and
//! timer tasks can all hold the same instance.
//!
//! Timer discipline: every (re)start bumps an epoch and issues a fresh
//! cancellation token, and the end-of-segment handler re-checks both before
//! touching state. A stale timer firing after `stop()` is a no-op.

use crate::error::{EngineError, Result};
use crate::ids::{GroupId, ResourceId, SoundId};
use crate::pool::{NodePool, SharedRenderNode};
use bridge_traits::device::{OutputDevice, RenderMode, RenderParams, RenderSource};
use bridge_traits::time::Clock;
use core_runtime::events::{Emitter, EngineEvent, SoundEvent};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Granularity of fade gain updates.
const FADE_TICK: Duration = Duration::from_millis(25);

/// Lifecycle states of a sound instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundState {
    /// Created or stopped; ready to play from its range start.
    Ready,
    Playing,
    Paused,
    /// Terminal. Every further mutation is a no-op.
    Destroyed,
}

/// Shape of a gain ramp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeCurve {
    Linear,
    /// Quadratic easing, gentler near the starting gain.
    Exponential,
}

impl FadeCurve {
    fn interpolate(&self, from: f32, to: f32, t: f32) -> f32 {
        match self {
            FadeCurve::Linear => from + (to - from) * t,
            FadeCurve::Exponential => from + (to - from) * t * t,
        }
    }
}

/// Construction arguments for a sound instance.
#[derive(Debug, Clone)]
pub struct SoundArgs {
    /// Start of the playable range within the resource.
    pub start: Duration,
    /// End of the playable range. Defaults to the decoded duration for
    /// buffered sounds; unbounded for streaming ones.
    pub end: Option<Duration>,
    pub volume: f32,
    pub rate: f32,
    pub looping: bool,
    pub muted: bool,
    /// Exempt from idle eviction.
    pub persistent: bool,
    /// Auto-destroyed at natural end of segment (one-shots spawned per play).
    pub transient: bool,
    pub mode: RenderMode,
}

impl Default for SoundArgs {
    fn default() -> Self {
        Self {
            start: Duration::ZERO,
            end: None,
            volume: 1.0,
            rate: 1.0,
            looping: false,
            muted: false,
            persistent: false,
            transient: false,
            mode: RenderMode::Buffered,
        }
    }
}

/// Shared collaborators handed to every sound an engine creates.
pub(crate) struct SoundCtx {
    pub device: Arc<dyn OutputDevice>,
    pub clock: Arc<dyn Clock>,
    pub emitter: Emitter,
    pub pool: Weak<NodePool>,
}

struct SoundInner {
    state: SoundState,
    resource: ResourceId,
    group: GroupId,
    source: RenderSource,
    mode: RenderMode,
    volume: f32,
    rate: f32,
    muted: bool,
    looping: bool,
    persistent: bool,
    transient: bool,
    start: Duration,
    end: Option<Duration>,
    /// Stored playback offset; live position while playing adds elapsed*rate.
    offset: Duration,
    started_at: Option<Duration>,
    last_played: Duration,
    node: Option<SharedRenderNode>,
    end_timer: Option<CancellationToken>,
    fade: Option<CancellationToken>,
    /// Bumped on every (re)start; stale timers carry the old value.
    epoch: u64,
}

/// Clonable handle to one playable instance.
#[derive(Clone)]
pub struct Sound {
    id: SoundId,
    inner: Arc<Mutex<SoundInner>>,
    ctx: Arc<SoundCtx>,
}

fn effective_gain(inner: &SoundInner) -> f32 {
    if inner.muted {
        0.0
    } else {
        inner.volume
    }
}

impl Sound {
    pub(crate) fn new(
        id: SoundId,
        resource: ResourceId,
        group: GroupId,
        source: RenderSource,
        ctx: Arc<SoundCtx>,
        args: SoundArgs,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&args.volume) {
            return Err(EngineError::InvalidArgument(format!(
                "volume must be within [0.0, 1.0], got {}",
                args.volume
            )));
        }
        validate_rate(args.rate)?;

        let total = match &source {
            RenderSource::Decoded(audio) => Some(audio.duration()),
            RenderSource::Stream(_) => None,
        };
        let end = args.end.or(total);
        if let Some(end) = end {
            if end <= args.start {
                return Err(EngineError::InvalidArgument(format!(
                    "range end {:?} must be after start {:?}",
                    end, args.start
                )));
            }
        }

        let now = ctx.clock.monotonic();
        Ok(Self {
            id,
            inner: Arc::new(Mutex::new(SoundInner {
                state: SoundState::Ready,
                resource,
                group,
                source,
                mode: args.mode,
                volume: args.volume,
                rate: args.rate,
                muted: args.muted,
                looping: args.looping,
                persistent: args.persistent,
                transient: args.transient,
                start: args.start,
                end,
                offset: args.start,
                started_at: None,
                last_played: now,
                node: None,
                end_timer: None,
                fade: None,
                epoch: 0,
            })),
            ctx,
        })
    }

    pub fn id(&self) -> SoundId {
        self.id
    }

    pub fn resource(&self) -> ResourceId {
        self.inner.lock().resource.clone()
    }

    pub fn group(&self) -> GroupId {
        self.inner.lock().group.clone()
    }

    pub fn state(&self) -> SoundState {
        self.inner.lock().state
    }

    pub fn volume(&self) -> f32 {
        self.inner.lock().volume
    }

    pub fn rate(&self) -> f32 {
        self.inner.lock().rate
    }

    pub fn is_muted(&self) -> bool {
        self.inner.lock().muted
    }

    pub fn is_looping(&self) -> bool {
        self.inner.lock().looping
    }

    pub fn is_persistent(&self) -> bool {
        self.inner.lock().persistent
    }

    /// Mark or unmark this instance as exempt from idle eviction.
    pub fn set_persistent(&self, persistent: bool) {
        self.inner.lock().persistent = persistent;
    }

    /// Toggle looping. Takes effect on the next (re)start.
    pub fn set_looping(&self, looping: bool) {
        self.inner.lock().looping = looping;
    }

    /// Begin or resume playback. A no-op while already playing.
    pub fn play(&self) -> Result<()> {
        let event = {
            let mut inner = self.inner.lock();
            match inner.state {
                SoundState::Destroyed => return Err(EngineError::SoundDestroyed),
                SoundState::Playing => return Ok(()),
                SoundState::Ready | SoundState::Paused => {}
            }

            let offset = clamp_offset(&inner);
            let node = self.acquire_node_locked(&mut inner)?;
            let remaining = inner.end.map(|end| end.saturating_sub(offset));
            let params = RenderParams {
                offset,
                duration: remaining,
                rate: inner.rate,
                looping: inner.looping,
                // A looping render always wraps to the range start, even
                // when this (re)start enters the segment mid-way.
                loop_start: inner.start,
                gain: effective_gain(&inner),
            };
            node.lock().start(inner.source.clone(), params)?;

            let now = self.ctx.clock.monotonic();
            inner.offset = offset;
            inner.state = SoundState::Playing;
            inner.started_at = Some(now);
            inner.last_played = now;
            inner.epoch += 1;
            if !inner.looping {
                if let Some(remaining) = remaining {
                    self.arm_end_timer_locked(&mut inner, remaining);
                }
            }
            EngineEvent::Sound(SoundEvent::Played { sound: self.id.0 })
        };
        self.ctx.emitter.emit(event);
        Ok(())
    }

    /// Pause, capturing the live position. A no-op unless playing.
    pub fn pause(&self) -> Result<()> {
        let event = {
            let mut inner = self.inner.lock();
            match inner.state {
                SoundState::Destroyed => return Err(EngineError::SoundDestroyed),
                SoundState::Playing => {}
                SoundState::Ready | SoundState::Paused => return Ok(()),
            }
            self.cancel_fade_locked(&mut inner);
            self.cancel_end_timer_locked(&mut inner);
            inner.offset = live_position(&inner, self.ctx.clock.monotonic());
            self.release_node_locked(&mut inner);
            inner.started_at = None;
            inner.state = SoundState::Paused;
            EngineEvent::Sound(SoundEvent::Paused {
                sound: self.id.0,
                position_ms: inner.offset.as_millis() as u64,
            })
        };
        self.ctx.emitter.emit(event);
        Ok(())
    }

    /// Stop and reset the offset to the range start. A no-op unless playing
    /// or paused.
    pub fn stop(&self) -> Result<()> {
        let event = {
            let mut inner = self.inner.lock();
            match inner.state {
                SoundState::Destroyed => return Err(EngineError::SoundDestroyed),
                SoundState::Playing | SoundState::Paused => {}
                SoundState::Ready => return Ok(()),
            }
            self.cancel_fade_locked(&mut inner);
            self.cancel_end_timer_locked(&mut inner);
            self.release_node_locked(&mut inner);
            inner.offset = inner.start;
            inner.started_at = None;
            inner.state = SoundState::Ready;
            EngineEvent::Sound(SoundEvent::Stopped { sound: self.id.0 })
        };
        self.ctx.emitter.emit(event);
        Ok(())
    }

    /// Current playback position within the resource.
    pub fn position(&self) -> Duration {
        let inner = self.inner.lock();
        live_position(&inner, self.ctx.clock.monotonic())
    }

    /// Jump to `pos` within the playable range. While playing this restarts
    /// the render at the new offset.
    pub fn seek(&self, pos: Duration) -> Result<()> {
        let was_playing = {
            let inner = self.inner.lock();
            if inner.state == SoundState::Destroyed {
                return Err(EngineError::SoundDestroyed);
            }
            if pos < inner.start || inner.end.is_some_and(|end| pos > end) {
                return Err(EngineError::InvalidArgument(format!(
                    "seek position {:?} outside range [{:?}, {:?}]",
                    pos, inner.start, inner.end
                )));
            }
            inner.state == SoundState::Playing
        };

        if was_playing {
            self.pause()?;
        }
        self.inner.lock().offset = pos;
        if was_playing {
            self.play()?;
        }

        self.ctx.emitter.emit(EngineEvent::Sound(SoundEvent::Seeked {
            sound: self.id.0,
            position_ms: pos.as_millis() as u64,
        }));
        Ok(())
    }

    /// Change the playback rate. While playing, the position baseline and
    /// the end-of-segment timer are recomputed for the new rate.
    pub fn set_rate(&self, rate: f32) -> Result<()> {
        validate_rate(rate)?;
        let mut inner = self.inner.lock();
        if inner.state == SoundState::Destroyed {
            return Err(EngineError::SoundDestroyed);
        }

        if inner.state == SoundState::Playing {
            let now = self.ctx.clock.monotonic();
            inner.offset = live_position(&inner, now);
            inner.started_at = Some(now);
        }
        inner.rate = rate;
        if let Some(node) = &inner.node {
            node.lock().set_rate(rate);
        }
        if inner.state == SoundState::Playing && !inner.looping {
            if let Some(remaining) = inner.end.map(|end| end.saturating_sub(inner.offset)) {
                self.arm_end_timer_locked(&mut inner, remaining);
            }
        }
        Ok(())
    }

    /// Set the logical volume, cancelling any active fade.
    pub fn set_volume(&self, volume: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(EngineError::InvalidArgument(format!(
                "volume must be within [0.0, 1.0], got {}",
                volume
            )));
        }
        let mut inner = self.inner.lock();
        if inner.state == SoundState::Destroyed {
            return Err(EngineError::SoundDestroyed);
        }
        self.cancel_fade_locked(&mut inner);
        inner.volume = volume;
        self.apply_gain_locked(&inner);
        Ok(())
    }

    /// Silence the instance without touching its logical volume.
    pub fn mute(&self) {
        let mut inner = self.inner.lock();
        if inner.state == SoundState::Destroyed {
            return;
        }
        self.cancel_fade_locked(&mut inner);
        inner.muted = true;
        self.apply_gain_locked(&inner);
    }

    pub fn unmute(&self) {
        let mut inner = self.inner.lock();
        if inner.state == SoundState::Destroyed {
            return;
        }
        self.cancel_fade_locked(&mut inner);
        inner.muted = false;
        self.apply_gain_locked(&inner);
    }

    /// Ramp the gain to `to` over `duration`. A new fade cancels the prior
    /// ramp; completion sets the logical volume to `to` and emits a
    /// fade-ended event.
    pub fn fade(&self, to: f32, duration: Duration, curve: FadeCurve) -> Result<()> {
        if !(0.0..=1.0).contains(&to) {
            return Err(EngineError::InvalidArgument(format!(
                "fade target must be within [0.0, 1.0], got {}",
                to
            )));
        }
        let (token, from) = {
            let mut inner = self.inner.lock();
            if inner.state == SoundState::Destroyed {
                return Err(EngineError::SoundDestroyed);
            }
            self.cancel_fade_locked(&mut inner);
            let token = CancellationToken::new();
            inner.fade = Some(token.clone());
            (token, inner.volume)
        };

        let sound = self.clone();
        tokio::spawn(async move {
            sound.run_fade(token, from, to, duration, curve).await;
        });
        Ok(())
    }

    /// Cancel any active fade, keeping the mid-ramp gain as the new logical
    /// volume.
    pub fn fade_stop(&self) {
        let mut inner = self.inner.lock();
        self.cancel_fade_locked(&mut inner);
    }

    /// Destroy this instance. Idempotent; the destroyed event fires exactly
    /// once.
    pub fn destroy(&self) {
        let event = {
            let mut inner = self.inner.lock();
            if inner.state == SoundState::Destroyed {
                return;
            }
            debug!(sound = self.id.0, "destroying sound");
            self.cancel_fade_locked(&mut inner);
            self.cancel_end_timer_locked(&mut inner);
            self.release_node_locked(&mut inner);
            inner.started_at = None;
            inner.state = SoundState::Destroyed;
            EngineEvent::Sound(SoundEvent::Destroyed { sound: self.id.0 })
        };
        self.ctx.emitter.emit(event);
    }

    /// Whether the idle sweep may destroy this instance right now.
    pub(crate) fn sweep_eligible(&self, now: Duration, threshold: Duration) -> bool {
        let inner = self.inner.lock();
        !inner.persistent
            && inner.state == SoundState::Ready
            && now.saturating_sub(inner.last_played) > threshold
    }

    fn acquire_node_locked(&self, inner: &mut SoundInner) -> Result<SharedRenderNode> {
        if let Some(node) = &inner.node {
            return Ok(Arc::clone(node));
        }
        let node = match inner.mode {
            RenderMode::Buffered => Arc::new(Mutex::new(
                self.ctx.device.create_render_node(RenderMode::Buffered)?,
            )),
            RenderMode::Streaming => {
                let pool = self.ctx.pool.upgrade().ok_or_else(|| {
                    EngineError::PoolUsage("node pool is gone".to_string())
                })?;
                pool.allocate_for_sound(&inner.resource, &inner.group, self.id)?
            }
        };
        inner.node = Some(Arc::clone(&node));
        Ok(node)
    }

    /// Stop and drop the active node. Buffered nodes are single-use and
    /// simply discarded; streaming nodes go back to their group's pool slot.
    fn release_node_locked(&self, inner: &mut SoundInner) {
        if let Some(node) = inner.node.take() {
            let _ = node.lock().stop();
            if inner.mode == RenderMode::Streaming {
                if let Some(pool) = self.ctx.pool.upgrade() {
                    pool.release_for_sound(&inner.resource, &inner.group, self.id);
                }
            }
        }
    }

    fn apply_gain_locked(&self, inner: &SoundInner) {
        if let Some(node) = &inner.node {
            node.lock().set_gain(effective_gain(inner));
        }
    }

    fn cancel_fade_locked(&self, inner: &mut SoundInner) {
        if let Some(token) = inner.fade.take() {
            token.cancel();
        }
    }

    fn cancel_end_timer_locked(&self, inner: &mut SoundInner) {
        if let Some(token) = inner.end_timer.take() {
            token.cancel();
        }
    }

    fn arm_end_timer_locked(&self, inner: &mut SoundInner, remaining: Duration) {
        self.cancel_end_timer_locked(inner);
        let scaled = Duration::from_secs_f64(remaining.as_secs_f64() / inner.rate as f64);
        let token = CancellationToken::new();
        inner.end_timer = Some(token.clone());

        let epoch = inner.epoch;
        let sound = self.clone();
        let sleep = self.ctx.clock.sleep(scaled);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = sleep => sound.finish_segment(epoch),
            }
        });
    }

    /// End-of-segment handler. Guarded against stale timers by epoch and
    /// state.
    fn finish_segment(&self, epoch: u64) {
        let (event, auto_destroy) = {
            let mut inner = self.inner.lock();
            if inner.state != SoundState::Playing || inner.epoch != epoch {
                return;
            }
            inner.end_timer = None;
            self.release_node_locked(&mut inner);
            inner.offset = inner.start;
            inner.started_at = None;
            inner.state = SoundState::Ready;
            (
                EngineEvent::Sound(SoundEvent::Ended { sound: self.id.0 }),
                inner.transient && !inner.persistent && !inner.looping,
            )
        };
        self.ctx.emitter.emit(event);
        if auto_destroy {
            self.destroy();
        }
    }

    async fn run_fade(
        &self,
        token: CancellationToken,
        from: f32,
        to: f32,
        duration: Duration,
        curve: FadeCurve,
    ) {
        let steps = ((duration.as_millis() / FADE_TICK.as_millis()).max(1)) as u32;
        let tick = duration / steps;
        for step in 1..=steps {
            let sleep = self.ctx.clock.sleep(tick);
            tokio::select! {
                _ = token.cancelled() => return,
                _ = sleep => {}
            }
            let t = step as f32 / steps as f32;
            let value = curve.interpolate(from, to, t);
            let done = step == steps;
            let event = {
                let mut inner = self.inner.lock();
                if inner.state == SoundState::Destroyed || token.is_cancelled() {
                    return;
                }
                inner.volume = value;
                self.apply_gain_locked(&inner);
                if done {
                    inner.volume = to;
                    inner.fade = None;
                    Some(EngineEvent::Sound(SoundEvent::FadeEnded {
                        sound: self.id.0,
                        volume: to,
                    }))
                } else {
                    None
                }
            };
            if let Some(event) = event {
                self.ctx.emitter.emit(event);
            }
        }
    }
}

impl std::fmt::Debug for Sound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Sound")
            .field("id", &self.id)
            .field("resource", &inner.resource)
            .field("group", &inner.group)
            .field("state", &inner.state)
            .finish()
    }
}

fn validate_rate(rate: f32) -> Result<()> {
    if !(crate::config::MIN_RATE..=crate::config::MAX_RATE).contains(&rate) {
        return Err(EngineError::InvalidArgument(format!(
            "rate must be within [{}, {}], got {}",
            crate::config::MIN_RATE,
            crate::config::MAX_RATE,
            rate
        )));
    }
    Ok(())
}

/// Live position: stored offset plus rate-scaled wall time while playing.
fn live_position(inner: &SoundInner, now: Duration) -> Duration {
    let position = match (inner.state, inner.started_at) {
        (SoundState::Playing, Some(started_at)) => {
            let elapsed = now.saturating_sub(started_at);
            inner.offset + Duration::from_secs_f64(elapsed.as_secs_f64() * inner.rate as f64)
        }
        _ => inner.offset,
    };
    match inner.end {
        Some(end) => position.min(end),
        None => position,
    }
}

/// Start offset for the next render: the stored position when it is inside
/// the playable range, otherwise the range start.
fn clamp_offset(inner: &SoundInner) -> Duration {
    if inner.offset < inner.start {
        return inner.start;
    }
    if let Some(end) = inner.end {
        if inner.offset >= end {
            return inner.start;
        }
    }
    inner.offset
}

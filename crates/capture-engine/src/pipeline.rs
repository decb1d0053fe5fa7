//! Render worker and its control-side handle.
//!
//! The worker owns the render target, the source registry, and the
//! scheduler, and runs on its own OS thread with a current-thread tokio
//! runtime. The control plane reaches it only through a command channel and
//! hears back through an event channel; composed frames are published on a
//! latest-value preview channel. The recorder is the one piece of state both
//! sides touch, and its reads go through immutable snapshots.

use std::mem;
use std::ops::ControlFlow;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::time::{Interval, MissedTickBehavior};

use livemix_common::clock::duration_ms;
use livemix_common::config::{AppConfig, BufferConfig};
use livemix_common::error::{LivemixError, LivemixResult};
use livemix_layout_model::engine::resolve;
use livemix_layout_model::layout::{BackgroundRef, Layout, RawLayout, RawOverlay, RawPosition};
use livemix_layout_model::source::{FrameSource, SourceId};
use livemix_render_engine::compositor::CompositeRenderer;
use livemix_render_engine::sources::{FrameFeed, SourceRegistry};
use livemix_render_engine::target::{CompositeFrame, RenderTarget};

use crate::clip::{ClipArtifact, ClipExtractor, ClipRequest};
use crate::control::{Command, ControlEvent, ControlMessage};
use crate::recorder::{FrameEncoder, RawRgbaEncoder, RecorderConfig, RollingBufferRecorder};
use crate::scheduler::{FrameScheduler, Transition};

/// Name of the render worker thread.
pub const RENDER_THREAD_NAME: &str = "livemix-render";

/// Settings for spawning a pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub buffer: BufferConfig,
    /// Output rate assumed by the recorder until `init` names one.
    pub default_fps: u32,
    /// Capacity of the command channel.
    pub command_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer: BufferConfig::default(),
            default_fps: 30,
            command_capacity: 64,
        }
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            buffer: config.buffer.clone(),
            default_fps: config.canvas.fps,
            ..Self::default()
        }
    }
}

/// Control-side handle to a running render worker.
pub struct PipelineHandle {
    commands: mpsc::Sender<Command>,
    recorder: RollingBufferRecorder,
    preview: watch::Receiver<Option<CompositeFrame>>,
    worker: Option<JoinHandle<()>>,
}

impl PipelineHandle {
    /// Spawn the render worker thread. Returns the handle and the event stream.
    pub fn spawn(
        config: PipelineConfig,
    ) -> LivemixResult<(Self, mpsc::UnboundedReceiver<ControlEvent>)> {
        Self::spawn_with_encoder(config, Box::new(RawRgbaEncoder))
    }

    /// Like [`PipelineHandle::spawn`], buffering frames through `encoder`.
    pub fn spawn_with_encoder(
        config: PipelineConfig,
        encoder: Box<dyn FrameEncoder>,
    ) -> LivemixResult<(Self, mpsc::UnboundedReceiver<ControlEvent>)> {
        let recorder = RollingBufferRecorder::with_encoder(
            RecorderConfig::from_buffer(&config.buffer, config.default_fps)?,
            encoder,
        );
        let (command_tx, command_rx) = mpsc::channel(config.command_capacity.max(1));
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (preview_tx, preview_rx) = watch::channel(None);

        let worker = RenderWorker {
            sources: SourceRegistry::new(),
            renderer: CompositeRenderer::new(),
            recorder: recorder.clone(),
            events: event_tx,
            preview: preview_tx,
            state: WorkerState::Uninitialized,
        };

        let thread = std::thread::Builder::new()
            .name(RENDER_THREAD_NAME.to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(err) => {
                        tracing::error!(error = %err, "Failed to create render runtime");
                        let _ = worker.events.send(ControlEvent::Error {
                            message: format!("Failed to create render runtime: {err}"),
                        });
                        return;
                    }
                };
                runtime.block_on(worker.run(command_rx));
            })?;

        tracing::debug!(thread = RENDER_THREAD_NAME, "Render worker spawned");
        Ok((
            Self {
                commands: command_tx,
                recorder,
                preview: preview_rx,
                worker: Some(thread),
            },
            event_rx,
        ))
    }

    /// Queue a command for the worker.
    pub async fn send(&self, command: impl Into<Command>) -> LivemixResult<()> {
        self.commands
            .send(command.into())
            .await
            .map_err(|_| LivemixError::control("render worker has exited"))
    }

    pub async fn init(&self, width: u32, height: u32, fps: u32) -> LivemixResult<()> {
        self.send(ControlMessage::Init {
            target_width: width,
            target_height: height,
            fps,
        })
        .await
    }

    /// Start rendering, updating whichever layout parts are given.
    pub async fn render(
        &self,
        layout: Option<Vec<RawPosition>>,
        background: Option<BackgroundRef>,
        overlays: Option<Vec<RawOverlay>>,
    ) -> LivemixResult<()> {
        self.send(ControlMessage::Render {
            layout,
            background,
            overlays,
        })
        .await
    }

    pub async fn update_layout(&self, layout: RawLayout) -> LivemixResult<()> {
        self.send(ControlMessage::UpdateLayout { layout }).await
    }

    pub async fn stop(&self) -> LivemixResult<()> {
        self.send(ControlMessage::Stop).await
    }

    pub async fn add_source(
        &self,
        source: FrameSource,
        feed: Box<dyn FrameFeed>,
    ) -> LivemixResult<()> {
        self.send(Command::AddSource { source, feed }).await
    }

    pub async fn remove_source(&self, id: impl Into<SourceId>) -> LivemixResult<()> {
        self.send(Command::RemoveSource(id.into())).await
    }

    /// Seconds of composed output currently buffered.
    pub fn buffered_duration(&self) -> Duration {
        self.recorder.buffered_duration()
    }

    /// Cut the most recent stretch of output from the rolling buffer.
    /// Accepts a [`ClipRequest`] or plain seconds.
    pub fn extract_clip(&self, request: impl Into<ClipRequest>) -> LivemixResult<ClipArtifact> {
        ClipExtractor::extract(&self.recorder.snapshot(), request)
    }

    pub fn recorder(&self) -> &RollingBufferRecorder {
        &self.recorder
    }

    /// Latest composed frame; `None` before the first frame and after stop.
    pub fn preview(&self) -> watch::Receiver<Option<CompositeFrame>> {
        self.preview.clone()
    }

    /// Stop the worker and wait for its thread to exit.
    pub async fn shutdown(mut self) -> LivemixResult<()> {
        // The worker may already be gone; joining below is what matters.
        let _ = self.commands.send(Command::Shutdown).await;
        let Some(thread) = self.worker.take() else {
            return Ok(());
        };
        let joined = tokio::task::spawn_blocking(move || thread.join())
            .await
            .map_err(|e| LivemixError::control(format!("failed to join render worker: {e}")))?;
        joined.map_err(|_| LivemixError::control("render worker panicked"))?;
        tracing::debug!("Render worker joined");
        Ok(())
    }
}

impl std::fmt::Debug for PipelineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineHandle")
            .field("recorder", &self.recorder)
            .field("worker_alive", &self.worker.is_some())
            .finish()
    }
}

/// Per-`init` render state.
struct RenderSession {
    target: RenderTarget,
    scheduler: FrameScheduler,
    raw: RawLayout,
    layout: Layout,
    /// Swapped in at the start of the next tick.
    pending: Option<Layout>,
}

impl RenderSession {
    fn new(target: RenderTarget) -> Self {
        let layout = Layout::empty(target.width(), target.height());
        let scheduler = FrameScheduler::new(target.fps());
        Self {
            target,
            scheduler,
            raw: RawLayout::default(),
            layout,
            pending: None,
        }
    }

    fn stage_layout(&mut self) {
        self.pending = Some(resolve(&self.raw, self.target.width(), self.target.height()));
    }
}

enum WorkerState {
    Uninitialized,
    Ready(RenderSession),
    Stopped,
}

struct RenderWorker {
    sources: SourceRegistry,
    renderer: CompositeRenderer,
    recorder: RollingBufferRecorder,
    events: mpsc::UnboundedSender<ControlEvent>,
    preview: watch::Sender<Option<CompositeFrame>>,
    state: WorkerState,
}

impl RenderWorker {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        tracing::info!("Render worker started");
        let mut ticker: Option<Interval> = None;

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => {
                    let Some(command) = command else {
                        tracing::debug!("Command channel closed");
                        self.stop_session();
                        break;
                    };
                    if self.handle(command).is_break() {
                        break;
                    }
                    self.sync_ticker(&mut ticker);
                }

                scheduled = async {
                    match ticker.as_mut() {
                        Some(t) => t.tick().await,
                        None => std::future::pending().await,
                    }
                } => {
                    self.on_tick(scheduled.into_std());
                }
            }
        }

        tracing::info!("Render worker exited");
    }

    /// Create or drop the interval timer to match the scheduler.
    fn sync_ticker(&self, ticker: &mut Option<Interval>) {
        let running = match &self.state {
            WorkerState::Ready(session) if session.scheduler.is_running() => session
                .scheduler
                .clock()
                .map(|clock| (clock.epoch(), session.scheduler.interval())),
            _ => None,
        };
        match running {
            Some((epoch, period)) if ticker.is_none() => {
                let mut interval =
                    tokio::time::interval_at(tokio::time::Instant::from_std(epoch), period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                *ticker = Some(interval);
            }
            Some(_) => {}
            None => *ticker = None,
        }
    }

    fn emit(&self, event: ControlEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    fn handle(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Message(message) => {
                let kind = message.kind();
                tracing::debug!(kind, "Control message received");
                if let Err(e) = self.handle_message(message) {
                    tracing::warn!(kind, error = %e, "Control message rejected");
                    self.emit(ControlEvent::error(&e));
                }
            }
            Command::AddSource { source, feed } => {
                let id = source.id.clone();
                if self.sources.register(source, feed).is_some() {
                    tracing::debug!(source = %id, "Replaced existing frame source");
                }
            }
            Command::RemoveSource(id) => {
                if !self.sources.remove(&id) {
                    tracing::debug!(source = %id, "Remove for unknown frame source");
                }
            }
            Command::Shutdown => {
                self.stop_session();
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn handle_message(&mut self, message: ControlMessage) -> LivemixResult<()> {
        match message {
            ControlMessage::Init {
                target_width,
                target_height,
                fps,
            } => {
                if matches!(self.state, WorkerState::Ready(_)) {
                    return Err(LivemixError::control(
                        "pipeline already initialized; stop it before re-initializing",
                    ));
                }
                let target = RenderTarget::new(target_width, target_height, fps)?;
                self.recorder.set_fps(fps)?;
                self.state = WorkerState::Ready(RenderSession::new(target));
                tracing::info!(
                    width = target_width,
                    height = target_height,
                    fps,
                    "Pipeline initialized"
                );
                self.emit(ControlEvent::Initialized {
                    width: target_width,
                    height: target_height,
                    fps,
                });
                Ok(())
            }
            ControlMessage::Render {
                layout,
                background,
                overlays,
            } => {
                let session = self.session_mut("render")?;
                session.raw.merge(layout, background, overlays);
                session.stage_layout();
                if session.scheduler.start(Instant::now()) == Transition::Applied {
                    if let Some(clock) = session.scheduler.clock() {
                        tracing::info!(started_at = clock.epoch_wall(), "Rendering started");
                    }
                    self.recorder.start();
                }
                Ok(())
            }
            ControlMessage::UpdateLayout { layout } => {
                let session = self.session_mut("updateLayout")?;
                session.raw = layout;
                session.stage_layout();
                Ok(())
            }
            ControlMessage::Stop => match self.state {
                WorkerState::Uninitialized => Err(LivemixError::not_initialized(
                    "stop received before init",
                )),
                WorkerState::Stopped => {
                    tracing::debug!("Pipeline already stopped");
                    Ok(())
                }
                WorkerState::Ready(_) => {
                    self.stop_session();
                    Ok(())
                }
            },
        }
    }

    fn session_mut(&mut self, kind: &str) -> LivemixResult<&mut RenderSession> {
        match &mut self.state {
            WorkerState::Ready(session) => Ok(session),
            WorkerState::Uninitialized => Err(LivemixError::not_initialized(format!(
                "{kind} received before init"
            ))),
            WorkerState::Stopped => Err(LivemixError::not_initialized(format!(
                "{kind} received after stop; send init to start a new session"
            ))),
        }
    }

    /// Tear down the render session: target, sources, and buffer.
    fn stop_session(&mut self) {
        if !matches!(self.state, WorkerState::Ready(_)) {
            return;
        }
        let WorkerState::Ready(mut session) = mem::replace(&mut self.state, WorkerState::Stopped)
        else {
            return;
        };
        session.scheduler.stop();
        drop(session);

        let released = self.sources.clear();
        self.recorder.stop();
        self.preview.send_replace(None);
        tracing::info!(released_sources = released, "Pipeline stopped");
        self.emit(ControlEvent::Stopped);
    }

    fn on_tick(&mut self, scheduled: Instant) {
        let WorkerState::Ready(session) = &mut self.state else {
            return;
        };
        let Some(tick) = session.scheduler.poll_tick(scheduled) else {
            return;
        };
        if let Some(layout) = session.pending.take() {
            session.layout = layout;
        }

        let started = Instant::now();
        self.sources.refresh();
        let outcome = match self.renderer.draw(
            &mut session.target,
            &session.layout,
            &self.sources,
            tick.sequence,
            tick.timestamp,
        ) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(sequence = tick.sequence, error = %e, "Frame failed");
                let _ = self.events.send(ControlEvent::error(&e));
                return;
            }
        };

        if let Err(e) = self.recorder.on_frame(&outcome.frame, tick.timestamp) {
            tracing::warn!(sequence = tick.sequence, error = %e, "Failed to buffer frame");
            let _ = self.events.send(ControlEvent::error(&e));
        }
        let frame_time = started.elapsed();
        session.scheduler.finish_tick(&tick, frame_time);

        tracing::trace!(
            sequence = tick.sequence,
            frame_ms = duration_ms(frame_time),
            drawn = outcome.report.drawn,
            placeholders = outcome.report.placeholders,
            failures = outcome.report.failures.len(),
            "Frame rendered"
        );
        self.preview.send_replace(Some(outcome.frame));
        let _ = self
            .events
            .send(ControlEvent::frame_rendered(&tick, frame_time));
    }
}

//! The per-member synchronization controller.
//!
//! [`SyncClient`] consumes server messages, keeps a [`SessionView`], and
//! drives the active [`ProviderAdapter`]:
//! - every member reconciles local playback against the shared now-playing
//! - the host additionally samples its adapter, publishes `host:state`,
//!   detects track ends and executes forwarded controls
//!
//! Message handling and poll ticks are serialized through one async mutex,
//! so adapter calls never interleave.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::Instant;

use super::advance::{play_next, play_previous};
use super::end_detector::EndDetector;
use super::poller::{PollContext, Poller};
use super::provider::{ProviderAdapter, ProviderError};
use super::reconcile::{load_key, ReconcileAction, Reconciler};
use super::resolver::TrackResolver;
use super::view::{SessionView, ViewChange};
use super::{ClientError, ClientStatus, SyncClientConfig};
use crate::model::{IncomingTrack, NowPlaying, QueueId, Track};
use crate::protocol::{
    AddTrackRequest, ClientMessage, ControlKind, CreateSessionRequest, EmptyPayload,
    GuestControlRequest, HostStateRequest, JoinSessionRequest, PartyModeRequest,
    RemoveTrackRequest, ReorderRequest, ServerMessage,
};

// ─────────────────────────────────────────────────────────────────────────────
// Advance lock
// ─────────────────────────────────────────────────────────────────────────────

/// At most one automatic advance in flight. Released on success, or by the
/// timeout when a transition fails.
#[derive(Debug)]
pub struct AdvanceLock {
    timeout_ms: u64,
    engaged_at: Option<u64>,
}

impl AdvanceLock {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            engaged_at: None,
        }
    }

    pub fn is_engaged(&self, now_ms: u64) -> bool {
        self.engaged_at
            .is_some_and(|at| now_ms.saturating_sub(at) < self.timeout_ms)
    }

    /// Engages the lock. Returns false if it is already held.
    pub fn try_engage(&mut self, now_ms: u64) -> bool {
        if self.is_engaged(now_ms) {
            return false;
        }
        self.engaged_at = Some(now_ms);
        true
    }

    pub fn release(&mut self) {
        self.engaged_at = None;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine state
// ─────────────────────────────────────────────────────────────────────────────

struct Engine {
    view: SessionView,
    providers: Vec<Arc<dyn ProviderAdapter>>,
    active: usize,
    reconciler: Reconciler,
    /// Queue entry currently loaded on the active adapter.
    loaded_queue_id: Option<QueueId>,
    end_detector: EndDetector,
    advance_lock: AdvanceLock,
    /// Poll publishes are suppressed until this instant (engine ms).
    publish_hold_until: u64,
    last_published: Option<NowPlaying>,
}

impl Engine {
    fn active_provider(&self) -> Arc<dyn ProviderAdapter> {
        Arc::clone(&self.providers[self.active])
    }

    /// True when the host's view was just handed an entry other than the one
    /// its adapter is playing. Such values are late echoes of earlier
    /// publishes; the host's adapter is authoritative.
    fn is_stale_for_host(&self, previous_session: Option<&str>) -> bool {
        if !self.view.is_host() || self.view.session_id.as_deref() != previous_session {
            return false;
        }
        let incoming = self
            .view
            .now_playing
            .as_ref()
            .and_then(|np| np.queue_id.as_deref());
        match (self.loaded_queue_id.as_deref(), incoming) {
            (Some(loaded), Some(incoming)) => loaded != incoming,
            _ => false,
        }
    }
}

/// Keeps one member's playback in step with its session.
pub struct SyncClient {
    config: SyncClientConfig,
    resolver: Arc<dyn TrackResolver>,
    outgoing: mpsc::Sender<ClientMessage>,
    status: watch::Sender<ClientStatus>,
    engine: Mutex<Engine>,
    poller: parking_lot::Mutex<Poller>,
    epoch: Instant,
}

impl SyncClient {
    /// Creates a client with `provider` as the active adapter.
    ///
    /// Requests go out on `outgoing`; feed server messages to
    /// [`run`](Self::run) or [`handle_message`](Self::handle_message).
    pub fn new(
        config: SyncClientConfig,
        provider: Arc<dyn ProviderAdapter>,
        resolver: Arc<dyn TrackResolver>,
        outgoing: mpsc::Sender<ClientMessage>,
    ) -> Arc<Self> {
        let engine = Engine {
            view: SessionView::default(),
            providers: vec![provider],
            active: 0,
            reconciler: Reconciler::new(config.drift_tolerance_ms, config.seek_cooldown_ms),
            loaded_queue_id: None,
            end_detector: EndDetector::new(config.end_buffer_ms, config.snap_to_zero_ms),
            advance_lock: AdvanceLock::new(config.advance_lock_timeout_ms),
            publish_hold_until: 0,
            last_published: None,
        };
        let (status, _) = watch::channel(ClientStatus::Idle);

        Arc::new(Self {
            config,
            resolver,
            outgoing,
            status,
            engine: Mutex::new(engine),
            poller: parking_lot::Mutex::new(Poller::new()),
            epoch: Instant::now(),
        })
    }

    /// Registers another adapter. The active adapter is unchanged.
    pub async fn add_provider(&self, provider: Arc<dyn ProviderAdapter>) {
        self.engine.lock().await.providers.push(provider);
    }

    pub fn status(&self) -> watch::Receiver<ClientStatus> {
        self.status.subscribe()
    }

    pub async fn view(&self) -> SessionView {
        self.engine.lock().await.view.clone()
    }

    pub async fn active_provider(&self) -> String {
        self.engine.lock().await.active_provider().name().to_string()
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn set_status(&self, status: ClientStatus) {
        self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }

    fn report(&self, err: &ClientError) {
        log::warn!("[Client] {}", err);
        self.set_status(ClientStatus::ProviderError(err.to_string()));
    }

    /// Queues a request without waiting. Callers may hold the engine lock,
    /// so a full channel drops the request instead of blocking.
    fn send(&self, message: ClientMessage) -> Result<(), ClientError> {
        let kind = message.kind();
        match self.outgoing.try_send(message) {
            Ok(()) => {
                log::debug!("[Client] -> {}", kind);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                log::warn!("[Client] Outgoing queue full, dropped {}", kind);
                Err(ClientError::OutboxFull)
            }
            Err(TrySendError::Closed(_)) => Err(ClientError::Disconnected),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inbound
    // ─────────────────────────────────────────────────────────────────────────

    /// Applies server messages until the connection closes.
    pub async fn run(self: Arc<Self>, mut incoming: mpsc::Receiver<ServerMessage>) {
        while let Some(message) = incoming.recv().await {
            self.handle_message(message).await;
        }
        log::info!("[Client] Server connection closed");
        self.poller.lock().stop();
        self.set_status(ClientStatus::Disconnected);
    }

    /// Applies one server message.
    pub async fn handle_message(self: &Arc<Self>, message: ServerMessage) {
        let mut engine = self.engine.lock().await;
        let previous_session = engine.view.session_id.clone();
        let previous = engine.view.now_playing.clone();

        match engine.view.apply(&message) {
            ViewChange::Nothing | ViewChange::Queue => {}
            ViewChange::Session | ViewChange::NowPlaying => {
                if engine.is_stale_for_host(previous_session.as_deref()) {
                    log::debug!(
                        "[Client] Ignoring now-playing for another entry, host is on {:?}",
                        engine.loaded_queue_id
                    );
                    engine.view.now_playing = previous;
                } else {
                    self.reconcile(&mut engine).await;
                }
                self.sync_polling(&engine);
            }
            ViewChange::Ended(reason) => {
                log::info!("[Client] Session ended: {}", reason);
                self.poller.lock().stop();
                self.stop_playback(&mut engine).await;
                self.set_status(ClientStatus::SessionEnded(reason));
            }
            ViewChange::Rejected { code, message } => {
                log::warn!("[Client] Request rejected ({}): {}", code, message);
                self.set_status(ClientStatus::Rejected(message));
            }
            ViewChange::Control(kind, from) => {
                if !engine.view.is_host() {
                    log::debug!("[Client] Ignoring {} addressed to a non-host", kind.as_str());
                    return;
                }
                log::info!(
                    "[Client] Executing {} from {} ({})",
                    kind.as_str(),
                    from.from_name,
                    from.from_user_id
                );
                if let Err(err) = self.execute_control(&mut engine, kind, from.secs).await {
                    self.report(&err);
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Session and queue requests
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn create_session(&self, display_name: Option<&str>) -> Result<(), ClientError> {
        self.send(ClientMessage::SessionCreate {
            payload: CreateSessionRequest {
                display_name: display_name.map(str::to_string),
            },
        })
    }

    pub async fn join_session(
        &self,
        session_id: &str,
        display_name: Option<&str>,
    ) -> Result<(), ClientError> {
        self.send(ClientMessage::SessionJoin {
            payload: JoinSessionRequest {
                session_id: session_id.to_string(),
                display_name: display_name.map(str::to_string),
            },
        })
    }

    /// Leaves the session and stops local playback.
    pub async fn leave_session(&self) -> Result<(), ClientError> {
        let mut engine = self.engine.lock().await;
        if !engine.view.in_session() {
            return Err(ClientError::NotInSession);
        }
        self.poller.lock().stop();
        engine.view.clear_session();
        self.stop_playback(&mut engine).await;
        self.set_status(ClientStatus::Idle);
        self.send(ClientMessage::SessionLeave {
            payload: EmptyPayload {},
        })
    }

    pub async fn add_track(&self, track: &Track) -> Result<(), ClientError> {
        self.send(ClientMessage::QueueAdd {
            payload: AddTrackRequest {
                track: IncomingTrack::from(track),
            },
        })
    }

    pub async fn remove_track(&self, queue_id: &str) -> Result<(), ClientError> {
        self.send(ClientMessage::QueueRemove {
            payload: RemoveTrackRequest {
                queue_id: queue_id.to_string(),
            },
        })
    }

    pub async fn reorder(&self, order: Vec<QueueId>) -> Result<(), ClientError> {
        self.send(ClientMessage::QueueReorder {
            payload: ReorderRequest { order },
        })
    }

    pub async fn set_guest_control(&self, allow: bool) -> Result<(), ClientError> {
        self.send(ClientMessage::SetGuestControl {
            payload: GuestControlRequest {
                allow_guest_control: allow,
            },
        })
    }

    pub async fn set_party_mode(&self, party_mode: bool) -> Result<(), ClientError> {
        self.send(ClientMessage::SetPartyMode {
            payload: PartyModeRequest { party_mode },
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Playback controls
    // ─────────────────────────────────────────────────────────────────────────

    /// Starts a queue entry (host only).
    pub async fn play_item(self: &Arc<Self>, queue_id: &str) -> Result<(), ClientError> {
        let mut engine = self.engine.lock().await;
        if !engine.view.is_host() {
            return Err(ClientError::NotHost);
        }
        let item = engine
            .view
            .queue_item(queue_id)
            .cloned()
            .ok_or_else(|| ClientError::UnknownQueueItem(queue_id.to_string()))?;
        self.start_item(&mut engine, NowPlaying::for_item(&item, true))
            .await
    }

    pub async fn next(self: &Arc<Self>) -> Result<(), ClientError> {
        self.control(ControlKind::Next, None).await
    }

    pub async fn previous(self: &Arc<Self>) -> Result<(), ClientError> {
        self.control(ControlKind::Prev, None).await
    }

    pub async fn toggle(self: &Arc<Self>) -> Result<(), ClientError> {
        self.control(ControlKind::Toggle, None).await
    }

    /// Seeks the shared playback. A guest's local view shows the new
    /// position right away; the host's next publish confirms it.
    pub async fn seek(self: &Arc<Self>, secs: f64) -> Result<(), ClientError> {
        if !secs.is_finite() || secs < 0.0 {
            return Err(ClientError::InvalidSeek(secs));
        }
        self.control(ControlKind::Seek, Some(secs)).await
    }

    /// Executes locally when host, otherwise asks the host.
    async fn control(self: &Arc<Self>, kind: ControlKind, secs: Option<f64>) -> Result<(), ClientError> {
        let mut engine = self.engine.lock().await;
        if !engine.view.in_session() {
            return Err(ClientError::NotInSession);
        }
        if engine.view.is_host() {
            return self.execute_control(&mut engine, kind, secs).await;
        }

        if let (ControlKind::Seek, Some(secs), Some(np)) =
            (kind, secs, engine.view.now_playing.as_mut())
        {
            np.playhead_ms = (secs * 1000.0) as u64;
        }
        drop(engine);
        self.send(ClientMessage::control(kind, secs))
    }

    /// Switches the active adapter. Shared playback reloads on the new one.
    pub async fn set_active_provider(self: &Arc<Self>, name: &str) -> Result<(), ClientError> {
        let mut engine = self.engine.lock().await;
        let index = engine
            .providers
            .iter()
            .position(|p| p.name() == name)
            .ok_or_else(|| ClientError::UnknownProvider(name.to_string()))?;
        if index == engine.active {
            return Ok(());
        }

        let previous = engine.active_provider();
        if let Err(err) = previous.pause().await {
            log::debug!("[Client] Pausing {} failed: {}", previous.name(), err);
        }
        engine.active = index;
        log::info!("[Client] Active provider: {} -> {}", previous.name(), name);

        self.reconcile(&mut engine).await;
        self.sync_polling(&engine);
        Ok(())
    }

    pub async fn set_volume(&self, volume: f32) -> Result<(), ClientError> {
        let provider = self.engine.lock().await.active_provider();
        provider.set_volume(volume.clamp(0.0, 1.0)).await?;
        Ok(())
    }

    /// Stops polling. Adapters are left as they are.
    pub fn shutdown(&self) {
        self.poller.lock().stop();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reconciliation
    // ─────────────────────────────────────────────────────────────────────────

    async fn reconcile(&self, engine: &mut Engine) {
        let provider = engine.active_provider();
        let sample = provider.playback_state().await.ok().flatten();
        let follower = !engine.view.is_host();
        let actions = engine.reconciler.plan(
            engine.view.now_playing.as_ref(),
            provider.name(),
            sample.as_ref(),
            follower,
            self.now_ms(),
        );

        for action in actions {
            if let Err(err) = self.apply_action(engine, &provider, action).await {
                self.report(&err.into());
                return;
            }
        }
        if engine.view.in_session() {
            self.set_status(ClientStatus::Synced);
        }
    }

    async fn apply_action(
        &self,
        engine: &mut Engine,
        provider: &Arc<dyn ProviderAdapter>,
        action: ReconcileAction,
    ) -> Result<(), ProviderError> {
        log::debug!("[Client] Reconcile on {}: {:?}", provider.name(), action);
        match action {
            ReconcileAction::Idle => {
                engine.loaded_queue_id = None;
                provider.pause().await
            }
            ReconcileAction::Pause => provider.pause().await,
            ReconcileAction::Resume => provider.play().await,
            ReconcileAction::Seek { position_ms } => provider.seek(position_ms as f64 / 1000.0).await,
            ReconcileAction::Load {
                queue_id, track, ..
            } => {
                if let Err(err) = self.load_track(engine, provider, &track).await {
                    engine.reconciler.forget_load();
                    engine.loaded_queue_id = None;
                    return Err(err);
                }
                engine.end_detector.reset(queue_id.as_deref());
                engine.loaded_queue_id = queue_id;
                engine.publish_hold_until = self.now_ms() + self.config.transition_cooldown_ms;
                Ok(())
            }
        }
    }

    /// Resolves and loads `track`, stopping every other adapter first.
    async fn load_track(
        &self,
        engine: &Engine,
        provider: &Arc<dyn ProviderAdapter>,
        track: &Track,
    ) -> Result<(), ProviderError> {
        let resolved = self
            .resolver
            .resolve(track, provider.name())
            .await?
            .ok_or_else(|| ProviderError::Unresolved {
                provider: provider.name().to_string(),
                title: track.title.clone(),
            })?;

        for other in engine.providers.iter().filter(|p| p.name() != provider.name()) {
            if let Err(err) = other.pause().await {
                log::debug!("[Client] Pausing {} failed: {}", other.name(), err);
            }
        }
        provider.play_track(&resolved).await
    }

    async fn stop_playback(&self, engine: &mut Engine) {
        engine.reconciler.forget_load();
        engine.loaded_queue_id = None;
        engine.end_detector.reset(None);
        engine.advance_lock.release();
        engine.last_published = None;
        let provider = engine.active_provider();
        if let Err(err) = provider.pause().await {
            log::debug!("[Client] Pausing {} failed: {}", provider.name(), err);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Host duties
    // ─────────────────────────────────────────────────────────────────────────

    async fn execute_control(
        self: &Arc<Self>,
        engine: &mut Engine,
        kind: ControlKind,
        secs: Option<f64>,
    ) -> Result<(), ClientError> {
        let loop_queue = self.config.loop_queue;
        match kind {
            ControlKind::Next => {
                match play_next(&engine.view.queue, engine.view.now_playing.as_ref(), loop_queue) {
                    Some(target) => self.start_item(engine, target).await,
                    None => Ok(()),
                }
            }
            ControlKind::Prev => {
                match play_previous(
                    &engine.view.queue,
                    engine.view.now_playing.as_ref(),
                    loop_queue,
                ) {
                    Some(target) => self.start_item(engine, target).await,
                    None => Ok(()),
                }
            }
            ControlKind::Toggle => self.toggle_playback(engine).await,
            ControlKind::Seek => {
                let secs = secs.unwrap_or(f64::NAN);
                if !secs.is_finite() || secs < 0.0 {
                    return Err(ClientError::InvalidSeek(secs));
                }
                let Some(current) = engine.view.now_playing.clone() else {
                    return Ok(());
                };
                let provider = engine.active_provider();
                provider.seek(secs).await?;
                let now = self.now_ms();
                engine.reconciler.note_seek(now);
                engine.publish_hold_until = now + self.config.seek_cooldown_ms;
                let target_ms = (secs * 1000.0).round() as u64;
                self.publish_sampled(engine, current, None, Some(target_ms))
                    .await
            }
        }
    }

    async fn toggle_playback(self: &Arc<Self>, engine: &mut Engine) -> Result<(), ClientError> {
        let Some(current) = engine.view.now_playing.clone().filter(|np| np.track.is_some()) else {
            // Nothing loaded yet: toggling means "start the queue".
            return match play_next(&engine.view.queue, None, self.config.loop_queue) {
                Some(target) => self.start_item(engine, target).await,
                None => Ok(()),
            };
        };

        let provider = engine.active_provider();
        let was_playing = match provider.playback_state().await {
            Ok(Some(sample)) => sample.is_playing,
            _ => current.is_playing,
        };
        if was_playing {
            provider.pause().await?;
        } else {
            provider.play().await?;
        }
        engine.publish_hold_until = self.now_ms() + self.config.seek_cooldown_ms;
        self.publish_sampled(engine, current, Some(!was_playing), None)
            .await
    }

    /// Loads a new entry on the host's adapter and publishes it.
    async fn start_item(
        self: &Arc<Self>,
        engine: &mut Engine,
        target: NowPlaying,
    ) -> Result<(), ClientError> {
        let (Some(queue_id), Some(track)) = (target.queue_id.clone(), target.track.clone()) else {
            return Ok(());
        };
        let provider = engine.active_provider();
        engine.publish_hold_until = self.now_ms() + self.config.transition_cooldown_ms;

        self.load_track(engine, &provider, &track).await?;
        if !target.is_playing {
            provider.pause().await?;
        }
        engine
            .reconciler
            .mark_loaded(load_key(&queue_id, provider.name()));
        engine.loaded_queue_id = Some(queue_id.clone());
        engine.end_detector.reset(Some(&queue_id));
        log::info!("[Client] Now playing {:?} ({})", track.title, queue_id);

        let playhead_ms = match provider.playback_state().await {
            Ok(Some(sample)) => sample.position_ms,
            _ => 0,
        };
        let next = NowPlaying {
            playhead_ms,
            updated_at: 0,
            ..target
        };
        engine.view.now_playing = Some(next.clone());
        self.publish(engine, next).await?;
        self.sync_polling(engine);
        Ok(())
    }

    /// Publishes `current` with the adapter's sampled state. `playhead_ms`
    /// overrides the sampled position when the adapter may not have caught
    /// up with a seek yet.
    async fn publish_sampled(
        &self,
        engine: &mut Engine,
        current: NowPlaying,
        is_playing: Option<bool>,
        playhead_ms: Option<u64>,
    ) -> Result<(), ClientError> {
        let sample = engine
            .active_provider()
            .playback_state()
            .await
            .ok()
            .flatten();
        let next = NowPlaying {
            is_playing: is_playing
                .or(sample.map(|s| s.is_playing))
                .unwrap_or(current.is_playing),
            playhead_ms: playhead_ms
                .or(sample.map(|s| s.position_ms))
                .unwrap_or(current.playhead_ms),
            updated_at: 0,
            ..current
        };
        engine.view.now_playing = Some(next.clone());
        self.publish(engine, next).await
    }

    async fn publish(&self, engine: &mut Engine, now_playing: NowPlaying) -> Result<(), ClientError> {
        self.send(ClientMessage::HostState {
            payload: HostStateRequest {
                now_playing: Some(now_playing.clone()),
            },
        })?;
        engine.last_published = Some(now_playing);
        Ok(())
    }

    /// What the host poll loop should currently be sampling, if anything.
    fn poll_context(&self, engine: &Engine) -> Option<PollContext> {
        if !engine.view.is_host() {
            return None;
        }
        let session_id = engine.view.session_id.clone()?;
        let queue_id = engine.view.now_playing.as_ref()?.queue_id.clone()?;
        Some(PollContext {
            session_id,
            queue_id: Some(queue_id),
            provider: engine.active_provider().name().to_string(),
        })
    }

    /// Runs the poll loop iff this member is host of a session with a
    /// current entry; restarts it when any part of the context changes.
    fn sync_polling(self: &Arc<Self>, engine: &Engine) {
        let mut poller = self.poller.lock();
        let context = match self.poll_context(engine) {
            Some(context) if self.config.poll_interval_ms > 0 => context,
            _ => {
                poller.stop();
                return;
            }
        };

        let weak = Arc::downgrade(self);
        let started = poller.ensure(
            context,
            Duration::from_millis(self.config.poll_interval_ms),
            move |ctx| {
                let weak = weak.clone();
                async move {
                    if let Some(client) = weak.upgrade() {
                        client.poll_tick(ctx).await;
                    }
                }
            },
        );
        if started {
            log::debug!("[Client] Poll loop started for {:?}", poller.context());
        }
    }

    /// Samples the host's adapter once, outside the poll loop.
    pub async fn poll_now(self: &Arc<Self>) {
        let context = {
            let engine = self.engine.lock().await;
            self.poll_context(&engine)
        };
        if let Some(context) = context {
            self.poll_tick(context).await;
        }
    }

    /// One host-side sample: detect the end of the track, otherwise publish
    /// the sampled position.
    async fn poll_tick(self: &Arc<Self>, ctx: PollContext) {
        let mut engine = self.engine.lock().await;

        let current_queue_id = engine
            .view
            .now_playing
            .as_ref()
            .and_then(|np| np.queue_id.clone());
        if !engine.view.is_host()
            || engine.view.session_id.as_deref() != Some(ctx.session_id.as_str())
            || current_queue_id != ctx.queue_id
        {
            return;
        }
        let provider = engine.active_provider();
        if provider.name() != ctx.provider {
            return;
        }

        let sample = match provider.playback_state().await {
            Ok(Some(sample)) => sample,
            Ok(None) => return,
            Err(err) => {
                self.report(&err.into());
                return;
            }
        };
        let now = self.now_ms();

        if let Some(queue_id) = ctx.queue_id.as_deref() {
            let fallback = engine
                .view
                .now_playing
                .as_ref()
                .and_then(NowPlaying::duration_ms);
            if engine.end_detector.observe(queue_id, Some(&sample), fallback) {
                self.auto_advance(&mut engine).await;
                return;
            }
        }

        if now < engine.publish_hold_until || engine.advance_lock.is_engaged(now) {
            return;
        }
        let Some(current) = engine.view.now_playing.clone() else {
            return;
        };
        let next = NowPlaying {
            is_playing: sample.is_playing,
            playhead_ms: sample.position_ms,
            updated_at: 0,
            ..current
        };
        let unchanged = engine.last_published.as_ref().is_some_and(|last| {
            last.queue_id == next.queue_id
                && last.is_playing == next.is_playing
                && last.playhead_ms == next.playhead_ms
        });
        if unchanged {
            return;
        }
        if let Err(err) = self.publish(&mut engine, next).await {
            log::debug!("[Client] Publish failed: {}", err);
        }
    }

    async fn auto_advance(self: &Arc<Self>, engine: &mut Engine) {
        if !engine.advance_lock.try_engage(self.now_ms()) {
            return;
        }
        let Some(mut target) = play_next(
            &engine.view.queue,
            engine.view.now_playing.as_ref(),
            self.config.loop_queue,
        ) else {
            log::info!("[Client] End of queue");
            engine.advance_lock.release();
            return;
        };
        target.is_playing = true;

        match self.start_item(engine, target).await {
            Ok(()) => engine.advance_lock.release(),
            // Stays engaged until the timeout.
            Err(err) => self.report(&err),
        }
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        self.poller.lock().stop();
    }
}

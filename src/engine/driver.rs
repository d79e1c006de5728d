// Timer-driven breathing driver: schedules countdown ticks and fans out session events.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::session::{BreathingEvent, BreathingPhase, BreathingSession, BreathingSettings};
use crate::config::PHASE_TICK_MILLIS;
use crate::error::SettingsError;

/// Side effects attached to phase changes (media prefetch, sounds).
///
/// Called after the driver's state lock is released, so a cue may call back
/// into the driver. Implementations must not block.
pub trait PhaseCues: Send + Sync {
    fn phase_started(&self, cycle: u32, phase: BreathingPhase);

    fn session_completed(&self, _settings: &BreathingSettings) {}
}

struct DriverState {
    session: Option<BreathingSession>,
    /// Bumped on every cancellation; a timer task only mutates state while
    /// its generation is current.
    generation: u64,
    timer: Option<CancellationToken>,
}

/// Drives a [`BreathingSession`] in real time.
///
/// Must be used from within a tokio runtime.
pub struct BreathingDriver {
    state: Arc<Mutex<DriverState>>,
    events: mpsc::UnboundedSender<BreathingEvent>,
    cues: Option<Arc<dyn PhaseCues>>,
    tick: Duration,
}

impl BreathingDriver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BreathingEvent>) {
        Self::with_tick(Duration::from_millis(PHASE_TICK_MILLIS))
    }

    /// Driver whose countdown step is `tick` instead of one second.
    pub fn with_tick(tick: Duration) -> (Self, mpsc::UnboundedReceiver<BreathingEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let driver = Self {
            state: Arc::new(Mutex::new(DriverState {
                session: None,
                generation: 0,
                timer: None,
            })),
            events: tx,
            cues: None,
            tick,
        };
        (driver, rx)
    }

    pub fn with_cues(mut self, cues: Arc<dyn PhaseCues>) -> Self {
        self.cues = Some(cues);
        self
    }

    /// Start a new session, discarding any current one.
    pub fn start(&self, settings: BreathingSettings) -> Result<(), SettingsError> {
        let session = BreathingSession::new(settings)?;

        let first = session.current_event();
        {
            let mut st = self.state.lock();
            Self::cancel_timer(&mut st);
            info!(
                "breathing session start inhale={} hold={} exhale={} cycles={}",
                settings.inhale_seconds, settings.hold_seconds, settings.exhale_seconds, settings.cycles
            );

            if let Some(event) = &first {
                publish(&self.events, event);
            }
            st.session = Some(session);
            self.schedule(&mut st);
        }

        notify_cues(self.cues.as_deref(), &settings, first.as_slice());
        Ok(())
    }

    /// Hard reset with new settings. Partial progress is discarded even when paused.
    pub fn restart(&self, settings: BreathingSettings) -> Result<(), SettingsError> {
        debug!("breathing session restart");
        self.start(settings)
    }

    /// Freeze the countdown at the current remaining value. Idempotent.
    pub fn pause(&self) {
        let mut st = self.state.lock();
        Self::cancel_timer(&mut st);
        if let Some(session) = st.session.as_mut() {
            if !session.is_paused() && !session.is_complete() {
                session.set_paused(true);
                debug!(
                    "breathing paused cycle={} remaining={}",
                    session.current_cycle(),
                    session.remaining_seconds()
                );
            }
        }
    }

    /// Continue the current phase for its frozen remaining seconds.
    pub fn resume(&self) {
        let mut st = self.state.lock();
        if st.timer.is_some() {
            return;
        }
        let resumable = match st.session.as_mut() {
            Some(session) if !session.is_complete() => {
                session.set_paused(false);
                debug!(
                    "breathing resumed cycle={} remaining={}",
                    session.current_cycle(),
                    session.remaining_seconds()
                );
                true
            }
            _ => false,
        };
        if resumable {
            self.schedule(&mut st);
        }
    }

    /// Cancel every pending timer. The session is kept but stops advancing.
    pub fn cancel_all(&self) {
        let mut st = self.state.lock();
        Self::cancel_timer(&mut st);
    }

    /// Tear down the session (user exit).
    pub fn abort(&self) {
        let mut st = self.state.lock();
        Self::cancel_timer(&mut st);
        if st.session.take().is_some() {
            info!("breathing session aborted");
        }
    }

    /// Copy of the current session state.
    pub fn session(&self) -> Option<BreathingSession> {
        self.state.lock().session.clone()
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().timer.is_some()
    }

    fn cancel_timer(st: &mut DriverState) {
        st.generation += 1;
        if let Some(token) = st.timer.take() {
            token.cancel();
        }
    }

    fn schedule(&self, st: &mut DriverState) {
        let token = CancellationToken::new();
        let generation = st.generation;
        st.timer = Some(token.clone());

        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        let cues = self.cues.clone();
        let tick = self.tick;
        let mut next = Instant::now() + tick;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep_until(next) => {}
                }
                next += tick;

                let (settings, fired, complete) = {
                    let mut st = state.lock();
                    if st.generation != generation {
                        return;
                    }
                    let Some(session) = st.session.as_mut() else {
                        return;
                    };

                    let settings = *session.settings();
                    let fired = session.tick();
                    let complete = session.is_complete();
                    for event in &fired {
                        publish(&events, event);
                    }
                    if complete {
                        st.timer = None;
                    }
                    (settings, fired, complete)
                };

                notify_cues(cues.as_deref(), &settings, &fired);
                if complete {
                    return;
                }
            }
        });
    }
}

impl Drop for BreathingDriver {
    fn drop(&mut self) {
        let mut st = self.state.lock();
        Self::cancel_timer(&mut st);
    }
}

/// Send `event` to the listener. Runs under the state lock, so nothing is
/// delivered once a cancellation has returned.
fn publish(events: &mpsc::UnboundedSender<BreathingEvent>, event: &BreathingEvent) {
    match event {
        BreathingEvent::PhaseStarted { cycle, phase, seconds } => {
            debug!("cycle {} {} ({}s)", cycle, phase.label(), seconds);
        }
        BreathingEvent::Completed { cycles } => {
            info!("breathing session complete after {} cycles", cycles);
        }
        BreathingEvent::Tick { .. } => {}
    }
    // Receiver dropped means nobody is listening; the session still runs to completion.
    let _ = events.send(event.clone());
}

fn notify_cues(
    cues: Option<&dyn PhaseCues>,
    settings: &BreathingSettings,
    fired: &[BreathingEvent],
) {
    let Some(cues) = cues else {
        return;
    };
    for event in fired {
        match event {
            BreathingEvent::PhaseStarted { cycle, phase, .. } => cues.phase_started(*cycle, *phase),
            BreathingEvent::Completed { .. } => cues.session_completed(settings),
            BreathingEvent::Tick { .. } => {}
        }
    }
}

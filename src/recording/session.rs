//! Countdown-bounded capture session
//!
//! Owns at most one open microphone stream. The countdown runs on its own
//! task and reports through an unbounded channel; ticks and the terminal
//! event are emitted under the same lock that `complete` and `stop` take,
//! so a session can only ever finish once. Streams are released after that
//! lock is dropped, since closing a device may block.

use super::{CaptureDevice, PermissionState, RecordingError, RecordingEvent, RecordingOutcome};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Shared between the session handle and its countdown task
struct Slot<S> {
    stream: Option<S>,
    terminated: bool,
}

impl<S> Slot<S> {
    /// Mark the session finished and hand back its stream
    ///
    /// Returns None if it had already finished. Dropping the returned
    /// value releases the microphone; do that outside the lock.
    #[must_use]
    fn terminate(&mut self) -> Option<Released<S>> {
        if self.terminated {
            return None;
        }
        self.terminated = true;
        Some(Released(self.stream.take()))
    }
}

/// A stream taken out of a finished session, closed on drop
struct Released<S>(#[allow(dead_code)] Option<S>);

struct Active<S> {
    id: u64,
    slot: Arc<Mutex<Slot<S>>>,
    events: mpsc::UnboundedSender<RecordingEvent>,
    countdown: JoinHandle<()>,
}

/// Microphone session manager
pub struct RecordingSession<D: CaptureDevice> {
    device: Arc<D>,
    permission: PermissionState,
    countdown_seconds: u32,
    next_id: u64,
    active: Option<Active<D::Stream>>,
}

impl<D: CaptureDevice> RecordingSession<D> {
    /// Request microphone permission once and build a session around the result
    pub async fn initialize(device: Arc<D>, countdown_seconds: u32) -> Self {
        let permission = PermissionState::from(device.request_permission().await);
        match permission {
            PermissionState::Granted => tracing::info!("Microphone permission granted"),
            PermissionState::Denied => tracing::warn!("Microphone permission denied"),
        }
        Self::with_permission(device, permission, countdown_seconds)
    }

    pub fn with_permission(
        device: Arc<D>,
        permission: PermissionState,
        countdown_seconds: u32,
    ) -> Self {
        Self {
            device,
            permission,
            countdown_seconds: countdown_seconds.max(1),
            next_id: 0,
            active: None,
        }
    }

    pub fn permission(&self) -> PermissionState {
        self.permission
    }

    pub fn countdown_seconds(&self) -> u32 {
        self.countdown_seconds
    }

    /// Whether `id` names the session currently running
    pub fn is_current(&self, id: u64) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.id == id && !active.slot.lock().terminated)
    }

    pub fn is_active(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.slot.lock().terminated)
    }

    /// Open the microphone and start the countdown
    ///
    /// Any previous session is stopped first. Returns the new session id,
    /// which tags every event it emits.
    pub async fn start(
        &mut self,
        events: mpsc::UnboundedSender<RecordingEvent>,
    ) -> Result<u64, RecordingError> {
        if !self.permission.is_granted() {
            return Err(RecordingError::PermissionDenied);
        }
        self.stop();

        let stream = self.device.open().await?;
        self.next_id += 1;
        let id = self.next_id;

        let slot = Arc::new(Mutex::new(Slot {
            stream: Some(stream),
            terminated: false,
        }));
        let countdown = tokio::spawn(run_countdown(
            id,
            self.countdown_seconds,
            slot.clone(),
            events.clone(),
        ));

        tracing::info!(
            "Recording session {} started ({}s countdown)",
            id,
            self.countdown_seconds
        );
        self.active = Some(Active {
            id,
            slot,
            events,
            countdown,
        });
        Ok(id)
    }

    /// Finish the running session early with a captured outcome
    pub fn complete(&mut self) -> Result<(), RecordingError> {
        let active = self.active.take().ok_or(RecordingError::NotActive)?;
        active.countdown.abort();

        let released = {
            let mut slot = active.slot.lock();
            let released = slot.terminate().ok_or(RecordingError::NotActive)?;
            tracing::info!("Recording session {} captured", active.id);
            let _ = active.events.send(RecordingEvent::Finished {
                session: active.id,
                outcome: RecordingOutcome::Captured,
            });
            released
        };
        drop(released);
        Ok(())
    }

    /// Cancel the countdown and release the microphone without emitting
    ///
    /// Idempotent.
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.countdown.abort();
            let released = active.slot.lock().terminate();
            if released.is_some() {
                tracing::debug!("Recording session {} stopped", active.id);
            }
            drop(released);
        }
    }
}

impl<D: CaptureDevice> Drop for RecordingSession<D> {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_countdown<S>(
    id: u64,
    seconds: u32,
    slot: Arc<Mutex<Slot<S>>>,
    events: mpsc::UnboundedSender<RecordingEvent>,
) {
    let mut ticker = interval_at(Instant::now() + TICK_INTERVAL, TICK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    for seconds_remaining in (0..seconds).rev() {
        ticker.tick().await;

        let released = {
            let mut slot = slot.lock();
            if slot.terminated {
                return;
            }
            let _ = events.send(RecordingEvent::Tick {
                session: id,
                seconds_remaining,
            });
            if seconds_remaining > 0 {
                continue;
            }

            let released = slot.terminate();
            if released.is_some() {
                tracing::info!("Recording session {} timed out", id);
                let _ = events.send(RecordingEvent::Finished {
                    session: id,
                    outcome: RecordingOutcome::TimedOut,
                });
            }
            released
        };
        drop(released);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counters {
        opened: AtomicUsize,
        released: AtomicUsize,
    }

    struct MockStream(Arc<Counters>);

    impl Drop for MockStream {
        fn drop(&mut self) {
            self.0.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct MockMic {
        granted: bool,
        counters: Arc<Counters>,
    }

    impl MockMic {
        fn new(granted: bool) -> Arc<Self> {
            Arc::new(Self {
                granted,
                counters: Arc::default(),
            })
        }

        fn opened(&self) -> usize {
            self.counters.opened.load(Ordering::SeqCst)
        }

        fn released(&self) -> usize {
            self.counters.released.load(Ordering::SeqCst)
        }
    }

    impl CaptureDevice for MockMic {
        type Stream = MockStream;

        async fn request_permission(&self) -> bool {
            self.granted
        }

        async fn open(&self) -> Result<MockStream, RecordingError> {
            self.counters.opened.fetch_add(1, Ordering::SeqCst);
            Ok(MockStream(self.counters.clone()))
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<RecordingEvent>) -> Vec<RecordingEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn terminal_count(events: &[RecordingEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, RecordingEvent::Finished { .. }))
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_times_out() {
        let mic = MockMic::new(true);
        let mut session = RecordingSession::initialize(mic.clone(), 5).await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        let id = session.start(tx).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5500)).await;

        let events = drain(&mut rx);
        let ticks: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                RecordingEvent::Tick {
                    seconds_remaining, ..
                } => Some(*seconds_remaining),
                _ => None,
            })
            .collect();
        assert_eq!(ticks, vec![4, 3, 2, 1, 0]);
        assert_eq!(
            events.last(),
            Some(&RecordingEvent::Finished {
                session: id,
                outcome: RecordingOutcome::TimedOut
            })
        );
        assert_eq!(terminal_count(&events), 1);
        assert_eq!(mic.released(), 1);
        assert!(!session.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_emits_captured_once() {
        let mic = MockMic::new(true);
        let mut session = RecordingSession::initialize(mic.clone(), 5).await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        session.start(tx).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        session.complete().unwrap();
        assert_eq!(session.complete(), Err(RecordingError::NotActive));

        // The countdown must not fire a second terminal event later
        tokio::time::sleep(Duration::from_secs(10)).await;

        let events = drain(&mut rx);
        assert_eq!(terminal_count(&events), 1);
        assert!(matches!(
            events.last(),
            Some(RecordingEvent::Finished {
                outcome: RecordingOutcome::Captured,
                ..
            })
        ));
        assert_eq!(mic.released(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_silent_and_idempotent() {
        let mic = MockMic::new(true);
        let mut session = RecordingSession::initialize(mic.clone(), 5).await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        session.start(tx).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        session.stop();
        session.stop();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1, "only the first tick should be seen");
        assert_eq!(terminal_count(&events), 0);
        assert_eq!(mic.released(), 1);
    }

    #[test]
    fn test_terminate_hands_stream_back_once() {
        let counters = Arc::new(Counters::default());
        let mut slot = Slot {
            stream: Some(MockStream(counters.clone())),
            terminated: false,
        };

        let released = slot.terminate();
        assert!(released.is_some());
        assert!(slot.stream.is_none());
        // Still open until the caller lets go of it
        assert_eq!(counters.released.load(Ordering::SeqCst), 0);
        assert!(slot.terminate().is_none());

        drop(released);
        assert_eq!(counters.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_denied() {
        let mic = MockMic::new(false);
        let mut session = RecordingSession::initialize(mic.clone(), 5).await;
        let (tx, _rx) = mpsc::unbounded_channel();

        assert_eq!(session.start(tx).await, Err(RecordingError::PermissionDenied));
        assert_eq!(mic.opened(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_releases_previous_stream() {
        let mic = MockMic::new(true);
        let mut session = RecordingSession::initialize(mic.clone(), 5).await;
        let (tx, _rx) = mpsc::unbounded_channel();

        let first = session.start(tx.clone()).await.unwrap();
        let second = session.start(tx).await.unwrap();

        assert_ne!(first, second);
        assert!(!session.is_current(first));
        assert!(session.is_current(second));
        assert_eq!(mic.opened(), 2);
        assert_eq!(mic.released(), 1);

        drop(session);
        assert_eq!(mic.released(), 2);
    }
}

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{channel, Receiver, RecvTimeoutError, SyncSender},
        Arc,
    },
    thread::JoinHandle,
    time::Duration,
};

use crate::{
    config::SessionConfig,
    error::SessionError,
    log_error, log_info, log_warn,
    service::{
        interaction::{enigo_backend_factory, release_keys, BackendFactory, InputDriver, KeyLedger},
        mapper::ChannelFrame,
        serial::{AcquisitionLoop, Connector, SerialConnector, SessionState, StateCell},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// Reads the glove and drives mouse and keyboard
    Acquisition,
    /// Reads the glove only, for setting thresholds
    Calibration,
}

impl SessionKind {
    fn thread_name(&self) -> &'static str {
        match self {
            SessionKind::Acquisition => "acquisition",
            SessionKind::Calibration => "calibration",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.thread_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The loop stopped on its own within the grace period
    Stopped,
    /// There was no session of that kind
    NotRunning,
    /// The loop missed the grace period: its keys were released from here and
    /// the thread was left to finish on its own
    TerminationTimeout,
}

struct ActiveSession {
    kind: SessionKind,
    stop: Arc<AtomicBool>,
    state: Arc<StateCell>,
    ledger: Arc<KeyLedger>,
    done: Receiver<()>, // Disconnects when the worker thread ends
    handle: JoinHandle<()>,
    grace: Duration,
}

impl ActiveSession {
    fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Owns the one session that may run at a time, acquisition or calibration.
pub struct SessionController {
    connector: Arc<dyn Connector>,
    backends: BackendFactory,
    active: Option<ActiveSession>,
    abandoned: Option<(SessionKind, JoinHandle<()>)>, // Missed its grace period, may still be reading
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new(Arc::new(SerialConnector), enigo_backend_factory())
    }
}

impl SessionController {
    pub fn new(connector: Arc<dyn Connector>, backends: BackendFactory) -> Self {
        Self {
            connector,
            backends,
            active: None,
            abandoned: None,
        }
    }

    /// Kind of the running session, if any. Sessions that ended on their own
    /// (e.g. the device was unplugged) are cleaned up here.
    pub fn active_kind(&mut self) -> Option<SessionKind> {
        self.reap_finished();

        self.active.as_ref().map(|session| session.kind)
    }

    pub fn state(&self) -> SessionState {
        self.active
            .as_ref()
            .map(|session| session.state.get())
            .unwrap_or_default()
    }

    pub fn start(
        &mut self,
        config: &SessionConfig,
        frames: SyncSender<ChannelFrame>,
    ) -> Result<(), SessionError> {
        self.launch(SessionKind::Acquisition, config, frames)
    }

    pub fn start_calibration(
        &mut self,
        config: &SessionConfig,
        frames: SyncSender<ChannelFrame>,
    ) -> Result<(), SessionError> {
        self.launch(SessionKind::Calibration, config, frames)
    }

    pub fn stop(&mut self) -> StopOutcome {
        self.stop_kind(Some(SessionKind::Acquisition))
    }

    pub fn stop_calibration(&mut self) -> StopOutcome {
        self.stop_kind(Some(SessionKind::Calibration))
    }

    /// Stops whatever is running.
    pub fn shutdown(&mut self) -> StopOutcome {
        self.stop_kind(None)
    }

    fn launch(
        &mut self,
        kind: SessionKind,
        config: &SessionConfig,
        frames: SyncSender<ChannelFrame>,
    ) -> Result<(), SessionError> {
        if let Some(running) = self.active_kind() {
            log_warn!("Can't start a {} session, {} is running", kind, running);

            return Err(SessionError::AlreadyRunning(running));
        }

        // Two loops must never read the glove or send input at the same time
        if let Some((abandoned, _)) = &self.abandoned {
            log_warn!(
                "Can't start a {} session, the abandoned {} session is still winding down",
                kind,
                abandoned
            );

            return Err(SessionError::StillStopping(*abandoned));
        }

        let state = Arc::new(StateCell::default());

        state.set(SessionState::Connecting);

        log_info!("Starting a {} session on `{}`...", kind, config.port);

        let reader = match self.connector.open(&config.port, config.baud_rate) {
            Ok(reader) => reader,
            Err(e) => {
                state.set(SessionState::Idle);

                log_error!("{}", e);

                return Err(e.into());
            }
        };

        let stop = Arc::new(AtomicBool::new(false));
        let ledger = Arc::new(KeyLedger::new());
        let (done_tx, done) = channel::<()>();

        let handle = {
            let config = config.clone();
            let stop = stop.clone();
            let loop_state = state.clone();
            let ledger = ledger.clone();
            let backends = self.backends.clone();

            std::thread::Builder::new()
                .name(kind.thread_name().to_string())
                .spawn(move || {
                    let _done = done_tx;

                    // The backend is built here, input backends don't have to be `Send`
                    let driver = match kind {
                        SessionKind::Acquisition => {
                            let backend = match backends() {
                                Ok(backend) => Some(backend),
                                Err(e) => {
                                    log_error!("{}, no input will be sent this session", e);

                                    None
                                }
                            };

                            Some(InputDriver::new(backend, ledger, config.repeat_period_ticks))
                        }
                        SessionKind::Calibration => None,
                    };

                    let exit =
                        AcquisitionLoop::new(&config, reader, driver, frames, stop, loop_state)
                            .run();

                    log_info!("{} session ended ({:?})", kind, exit);
                })
                .map_err(|e| {
                    state.set(SessionState::Idle);

                    SessionError::Spawn(e)
                })?
        };

        self.active = Some(ActiveSession {
            kind,
            stop,
            state,
            ledger,
            done,
            handle,
            grace: config.stop_grace,
        });

        Ok(())
    }

    fn stop_kind(&mut self, kind: Option<SessionKind>) -> StopOutcome {
        let matches = match (&self.active, kind) {
            (Some(session), Some(kind)) => session.kind == kind,
            (Some(_), None) => true,
            (None, _) => false,
        };

        if !matches {
            return StopOutcome::NotRunning;
        }

        let Some(session) = self.active.take() else {
            return StopOutcome::NotRunning;
        };

        log_info!("Stopping the {} session...", session.kind);

        session.stop.store(true, Ordering::Release);

        match session.done.recv_timeout(session.grace) {
            Ok(_) | Err(RecvTimeoutError::Disconnected) => {
                if session.handle.join().is_err() {
                    // The loop panicked, its driver still released keys while unwinding
                    log_error!("The {} session ended with a panic", session.kind);
                }

                StopOutcome::Stopped
            }
            Err(RecvTimeoutError::Timeout) => {
                log_warn!(
                    "The {} session did not stop within {:?}, releasing its keys and leaving it behind",
                    session.kind,
                    session.grace
                );

                self.release_abandoned(&session.ledger);

                // Kept until the thread exits on its own, no new session starts before that
                self.abandoned = Some((session.kind, session.handle));

                StopOutcome::TerminationTimeout
            }
        }
    }

    fn release_abandoned(&self, ledger: &KeyLedger) {
        let Some(keys) = ledger.take_all() else {
            return;
        };

        if keys.is_empty() {
            return;
        }

        match (self.backends)() {
            Ok(mut backend) => release_keys(backend.as_mut(), &keys),
            Err(e) => log_error!(
                "{} keys may be stuck, no input backend to release them: {}",
                keys.len(),
                e
            ),
        }
    }

    /// `true` while a session that missed its grace period is still alive.
    pub fn is_winding_down(&mut self) -> bool {
        self.reap_finished();

        self.abandoned.is_some()
    }

    fn reap_finished(&mut self) {
        if self
            .abandoned
            .as_ref()
            .is_some_and(|(_, handle)| handle.is_finished())
        {
            if let Some((kind, handle)) = self.abandoned.take() {
                log_info!("The abandoned {} session has finally ended", kind);

                handle.join().ok();
            }
        }

        let finished = self
            .active
            .as_ref()
            .is_some_and(|session| session.is_finished());

        if !finished {
            return;
        }

        if let Some(session) = self.active.take() {
            log_info!("The {} session is no longer running", session.kind);

            session.handle.join().ok();
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

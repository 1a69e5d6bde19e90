use enigo::{
    Coordinate,
    Direction::{self, Click, Press, Release},
    Enigo, Key, Keyboard, Mouse, Settings,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crate::{
    constants::CHANNEL_COUNT, error::DriverError, log_error, log_print,
    service::decoder::MotionSample, utility::describe_key,
};

/// Where synthetic input ends up. The loop only talks to this trait so the
/// OS side can be swapped out.
pub trait InputBackend {
    fn move_relative(&mut self, dx: f64, dy: f64) -> Result<(), DriverError>;
    fn key(&mut self, key: Key, direction: Direction) -> Result<(), DriverError>;
}

/// Creates a backend on whichever thread is going to use it.
pub type BackendFactory =
    Arc<dyn Fn() -> Result<Box<dyn InputBackend>, DriverError> + Send + Sync>;

pub fn enigo_backend_factory() -> BackendFactory {
    Arc::new(|| Ok::<_, DriverError>(Box::new(EnigoBackend::new()?) as Box<dyn InputBackend>))
}

/// Keeps the fractional part of relative moves so slow, steady motion still
/// adds up to whole pixels instead of being truncated away every tick.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct SubpixelAccumulator {
    remainder: (f64, f64),
}

impl SubpixelAccumulator {
    pub fn take(&mut self, dx: f64, dy: f64) -> (i32, i32) {
        let x = self.remainder.0 + dx;
        let y = self.remainder.1 + dy;

        let whole = (x.trunc(), y.trunc());

        self.remainder = (x - whole.0, y - whole.1);

        (whole.0 as i32, whole.1 as i32)
    }
}

pub struct EnigoBackend {
    enigo: Enigo,
    subpixel: SubpixelAccumulator,
}

impl EnigoBackend {
    pub fn new() -> Result<Self, DriverError> {
        Ok(Self {
            enigo: Enigo::new(&Settings::default())?,
            subpixel: SubpixelAccumulator::default(),
        })
    }
}

impl InputBackend for EnigoBackend {
    fn move_relative(&mut self, dx: f64, dy: f64) -> Result<(), DriverError> {
        let (x, y) = self.subpixel.take(dx, dy);

        if x == 0 && y == 0 {
            return Ok(());
        }

        Ok(self.enigo.move_mouse(x, y, Coordinate::Rel)?)
    }

    fn key(&mut self, key: Key, direction: Direction) -> Result<(), DriverError> {
        Ok(self.enigo.key(key, direction)?)
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    held: Vec<Key>,
    released: bool,
}

/// Mirror of the keys a session holds down, shared with the session controller.
///
/// The release of held keys happens exactly once: either the loop releases
/// them while shutting down, or the controller claims them when the loop
/// doesn't stop in time. After the claim no new key goes down.
#[derive(Debug, Default)]
pub struct KeyLedger {
    state: Mutex<LedgerState>,
}

impl KeyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn held(&self) -> Vec<Key> {
        self.state().held.clone()
    }

    pub fn is_released(&self) -> bool {
        self.state().released
    }

    /// Records a key that just went down. `false` when the keys were already
    /// claimed, the caller then has to undo the press itself.
    fn confirm_press(&self, key: Key) -> bool {
        let mut state = self.state();

        if state.released {
            return false;
        }

        if !state.held.contains(&key) {
            state.held.push(key);
        }

        true
    }

    /// `false` when somebody else already took care of releasing this key.
    fn begin_release(&self, key: Key) -> bool {
        let mut state = self.state();

        if state.released {
            return false;
        }

        state.held.retain(|held| *held != key);

        true
    }

    /// Claims every held key for release. Only the first caller gets them.
    pub fn take_all(&self) -> Option<Vec<Key>> {
        let mut state = self.state();

        if state.released {
            return None;
        }

        state.released = true;

        Some(std::mem::take(&mut state.held))
    }
}

/// Issues a key-up for every key, logging (not propagating) failures.
pub fn release_keys(backend: &mut dyn InputBackend, keys: &[Key]) {
    for key in keys {
        match backend.key(*key, Release) {
            Ok(_) => log_print!("[KEY] {} released", describe_key(key)),
            Err(e) => log_error!("Could not release {}: {}", describe_key(key), e),
        }
    }
}

/// Turns finger states into key and mouse events.
///
/// The live-key map belongs to the loop that owns this driver, the only thing
/// shared with other threads is the [`KeyLedger`] mirror.
pub struct InputDriver {
    backend: Option<Box<dyn InputBackend>>,
    ledger: Arc<KeyLedger>,
    repeat_period: u32,
    live: HashMap<Key, u32>, // key => ticks since the last press
    owners: [Option<Key>; CHANNEL_COUNT],
}

impl InputDriver {
    /// `backend` is `None` when no input backend could be created, every event is
    /// then dropped.
    pub fn new(
        backend: Option<Box<dyn InputBackend>>,
        ledger: Arc<KeyLedger>,
        repeat_period: u32,
    ) -> Self {
        Self {
            backend,
            ledger,
            repeat_period: repeat_period.max(1),
            live: HashMap::new(),
            owners: [None; CHANNEL_COUNT],
        }
    }

    pub fn is_held(&self, key: &Key) -> bool {
        self.live.contains_key(key)
    }

    pub fn held_count(&self) -> usize {
        self.live.len()
    }

    pub fn apply_motion(&mut self, sample: MotionSample, sensitivity: f64) {
        // Zero-length moves would only spam the OS input queue
        if sample.is_still() {
            return;
        }

        // The controller already let go on our behalf, this driver is mute now
        if self.ledger.is_released() {
            return;
        }

        let Some(backend) = self.backend.as_mut() else {
            return;
        };

        let (dx, dy) = sample.cursor_delta(sensitivity);

        if let Err(e) = backend.move_relative(dx, dy) {
            log_error!("Mouse move ({:.1}, {:.1}) was dropped: {}", dx, dy, e);
        }
    }

    /// Drives one channel for one tick.
    ///
    /// The first pressed tick sends a key-down and counts as tick one of the
    /// repeat period; every `repeat_period` ticks after that one extra press
    /// is sent while the finger stays down.
    pub fn update_key(&mut self, channel: usize, binding: Option<Key>, pressed: bool) {
        if channel >= CHANNEL_COUNT {
            return;
        }

        // Binding changed under a held key, let go of the old one first
        if let Some(held) = self.owners[channel] {
            if Some(held) != binding {
                self.release(held);
            }
        }

        let Some(key) = binding else {
            return;
        };

        if !pressed {
            if self.live.contains_key(&key) {
                self.release(key);
            }

            return;
        }

        match self.live.get_mut(&key) {
            Some(ticks) => {
                *ticks += 1;

                if *ticks >= self.repeat_period {
                    *ticks = 0;

                    if !self.ledger.is_released() {
                        self.send(key, Click);
                    }
                }
            }
            None => self.press(channel, key),
        }
    }

    /// Lets go of every held key, exactly once even if the controller raced us.
    pub fn release_all(&mut self) {
        if let Some(keys) = self.ledger.take_all() {
            if let Some(backend) = self.backend.as_mut() {
                release_keys(backend.as_mut(), &keys);
            }
        }

        self.live.clear();
        self.owners = [None; CHANNEL_COUNT];
    }

    fn press(&mut self, channel: usize, key: Key) {
        if self.ledger.is_released() || self.backend.is_none() {
            return;
        }

        if !self.send(key, Press) {
            // Key drop, the next pressed tick tries again
            return;
        }

        if self.ledger.confirm_press(key) {
            self.live.insert(key, 1);
            self.owners[channel] = Some(key);
        } else {
            self.send(key, Release);
        }
    }

    fn release(&mut self, key: Key) {
        self.live.remove(&key);

        for owner in self.owners.iter_mut() {
            if *owner == Some(key) {
                *owner = None;
            }
        }

        if self.ledger.begin_release(key) {
            self.send(key, Release);
        }
    }

    fn send(&mut self, key: Key, direction: Direction) -> bool {
        let Some(backend) = self.backend.as_mut() else {
            return false;
        };

        match backend.key(key, direction) {
            Ok(_) => {
                if direction != Click {
                    log_print!("[KEY] {} {:?}", describe_key(&key), direction);
                }

                true
            }
            Err(e) => {
                log_error!(
                    "{:?} of {} was dropped: {}",
                    direction,
                    describe_key(&key),
                    e
                );

                false
            }
        }
    }
}

impl Drop for InputDriver {
    fn drop(&mut self) {
        self.release_all();
    }
}

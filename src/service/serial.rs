use enigo::Key;
use std::{
    io::{ErrorKind, Read},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{sync_channel, Receiver, SyncSender, TrySendError},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use crate::{
    config::SessionConfig,
    constants::{CHANNEL_COUNT, FRAME_QUEUE_DEPTH, SERIAL_READ_CHUNK, SERIAL_READ_TIMEOUT},
    error::ConnectionError,
    log_error, log_info, log_warn,
    service::{
        decoder::{LineBuffer, LineDecoder, TagDecoder},
        interaction::InputDriver,
        mapper::{ChannelFrame, ChannelMapper},
    },
    utility::{describe_key, parse_key_binding},
};

/// Opens the byte stream a session reads telegrams from.
pub trait Connector: Send + Sync {
    fn open(&self, port: &str, baud_rate: u32) -> Result<Box<dyn Read + Send>, ConnectionError>;
}

/// Real serial devices through `serialport`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialConnector;

impl Connector for SerialConnector {
    fn open(&self, port: &str, baud_rate: u32) -> Result<Box<dyn Read + Send>, ConnectionError> {
        if port.is_empty() {
            return Err(ConnectionError::NoPort);
        }

        // Short timeout so an idle line never keeps the loop from seeing `stop`
        let mut serial_port = serialport::new(port, baud_rate)
            .timeout(Duration::from_millis(SERIAL_READ_TIMEOUT))
            .open()
            .map_err(|source| ConnectionError::Open {
                port: port.to_string(),
                baud_rate,
                source,
            })?;

        // This should be true for windows to start reading the serial messages
        if let Err(e) = serial_port.write_data_terminal_ready(true) {
            log_warn!("Could not raise DTR on `{}`: {}", port, e);
        }

        // Whatever was queued before we connected belongs to nobody
        if let Err(e) = serial_port.clear(serialport::ClearBuffer::Input) {
            log_warn!("Could not discard the input buffer of `{}`: {}", port, e);
        }

        log_info!(
            "A successful connection was established with `{}` at a baud rate of `{}`",
            port,
            baud_rate
        );

        Ok(Box::new(serial_port))
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Running,
    Stopping,
}

/// Session state shared between a loop and its controller.
#[derive(Debug, Default)]
pub struct StateCell(Mutex<SessionState>);

impl StateCell {
    pub fn get(&self) -> SessionState {
        *self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set(&self, state: SessionState) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }
}

/// Bounded queue between a loop and whoever watches its frames.
pub fn frame_queue() -> (SyncSender<ChannelFrame>, Receiver<ChannelFrame>) {
    sync_channel(FRAME_QUEUE_DEPTH)
}

/// Why a loop left `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Stopped,
    Disconnected,
}

/// The decode → map → drive loop of one session.
///
/// Without a driver it is the calibration variant: same pipeline, frames are
/// published but no mouse or key event is ever sent.
pub struct AcquisitionLoop {
    reader: Box<dyn Read + Send>,
    decoder: Box<dyn LineDecoder>,
    mapper: ChannelMapper,
    driver: Option<InputDriver>,
    bindings: [Option<Key>; CHANNEL_COUNT],
    sensitivity: f64,
    poll_interval: Duration,
    settle_delay: Duration,
    lines: LineBuffer,
    frames: SyncSender<ChannelFrame>,
    observer_gone: bool,
    dropped_frames: u64,
    stop: Arc<AtomicBool>,
    state: Arc<StateCell>,
}

impl AcquisitionLoop {
    pub fn new(
        config: &SessionConfig,
        reader: Box<dyn Read + Send>,
        driver: Option<InputDriver>,
        frames: SyncSender<ChannelFrame>,
        stop: Arc<AtomicBool>,
        state: Arc<StateCell>,
    ) -> Self {
        let decoder = TagDecoder::with_channels(config.channels.iter().map(|c| c.name.as_str()));

        let bindings = std::array::from_fn(|i| {
            let channel = &config.channels[i];
            let key = parse_key_binding(&channel.key);

            match (&key, driver.is_some()) {
                (Some(key), true) => {
                    log_info!("`{}` is bound to {}", channel.name, describe_key(key))
                }
                (None, true) if !channel.key.trim().is_empty() => log_warn!(
                    "`{}` has an unknown key binding `{}`, it will stay unbound",
                    channel.name,
                    channel.key
                ),
                _ => (),
            }

            key
        });

        Self {
            reader,
            decoder: Box::new(decoder),
            mapper: ChannelMapper::new(&config.channels, config.absent_channels),
            driver,
            bindings,
            sensitivity: config.sensitivity,
            poll_interval: config.poll_interval,
            settle_delay: config.settle_delay,
            lines: LineBuffer::new(),
            frames,
            observer_gone: false,
            dropped_frames: 0,
            stop,
            state,
        }
    }

    /// Swaps the line decoder, e.g. for a stricter tokenizer.
    pub fn with_decoder(mut self, decoder: Box<dyn LineDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn run(mut self) -> LoopExit {
        self.settle();

        self.state.set(SessionState::Running);

        let mut buf = [0u8; SERIAL_READ_CHUNK];

        let exit = loop {
            if self.stop_requested() {
                break LoopExit::Stopped;
            }

            match self.reader.read(&mut buf) {
                Ok(n) => self.lines.push(&buf[..n]),
                Err(ref e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) => {}
                Err(e) => {
                    log_error!("Connection was lost: {}", e);

                    break LoopExit::Disconnected;
                }
            }

            // A read can block for a long time, `stop` may have been raised meanwhile
            if self.stop_requested() {
                break LoopExit::Stopped;
            }

            while let Some(line) = self.lines.next_line() {
                if self.stop_requested() {
                    break;
                }

                self.process_line(&line);
            }

            std::thread::sleep(self.poll_interval);
        };

        self.shutdown();

        exit
    }

    /// Runs one line through decoder, mapper and driver, then publishes the frame.
    pub fn process_line(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }

        let telegram = self.decoder.decode(line);

        // Nothing we recognise, not even a partial field
        if telegram.is_empty() {
            return;
        }

        if let (Some(driver), Some(motion)) = (self.driver.as_mut(), telegram.motion()) {
            driver.apply_motion(motion, self.sensitivity);
        }

        let Some(frame) = self.mapper.map(&telegram) else {
            return;
        };

        if let Some(driver) = self.driver.as_mut() {
            for (channel, snapshot) in frame.channels.iter().enumerate() {
                // An absent channel keeps whatever state it had
                if frame.fresh[channel] {
                    driver.update_key(channel, self.bindings[channel], snapshot.pressed);
                }
            }
        }

        self.publish(frame);
    }

    fn publish(&mut self, frame: ChannelFrame) {
        // Never blocks, a full queue drops the newest frame so order is kept
        match self.frames.try_send(frame) {
            Ok(_) => self.dropped_frames = 0,
            Err(TrySendError::Full(_)) => {
                if self.dropped_frames == 0 {
                    log_warn!("The frame observer is falling behind, dropping frames");
                }

                self.dropped_frames += 1;
            }
            Err(TrySendError::Disconnected(_)) => {
                if !self.observer_gone {
                    self.observer_gone = true;

                    log_warn!("Nobody is listening to channel frames anymore");
                }
            }
        }
    }

    fn settle(&self) {
        // Boards reset when the port opens, give the firmware time to boot
        let deadline = Instant::now() + self.settle_delay;

        while Instant::now() < deadline && !self.stop_requested() {
            std::thread::sleep(Duration::from_millis(10).min(self.settle_delay));
        }
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn shutdown(mut self) {
        self.state.set(SessionState::Stopping);

        // Keys first, before anything else can go wrong
        if let Some(driver) = self.driver.as_mut() {
            driver.release_all();
        }

        self.lines.clear();

        // Dropping the reader closes the port
        drop(self.reader);

        self.state.set(SessionState::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{
        interaction::KeyLedger,
        testing::{Event, Recorder, ScriptedReader},
    };
    use enigo::Direction::{Click, Press, Release};

    fn quick_config(keys: [&str; CHANNEL_COUNT]) -> SessionConfig {
        let mut config = SessionConfig::default();

        config.settle_delay = Duration::ZERO;

        for (channel, key) in config.channels.iter_mut().zip(keys) {
            channel.key = key.to_string();
        }

        config
    }

    fn build(
        config: &SessionConfig,
        reader: ScriptedReader,
        recorder: Option<&Recorder>,
    ) -> (
        AcquisitionLoop,
        Receiver<ChannelFrame>,
        Arc<AtomicBool>,
    ) {
        let (tx, rx) = frame_queue();
        let stop = Arc::new(AtomicBool::new(false));
        let driver = recorder.map(|recorder| {
            InputDriver::new(
                Some(recorder.boxed()),
                Arc::new(KeyLedger::new()),
                config.repeat_period_ticks,
            )
        });

        let acquisition = AcquisitionLoop::new(
            config,
            Box::new(reader),
            driver,
            tx,
            stop.clone(),
            Arc::new(StateCell::default()),
        );

        (acquisition, rx, stop)
    }

    #[test]
    fn lines_drive_motion_keys_and_frames() {
        let config = quick_config(["a", "", "", "", ""]);
        let recorder = Recorder::default();
        let (mut acquisition, frames, _) =
            build(&config, ScriptedReader::default(), Some(&recorder));

        acquisition.process_line("X:0 Y:0 D0:100");
        acquisition.process_line("X:3 Y:0 D0:700 D1:50");
        acquisition.process_line("garbage");

        let events = recorder.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], Event::Key(Key::Unicode('a'), Press));
        assert!(matches!(events[1], Event::Move(x, y) if x == 0.0 && (y + 2.4).abs() < 1e-9));
        assert_eq!(events[2], Event::Key(Key::Unicode('a'), Release));

        let published: Vec<ChannelFrame> = frames.try_iter().collect();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].readings()[0], (91, 100));
        assert!(published[1].channels[1].pressed);
    }

    #[test]
    fn calibration_never_touches_input() {
        let config = quick_config(["a", "b", "c", "d", "e"]);
        let (mut calibration, frames, _) = build(&config, ScriptedReader::default(), None);

        calibration.process_line("X:9 Y:9 D0:1 D1:1 D2:1 D3:1 D4:1");

        let frame = frames.try_recv().unwrap();
        assert!(frame.channels.iter().all(|c| c.pressed));
    }

    #[test]
    fn loop_reassembles_lines_and_releases_keys_on_stop() {
        let mut config = quick_config(["a", "", "", "", ""]);
        config.repeat_period_ticks = 2;

        let recorder = Recorder::default();
        let (tx, frames) = frame_queue();
        let stop = Arc::new(AtomicBool::new(false));

        let worker = {
            let recorder = recorder.clone();
            let stop = stop.clone();

            // The input backend isn't `Send`, so the loop is built on its own thread
            std::thread::spawn(move || {
                let reader = ScriptedReader::new(["D0:1", "00 X:1 Y:1\nD0:", "200\n", "D0:3"]);
                let driver = InputDriver::new(
                    Some(recorder.boxed()),
                    Arc::new(KeyLedger::new()),
                    config.repeat_period_ticks,
                );

                AcquisitionLoop::new(
                    &config,
                    Box::new(reader),
                    Some(driver),
                    tx,
                    stop,
                    Arc::new(StateCell::default()),
                )
                .run()
            })
        };

        let first = frames.recv_timeout(Duration::from_secs(2)).unwrap();
        let second = frames.recv_timeout(Duration::from_secs(2)).unwrap();

        stop.store(true, Ordering::Release);

        assert_eq!(worker.join().unwrap(), LoopExit::Stopped);
        assert_eq!(first.channels[0].raw, 100);
        assert_eq!(second.channels[0].raw, 200);

        // The truncated "D0:3" never completed, so it never became a frame
        assert!(frames.try_recv().is_err());
        assert_eq!(recorder.count(Key::Unicode('a'), Press), 1);
        assert_eq!(recorder.count(Key::Unicode('a'), Click), 1);
        assert_eq!(recorder.count(Key::Unicode('a'), Release), 1);
    }

    #[test]
    fn read_errors_end_the_session_without_stuck_keys() {
        let config = quick_config(["z", "", "", "", ""]);
        let recorder = Recorder::default();
        let reader = ScriptedReader::new(["D0:10\n"]).then_fail();
        let (acquisition, _frames, _stop) = build(&config, reader, Some(&recorder));

        assert_eq!(acquisition.run(), LoopExit::Disconnected);
        assert_eq!(recorder.count(Key::Unicode('z'), Press), 1);
        assert_eq!(recorder.count(Key::Unicode('z'), Release), 1);
    }

    #[test]
    fn dropped_observer_does_not_stop_the_loop() {
        let config = quick_config(["a", "", "", "", ""]);
        let recorder = Recorder::default();
        let (mut acquisition, frames, _) =
            build(&config, ScriptedReader::default(), Some(&recorder));

        drop(frames);

        acquisition.process_line("D0:10");
        acquisition.process_line("D0:900");

        assert_eq!(recorder.count(Key::Unicode('a'), Release), 1);
    }

    #[test]
    fn decoder_can_be_swapped() {
        struct CommaDecoder;

        impl LineDecoder for CommaDecoder {
            fn decode(&self, line: &str) -> crate::service::decoder::Telegram {
                let mut telegram = crate::service::decoder::Telegram::default();

                for (name, value) in ["D0", "D1", "D2", "D3", "D4"].iter().zip(line.split(',')) {
                    if let Ok(value) = value.trim().parse() {
                        telegram.insert(name, value);
                    }
                }

                telegram
            }
        }

        let config = quick_config(["", "", "", "", ""]);
        let (acquisition, frames, _) = build(&config, ScriptedReader::default(), None);
        let mut acquisition = acquisition.with_decoder(Box::new(CommaDecoder));

        acquisition.process_line("100, 200, x");

        let frame = frames.try_recv().unwrap();
        assert_eq!(frame.fresh, [true, true, false, false, false]);
        assert_eq!(frame.channels[1].raw, 200);
    }

    #[test]
    fn lines_read_after_stop_are_dropped() {
        // Stop is raised while the read is blocked, then the data shows up
        struct LateRead {
            stop: Arc<AtomicBool>,
        }

        impl Read for LateRead {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                self.stop.store(true, Ordering::Release);

                let line = b"X:5 Y:5 D0:10\n";
                buf[..line.len()].copy_from_slice(line);

                Ok(line.len())
            }
        }

        let config = quick_config(["a", "", "", "", ""]);
        let recorder = Recorder::default();
        let (tx, frames) = frame_queue();
        let stop = Arc::new(AtomicBool::new(false));
        let driver = InputDriver::new(
            Some(recorder.boxed()),
            Arc::new(KeyLedger::new()),
            config.repeat_period_ticks,
        );

        let exit = AcquisitionLoop::new(
            &config,
            Box::new(LateRead { stop: stop.clone() }),
            Some(driver),
            tx,
            stop,
            Arc::new(StateCell::default()),
        )
        .run();

        assert_eq!(exit, LoopExit::Stopped);
        assert!(recorder.events().is_empty());
        assert!(frames.try_recv().is_err());
    }

    #[test]
    fn a_full_frame_queue_drops_new_frames_without_blocking() {
        let config = quick_config(["", "", "", "", ""]);
        let (tx, frames) = sync_channel(2);
        let mut calibration = AcquisitionLoop::new(
            &config,
            Box::new(ScriptedReader::default()),
            None,
            tx,
            Arc::new(AtomicBool::new(false)),
            Arc::new(StateCell::default()),
        );

        for raw in [100, 200, 300, 400] {
            calibration.process_line(&format!("D0:{}", raw));
        }

        let kept: Vec<i32> = frames.try_iter().map(|f| f.channels[0].raw).collect();
        assert_eq!(kept, vec![100, 200]);

        // Room again, publishing resumes in order
        calibration.process_line("D0:500");
        assert_eq!(frames.try_recv().unwrap().channels[0].raw, 500);
    }
}

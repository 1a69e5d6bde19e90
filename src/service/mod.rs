pub mod decoder;
pub mod interaction;
pub mod mapper;
pub mod serial;
pub mod session;

#[cfg(test)]
pub(crate) mod testing {
    use enigo::{Direction, Key};
    use std::{
        collections::VecDeque,
        io::{self, ErrorKind, Read},
        sync::{Arc, Mutex},
    };

    use crate::{error::DriverError, service::interaction::InputBackend};

    #[derive(Debug, Clone, PartialEq)]
    pub enum Event {
        Move(f64, f64),
        Key(Key, Direction),
    }

    /// Input backend that only writes down what it was asked to do.
    #[derive(Debug, Clone, Default)]
    pub struct Recorder {
        events: Arc<Mutex<Vec<Event>>>,
        reject_keys: bool,
    }

    impl Recorder {
        /// A backend whose key events all fail, like a locked-down session.
        pub fn rejecting_keys() -> Self {
            Self {
                reject_keys: true,
                ..Self::default()
            }
        }

        pub fn boxed(&self) -> Box<dyn InputBackend> {
            Box::new(self.clone())
        }

        pub fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        pub fn count(&self, key: Key, direction: Direction) -> usize {
            self.events()
                .iter()
                .filter(|event| **event == Event::Key(key, direction))
                .count()
        }
    }

    impl InputBackend for Recorder {
        fn move_relative(&mut self, dx: f64, dy: f64) -> Result<(), DriverError> {
            self.events.lock().unwrap().push(Event::Move(dx, dy));
            Ok(())
        }

        fn key(&mut self, key: Key, direction: Direction) -> Result<(), DriverError> {
            if self.reject_keys {
                return Err(DriverError::Rejected("key events are disabled".to_string()));
            }

            self.events.lock().unwrap().push(Event::Key(key, direction));
            Ok(())
        }
    }

    /// Serial stand-in: hands out the scripted chunks one read at a time, then
    /// behaves like an idle port (or a pulled cable with `then_fail`).
    #[derive(Debug, Default)]
    pub struct ScriptedReader {
        chunks: VecDeque<Vec<u8>>,
        fail_when_done: bool,
    }

    impl ScriptedReader {
        pub fn new<'a>(chunks: impl IntoIterator<Item = &'a str>) -> Self {
            Self {
                chunks: chunks.into_iter().map(|c| c.as_bytes().to_vec()).collect(),
                fail_when_done: false,
            }
        }

        pub fn then_fail(mut self) -> Self {
            self.fail_when_done = true;
            self
        }
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let Some(mut chunk) = self.chunks.pop_front() else {
                if self.fail_when_done {
                    return Err(io::Error::new(ErrorKind::BrokenPipe, "device unplugged"));
                }

                return Err(io::Error::new(ErrorKind::TimedOut, "no data"));
            };

            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);

            if n < chunk.len() {
                self.chunks.push_front(chunk.split_off(n));
            }

            Ok(n)
        }
    }
}

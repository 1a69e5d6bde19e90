use thiserror::Error;

/// The serial device could not be opened. Fatal to the session attempt.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("could not open `{port}` at {baud_rate} baud: {source}")]
    Open {
        port: String,
        baud_rate: u32,
        #[source]
        source: serialport::Error,
    },
    #[error("no serial port configured")]
    NoPort,
}

/// The OS refused an injected input event, or there is no input backend at all.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("input backend unavailable: {0}")]
    Unavailable(String),
    #[error("input event rejected: {0}")]
    Rejected(String),
}

impl From<enigo::InputError> for DriverError {
    fn from(value: enigo::InputError) -> Self {
        DriverError::Rejected(value.to_string())
    }
}

impl From<enigo::NewConError> for DriverError {
    fn from(value: enigo::NewConError) -> Self {
        DriverError::Unavailable(value.to_string())
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a {0} session is already running")]
    AlreadyRunning(crate::service::session::SessionKind),
    #[error("the previous {0} session has not let go of the glove yet, try again shortly")]
    StillStopping(crate::service::session::SessionKind),
    #[error(transparent)]
    Connect(#[from] ConnectionError),
    #[error("could not spawn the session worker: {0}")]
    Spawn(#[source] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("could not encode config: {0}")]
    Encode(#[from] toml::ser::Error),
    #[error("could not parse legacy config: {0}")]
    Legacy(#[from] serde_json::Error),
    #[error("there is no finger channel #{0}")]
    InvalidChannel(usize),
}

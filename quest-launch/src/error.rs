use std::fmt::Formatter;

pub type Result<T> = std::result::Result<T, Error>;

/// Infrastructure errors raised by the config loader, the state repositories
/// and the HTTP clients. Launch failures have their own taxonomy in
/// [`crate::saga::LaunchError`].
#[derive(Debug)]
pub enum Error {
    Config(String),
    Io(std::io::Error),
    Db(redis::RedisError),
    Http(reqwest::Error),
    Json(serde_json::Error),
    Status { code: u16, body: String },
    NotSupport(String),
    Unknown(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Config(e) => write!(f, "config error: {}", e),
            Error::Io(e) => write!(f, "Io error {:?}", e),
            Error::Db(e) => write!(f, "Database error {:?}", e),
            Error::Http(e) => write!(f, "http error: {}", e),
            Error::Json(e) => write!(f, "json error: {}", e),
            Error::Status { code, body } => write!(f, "unexpected status {}: {}", code, body),
            Error::NotSupport(e) => write!(f, "Not support: {}", e),
            Error::Unknown(e) => write!(f, "a unknown error happened: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Db(e) => Some(e),
            Error::Http(e) => Some(e),
            Error::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::Db(e)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

//! Crate-wide error: a single human-readable message. Fatal conditions are
//! carried up to `main`; recoverable ones never become an `Error`.

use std::fmt;

#[derive(Debug)]
pub struct Error {
    msg: String,
}

impl Error {
    pub fn msg<M: Into<String>>(msg: M) -> Self {
        Self { msg: msg.into() }
    }

    /// Prefix the message with where it happened.
    pub fn context(self, ctx: impl fmt::Display) -> Self {
        Self::msg(format!("{ctx}: {}", self.msg))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg)
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::msg(format!("json error: {err}"))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Self::msg(format!("yaml error: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_prefixes_message() {
        let err: Error = serde_json::from_str::<u32>("x").unwrap_err().into();
        let err = err.context("invalid release feed os.json");
        assert!(err.to_string().starts_with("invalid release feed os.json: json error: "));
    }
}

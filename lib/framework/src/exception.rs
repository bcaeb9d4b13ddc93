use std::error::Error;
use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;

use serde::Deserialize;
use serde::Serialize;

pub mod error_code;

pub type CoreRsResult<T> = Result<T, Exception>;

pub struct Exception {
    pub severity: Severity,
    pub code: Option<String>,
    pub message: String,
    pub location: Option<String>,
    pub source: Option<Box<Exception>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    #[serde(rename = "WARN")]
    Warn,
    #[serde(rename = "ERROR")]
    Error,
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        })
    }
}

impl Exception {
    /// Iterates from this exception down to the innermost cause.
    pub fn chain(&self) -> impl Iterator<Item = &Exception> {
        std::iter::successors(Some(self), |exception| exception.source.as_deref())
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.code.as_deref() == Some(code)
    }
}

impl Debug for Exception {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for Exception {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (index, exception) in self.chain().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{index}: {} ", exception.severity)?;
            if let Some(ref code) = exception.code {
                write!(f, "[{code}] ")?;
            }
            write!(f, "{}", exception.message)?;
            if let Some(ref location) = exception.location {
                write!(f, " at {location}")?;
            }
        }
        Ok(())
    }
}

#[macro_export]
macro_rules! exception {
    ($(severity = $severity:expr,)? $(code = $code:expr,)? message = $message:expr $(,source = $source:expr)?) => {{
        #[allow(unused_variables)]
        let severity = $crate::exception::Severity::Error;
        $(
            let severity = $severity;
        )?
        #[allow(unused_variables)]
        let code: Option<String> = None;
        $(
            let code = Some($code.to_string());
        )?
        #[allow(unused_variables)]
        let source: Option<Box<$crate::exception::Exception>> = None;
        $(
            let source = Some(Box::new($source.into()));
        )?
        $crate::exception::Exception {
            severity,
            code,
            message: $message.to_string(),
            location: Some(format!("{}:{}:{}", file!(), line!(), column!())),
            source,
        }
    }};
}

#[macro_export]
macro_rules! validation_error {
    ($(severity = $severity:expr,)? message = $message:expr) => {{
        #[allow(unused_variables)]
        let severity = $crate::exception::Severity::Warn;
        $(
            let severity = $severity;
        )?
        $crate::exception!(severity = severity, code = $crate::exception::error_code::VALIDATION_ERROR, message = $message)
    }};
}

// std errors only expose a borrowed cause chain, rebuild it innermost first
fn source_chain(error: Option<&(dyn Error + 'static)>) -> Option<Box<Exception>> {
    let causes: Vec<&(dyn Error + 'static)> = std::iter::successors(error, |&cause| cause.source()).collect();
    causes.into_iter().rev().fold(None, |inner, cause| {
        Some(Box::new(Exception {
            severity: Severity::Error,
            code: None,
            message: cause.to_string(),
            location: None,
            source: inner,
        }))
    })
}

impl<T> From<T> for Exception
where
    T: Error + 'static,
{
    fn from(error: T) -> Self {
        Exception {
            severity: Severity::Error,
            code: None,
            message: error.to_string(),
            location: None,
            source: source_chain(error.source()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;
    use std::fmt::Display;
    use std::fmt::Formatter;
    use std::io;

    use super::Exception;
    use super::Severity;
    use super::error_code;

    #[derive(Debug)]
    struct DeliveryError(io::Error);

    impl Display for DeliveryError {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            f.write_str("delivery failed")
        }
    }

    impl Error for DeliveryError {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn validation_error() {
        let exception = validation_error!(message = "vehicle_id must not be empty");
        assert_eq!(exception.severity, Severity::Warn);
        assert!(exception.has_code(error_code::VALIDATION_ERROR));
        assert!(exception.location.is_some());
    }

    #[test]
    fn display_with_source() {
        let exception = exception!(
            message = "failed to publish",
            source = io::Error::other("broker unreachable")
        );
        let text = exception.to_string();
        assert!(text.starts_with("0: ERROR failed to publish at "));
        assert!(text.ends_with("1: ERROR broker unreachable"));
        assert_eq!(exception.chain().count(), 2);
    }

    #[test]
    fn from_error_keeps_causes() {
        let exception = Exception::from(DeliveryError(io::Error::other("message timed out")));
        let messages: Vec<&str> = exception.chain().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["delivery failed", "message timed out"]);
    }
}

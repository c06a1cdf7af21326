//! Call deadlines carried in the `grpc-timeout` request header

use crate::error::FileServiceError;
use std::time::Duration;
use tokio::time::Instant;
use tonic::metadata::MetadataMap;

const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

/// Point in time after which a call's work must stop
#[derive(Debug, Clone, Copy, Default)]
pub struct CallDeadline {
    expires_at: Option<Instant>,
}

impl CallDeadline {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn after(timeout: Duration) -> Self {
        Self {
            expires_at: Some(Instant::now() + timeout),
        }
    }

    /// Deadline from the caller's `grpc-timeout`, or none if absent/unparseable
    pub fn from_metadata(metadata: &MetadataMap) -> Self {
        metadata
            .get(GRPC_TIMEOUT_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_grpc_timeout)
            .map(Self::after)
            .unwrap_or_default()
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn check(&self) -> Result<(), FileServiceError> {
        match self.expires_at {
            Some(at) if Instant::now() >= at => Err(FileServiceError::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}

/// Parse a `grpc-timeout` value: up to 8 digits followed by a unit
/// (`H`, `M`, `S`, `m`, `u`, `n`)
pub fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    if value.len() < 2 || value.len() > 9 {
        return None;
    }

    let (digits, unit) = value.split_at(value.len() - 1);
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;

    match unit {
        "H" => Some(Duration::from_secs(amount * 60 * 60)),
        "M" => Some(Duration::from_secs(amount * 60)),
        "S" => Some(Duration::from_secs(amount)),
        "m" => Some(Duration::from_millis(amount)),
        "u" => Some(Duration::from_micros(amount)),
        "n" => Some(Duration::from_nanos(amount)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_grpc_timeout("1H"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_grpc_timeout("2M"), Some(Duration::from_secs(120)));
        assert_eq!(parse_grpc_timeout("5S"), Some(Duration::from_secs(5)));
        assert_eq!(parse_grpc_timeout("250m"), Some(Duration::from_millis(250)));
        assert_eq!(parse_grpc_timeout("10u"), Some(Duration::from_micros(10)));
        assert_eq!(parse_grpc_timeout("99999999n"), Some(Duration::from_nanos(99_999_999)));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "S", "5", "5s", "-5S", "123456789S", "1.5S"] {
            assert_eq!(parse_grpc_timeout(bad), None, "{:?}", bad);
        }
    }

    #[test]
    fn test_missing_header_means_no_deadline() {
        let deadline = CallDeadline::from_metadata(&MetadataMap::new());
        assert!(deadline.remaining().is_none());
        assert!(deadline.check().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let mut metadata = MetadataMap::new();
        metadata.insert(GRPC_TIMEOUT_HEADER, "100m".parse().unwrap());
        let deadline = CallDeadline::from_metadata(&metadata);

        assert!(deadline.check().is_ok());

        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(matches!(deadline.check(), Err(FileServiceError::DeadlineExceeded)));
        assert_eq!(deadline.remaining(), Some(Duration::ZERO));
    }
}

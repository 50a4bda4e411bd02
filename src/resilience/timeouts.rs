//! Timeout enforcement.

use std::future::Future;
use std::time::Duration;

/// Convert a seconds setting into an optional deadline; zero disables it.
pub fn from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Run an I/O future under an optional deadline.
///
/// Expiry is reported as `ErrorKind::TimedOut` so callers handle it like any
/// other I/O failure.
pub async fn with_deadline<F, T>(deadline: Option<Duration>, fut: F) -> std::io::Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    match deadline {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("operation timed out after {:?}", limit),
            )),
        },
        None => fut.await,
    }
}

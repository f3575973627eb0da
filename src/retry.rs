/*!
 # Bounded retry for BLE operations

 The strip is allowed to drop the link at any time, so every
 connection-dependent operation is retried. Failures fall into three
 classes with different policies:

 * not-found: the device cannot be located at all; failing fast is the only
   useful outcome
 * backoff-worthy: stack-level errors worth a short pause before the next
   attempt; re-raised once attempts are exhausted
 * broad transient: immediate retry, and the final failure is swallowed so
   mutating operations stay fire-and-forget

 The swallow/re-raise asymmetry is part of the API: [`RetryOutcome`] makes it
 explicit instead of hiding it behind whether a handler exists at the call
 site.
*/

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::Error;

/// Total attempts per operation (1 initial + 2 retries)
pub const DEFAULT_ATTEMPTS: u32 = 3;
/// Pause between attempts for the backoff-worthy class
pub const BACKOFF_TIME: Duration = Duration::from_millis(250);

/// Failure classification driving the retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Device/support problem, never retried
    NotFound,
    /// Stack error, retried after [`BACKOFF_TIME`], re-raised on exhaustion
    Backoff,
    /// Broad transient BLE error, retried immediately, swallowed on exhaustion
    Transient,
}

pub fn classify(err: &Error) -> FailureClass {
    match err {
        Error::DeviceNotFound(_)
        | Error::NoBluetoothAdapters
        | Error::CharacteristicMissing
        | Error::Cache(_) => FailureClass::NotFound,
        Error::Transport(btleplug::Error::DeviceNotFound) => FailureClass::NotFound,
        Error::Transport(btleplug::Error::TimedOut(_))
        | Error::Transport(btleplug::Error::RuntimeError(_))
        | Error::ConnectionTimeout => FailureClass::Backoff,
        Error::Transport(_) | Error::NotConnected => FailureClass::Transient,
    }
}

/// Result of a retried operation.
///
/// `Swallowed` means the operation ran out of attempts on a broad transient
/// error: the caller must treat the operation as best-effort and carry on.
#[derive(Debug)]
pub enum RetryOutcome<T> {
    Ok(T),
    /// Not retryable, or a backoff-class error that exhausted its attempts
    Fatal(Error),
    /// Transient-class error after the last attempt; logged, not raised
    Swallowed(Error),
}

impl<T> RetryOutcome<T> {
    /// Collapses the outcome for fire-and-forget callers: `Swallowed`
    /// becomes `Ok(None)`, `Fatal` propagates.
    pub fn into_result(self) -> crate::Result<Option<T>> {
        match self {
            RetryOutcome::Ok(value) => Ok(Some(value)),
            RetryOutcome::Fatal(err) => Err(err),
            RetryOutcome::Swallowed(_) => Ok(None),
        }
    }
}

/// Runs `op` under the retry policy. At most [`DEFAULT_ATTEMPTS`] attempts.
pub async fn retry<T, F, Fut>(label: &str, mut op: F) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::Result<T>>,
{
    let max_attempts = DEFAULT_ATTEMPTS;
    for attempt in 1..=max_attempts {
        let err = match op().await {
            Ok(value) => return RetryOutcome::Ok(value),
            Err(err) => err,
        };
        match classify(&err) {
            FailureClass::NotFound => {
                debug!("{label}: {err}, not retryable");
                return RetryOutcome::Fatal(err);
            }
            FailureClass::Backoff => {
                if attempt >= max_attempts {
                    warn!("{label}: {err}, reached max attempts ({attempt}/{max_attempts})");
                    return RetryOutcome::Fatal(err);
                }
                debug!(
                    "{label}: {err}, backing off {}ms, retrying ({attempt}/{max_attempts})",
                    BACKOFF_TIME.as_millis()
                );
                tokio::time::sleep(BACKOFF_TIME).await;
            }
            FailureClass::Transient => {
                if attempt >= max_attempts {
                    warn!("{label}: {err}, giving up after {attempt} attempts (best-effort)");
                    return RetryOutcome::Swallowed(err);
                }
                debug!("{label}: {err}, retrying ({attempt}/{max_attempts})");
            }
        }
    }
    unreachable!("retry loop always returns within max_attempts")
}

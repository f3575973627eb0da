/*!
 # Connection lifecycle management

 Owns the single physical link to a strip: serializes connection attempts
 behind one lock, re-arms an idle-disconnect timer on every successful
 connect or write, and distinguishes voluntary disconnects from the device
 dropping us.

 The physical transport sits behind the [`Transport`] trait so the session
 logic can be exercised against a simulated device; the btleplug-backed
 implementation lives in [`crate::ble`].
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::{Error, Result};

/// Inbound events from the transport, delivered on the session's channel.
///
/// Notification delivery is message passing rather than callbacks: the
/// session pumps this channel, which keeps the parser a plain consumer and
/// makes timer/disconnect races reproducible in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A frame arrived on the notify characteristic
    Notification(Vec<u8>),
    /// The transport reported the link dropped
    Disconnected,
}

/// Physical-link operations the connection manager drives.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establishes the link, resolves characteristics and subscribes to
    /// notifications where the hardware tolerates it. Returns
    /// [`Error::CharacteristicMissing`] when no known read/write pair
    /// exists; that condition is not retryable.
    async fn connect(&self) -> Result<()>;

    /// Tears the link down.
    async fn disconnect(&self) -> Result<()>;

    /// Writes one command frame to the write characteristic.
    async fn write(&self, frame: &[u8]) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Last observed signal strength, if the backend exposes one.
    async fn rssi(&self) -> Option<i16>;
}

/// Connection manager for one device session.
pub struct Link {
    name: String,
    transport: Arc<dyn Transport>,
    /// Serializes connect/disconnect; never held across a command write
    connect_lock: Mutex<()>,
    /// Idle period after the last traffic before a voluntary disconnect;
    /// zero disables the timer
    idle_delay: Duration,
    idle_timer: parking_lot::Mutex<Option<JoinHandle<()>>>,
    expected_disconnect: AtomicBool,
}

impl Link {
    pub fn new(name: impl Into<String>, transport: Arc<dyn Transport>, idle_delay: Duration) -> Arc<Link> {
        Arc::new(Link {
            name: name.into(),
            transport,
            connect_lock: Mutex::new(()),
            idle_delay,
            idle_timer: parking_lot::Mutex::new(None),
            expected_disconnect: AtomicBool::new(false),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// True when the last disconnect was initiated by this manager.
    pub fn is_expected_disconnect(&self) -> bool {
        self.expected_disconnect.load(Ordering::SeqCst)
    }

    pub async fn rssi(&self) -> Option<i16> {
        self.transport.rssi().await
    }

    /// Ensures the link is up, reusing an established connection when
    /// possible. A second caller arriving mid-connect waits on the same
    /// attempt instead of starting another. A transport connect timeout is
    /// logged and abandoned without propagating; callers observe the still
    /// disconnected link on their next write.
    pub async fn ensure_connected(self: &Arc<Self>) -> Result<()> {
        if self.transport.is_connected() {
            self.reset_idle_timer();
            return Ok(());
        }
        let _guard = self.connect_lock.lock().await;
        // Check again while holding the lock
        if self.transport.is_connected() {
            self.reset_idle_timer();
            return Ok(());
        }

        debug!("{}: Connecting", self.name);
        match self.transport.connect().await {
            Ok(()) => {
                debug!("{}: Connected", self.name);
                self.reset_idle_timer();
                Ok(())
            }
            Err(Error::Transport(btleplug::Error::TimedOut(_))) | Err(Error::ConnectionTimeout) => {
                error!("{}: Connection attempt timed out", self.name);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Writes a frame over the established link and re-arms the idle timer.
    pub async fn write_while_connected(self: &Arc<Self>, frame: &[u8]) -> Result<()> {
        if !self.transport.is_connected() {
            return Err(Error::NotConnected);
        }
        debug!(
            "{}: -> {}",
            self.name,
            frame.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(" ")
        );
        self.transport.write(frame).await?;
        self.reset_idle_timer();
        Ok(())
    }

    /// Connect-or-reuse, then write.
    pub async fn send(self: &Arc<Self>, frame: &[u8]) -> Result<()> {
        self.ensure_connected().await?;
        self.write_while_connected(frame).await
    }

    /// Cancels any pending idle disconnect and arms a fresh one.
    ///
    /// The cancel-then-arm pair runs under the timer slot lock, so two
    /// consecutive writes leave exactly one pending disconnect.
    pub fn reset_idle_timer(self: &Arc<Self>) {
        let mut slot = self.idle_timer.lock();
        if let Some(handle) = slot.take() {
            handle.abort();
        }
        self.expected_disconnect.store(false, Ordering::SeqCst);
        if self.idle_delay.is_zero() {
            return;
        }
        debug!(
            "{}: Configured disconnect from device in {}s",
            self.name,
            self.idle_delay.as_secs()
        );
        let link = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(link.idle_delay).await;
            debug!("{}: Disconnecting after idle timeout", link.name);
            link.disconnect().await;
        }));
    }

    /// Voluntary disconnect. Guarded by the connect lock so it cannot
    /// interleave with a connect; idempotent with a racing idle timer.
    pub async fn disconnect(&self) {
        let _guard = self.connect_lock.lock().await;
        self.expected_disconnect.store(true, Ordering::SeqCst);
        if self.transport.is_connected() {
            if let Err(err) = self.transport.disconnect().await {
                error!("{}: Error during disconnection: {err}", self.name);
            }
        }
    }

    /// Unconditional teardown bypassing the idle timer.
    pub async fn stop(&self) {
        debug!("{}: Stop", self.name);
        if let Some(handle) = self.idle_timer.lock().take() {
            handle.abort();
        }
        self.disconnect().await;
    }
}


#[cfg(test)]
mod tests {
    use super::testing::MockTransport;
    use super::*;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn connect_is_reused_when_already_up() {
        let transport = MockTransport::new();
        let link = Link::new("test", transport.clone(), Duration::ZERO);
        link.ensure_connected().await.unwrap();
        link.ensure_connected().await.unwrap();
        link.send(&[0x01]).await.unwrap();
        assert_eq!(transport.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn characteristic_missing_propagates() {
        let transport = MockTransport::new();
        *transport.fail_connect_with.lock() = Some(|| Error::CharacteristicMissing);
        let link = Link::new("test", transport.clone(), Duration::ZERO);
        assert!(matches!(
            link.ensure_connected().await,
            Err(Error::CharacteristicMissing)
        ));
    }

    #[tokio::test]
    async fn connect_timeout_is_swallowed() {
        let transport = MockTransport::new();
        *transport.fail_connect_with.lock() =
            Some(|| Error::Transport(btleplug::Error::TimedOut(Duration::from_secs(10))));
        let link = Link::new("test", transport.clone(), Duration::ZERO);
        // Abandoned, not an error; the link simply stays down
        link.ensure_connected().await.unwrap();
        assert!(!link.is_connected());
        assert!(matches!(
            link.write_while_connected(&[0x01]).await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timer_disconnects_after_delay() {
        let transport = MockTransport::new();
        let link = Link::new("test", transport.clone(), Duration::from_secs(30));
        link.ensure_connected().await.unwrap();
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(transport.disconnects.load(Ordering::SeqCst), 1);
        assert!(!link.is_connected());
        // Voluntary timer-driven disconnect is marked expected
        assert!(link.is_expected_disconnect());
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_leaves_one_pending_disconnect() {
        let transport = MockTransport::new();
        let link = Link::new("test", transport.clone(), Duration::from_secs(30));
        link.ensure_connected().await.unwrap();
        // Two consecutive writes, 20s apart, each re-arm the timer
        link.send(&[0x01]).await.unwrap();
        tokio::time::sleep(Duration::from_secs(20)).await;
        link.send(&[0x02]).await.unwrap();
        // 20s later the first timer would have fired; only the second is live
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(transport.disconnects.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(transport.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_disconnect_racing_timer_does_not_double_disconnect() {
        let transport = MockTransport::new();
        let link = Link::new("test", transport.clone(), Duration::from_secs(30));
        link.ensure_connected().await.unwrap();
        link.stop().await;
        assert_eq!(transport.disconnects.load(Ordering::SeqCst), 1);
        // A timer surviving the abort would fire here; the link is already
        // down so nothing else happens
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_delay_disables_idle_timer() {
        let transport = MockTransport::new();
        let link = Link::new("test", transport.clone(), Duration::ZERO);
        link.ensure_connected().await.unwrap();
        assert!(link.idle_timer.lock().is_none());
    }
}

/*!
 # Status-query auto-detection

 These strips mostly do not document a status query, and the byte sequence
 that elicits a state notification varies by vendor dialect. The prober
 iterates a catalog of candidates collected from the wild against a live
 connection, using notification arrival as the oracle, and persists the
 first candidate that gets an answer so later sessions skip the sweep.
*/

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::link::Link;
use crate::{Error, Result};

/// Settle time after issuing an already-known query command
const KNOWN_QUERY_SETTLE: Duration = Duration::from_millis(200);
/// Response window per probe candidate
const PROBE_RESPONSE_WINDOW: Duration = Duration::from_millis(400);

/// Candidate status-query frames, in probe order.
///
/// The list intermixes documented queries with raw protocol guesses seen in
/// the wild; some short frames could plausibly trigger unintended behavior
/// on untested hardware, so ordering puts the documented ones first.
pub static QUERY_COMMANDS: &[(&[u8], &str)] = &[
    // Standard ELK-BLEDOM commands
    (&[0x7e, 0x00, 0x01, 0xfa, 0x00, 0x00, 0x00, 0x00, 0xef], "Standard status query"),
    (&[0x7e, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0xef], "Alternative query v1"),
    (&[0x7e, 0x00, 0x81, 0x00, 0x00, 0x00, 0x00, 0x00, 0xef], "Status query 0x81"),
    (&[0x7e, 0x00, 0x82, 0x00, 0x00, 0x00, 0x00, 0x00, 0xef], "Status query 0x82"),
    (&[0x7e, 0x00, 0x83, 0x00, 0x00, 0x00, 0x00, 0x00, 0xef], "Status query 0x83"),
    // Short format commands
    (&[0xef, 0x01, 0x77], "Short query v1"),
    (&[0x7e, 0x00, 0x10], "Short query v2"),
    (&[0x7e, 0x10], "Minimal query"),
    (&[0x25, 0x00], "Minimal query 2"),
    (&[0x25, 0x02], "Minimal query 3"),
    // MELK specific commands
    (&[0x7e, 0x04, 0x01, 0x00, 0xff, 0x00, 0xff, 0x00, 0xef], "MELK status query"),
    (&[0x7e, 0x07, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0xef], "MELK query v2"),
    // Alternative long format
    (&[0x7e, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xef], "Get all status"),
    (&[0x7e, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0xef], "Status cmd 0x01"),
    (&[0x7e, 0x04, 0x00, 0x00, 0x00, 0x00, 0xff, 0x00, 0xef], "Power status query"),
    // LEDBLE specific
    (&[0x7e, 0x00, 0x04, 0xfa, 0x00, 0x00, 0x00, 0x00, 0xef], "LEDBLE status"),
    (&[0xcc, 0x23, 0x33], "LEDBLE short status"),
    // Other variants found in the wild
    (&[0xaa, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x55], "Variant header 0xaa"),
    (&[0x7e, 0x00, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0xef], "Query cmd 0x05"),
    // 0x7e variants over the remaining command bytes
    (&[0x7e, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0xef], "Query cmd 0x02"),
    (&[0x7e, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0xef], "Query cmd 0x03"),
    (&[0x7e, 0x00, 0x06, 0x00, 0x00, 0x00, 0x00, 0x00, 0xef], "Query cmd 0x06"),
    (&[0x7e, 0x00, 0x07, 0x00, 0x00, 0x00, 0x00, 0x00, 0xef], "Query cmd 0x07"),
    (&[0x7e, 0x00, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0xef], "Query cmd 0x08"),
    (&[0x7e, 0x00, 0x09, 0x00, 0x00, 0x00, 0x00, 0x00, 0xef], "Query cmd 0x09"),
    (&[0x7e, 0x00, 0x0a, 0x00, 0x00, 0x00, 0x00, 0x00, 0xef], "Query cmd 0x0a"),
    (&[0x7e, 0x00, 0x0b, 0x00, 0x00, 0x00, 0x00, 0x00, 0xef], "Query cmd 0x0b"),
    (&[0x7e, 0x00, 0x0c, 0x00, 0x00, 0x00, 0x00, 0x00, 0xef], "Query cmd 0x0c"),
    (&[0x7e, 0x00, 0x0d, 0x00, 0x00, 0x00, 0x00, 0x00, 0xef], "Query cmd 0x0d"),
    // Alternate second-byte prefixes
    (&[0x7e, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xef], "Query prefix 0x01"),
    (&[0x7e, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xef], "Query prefix 0x02"),
    (&[0x7e, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xef], "Query prefix 0x03"),
    (&[0x7e, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xef], "Query prefix 0x05"),
    (&[0x7e, 0x06, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xef], "Query prefix 0x06"),
    (&[0x7e, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xef], "Query prefix 0x08"),
    (&[0x7e, 0x09, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xef], "Query prefix 0x09"),
    // Short frames from other protocol families
    (&[0xef, 0x01], "Minimal EF query"),
    (&[0xef, 0x77], "EF query 0x77"),
    (&[0xef, 0x00], "EF query 0x00"),
    (&[0x10, 0x00], "Query 0x10 0x00"),
    (&[0x10, 0x01], "Query 0x10 0x01"),
    (&[0xaa, 0x00], "AA protocol query"),
    (&[0xbb, 0x00, 0x00], "BB protocol query"),
    // Alternate trailer bytes
    (&[0x7e, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff], "Query end 0xff"),
    (&[0x7e, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0xfe], "Query end 0xfe"),
    (&[0x7e, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0xee], "Query end 0xee"),
    // Ping-style guesses
    (&[0xff, 0x00, 0x00], "Ping command"),
    (&[0x00, 0x00, 0x00], "Null query"),
    (&[0x01], "Single byte query"),
    (&[0xff], "Single 0xFF query"),
];

/// Persisted winner for one device+model pairing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedQuery {
    pub command: Vec<u8>,
    pub description: String,
    pub device_name: String,
    pub model: String,
}

/// Whole-file JSON store for detected query commands, keyed
/// `"{device_name}_{model_name}"`.
///
/// Writes are read-modify-write of the full map; entries are per-device and
/// written once, so last-writer-wins is acceptable.
#[derive(Debug, Clone)]
pub struct QueryCacheStore {
    path: PathBuf,
}

impl QueryCacheStore {
    pub fn new(path: impl Into<PathBuf>) -> QueryCacheStore {
        QueryCacheStore { path: path.into() }
    }

    fn read_all(&self) -> Result<HashMap<String, CachedQuery>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let raw = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::Cache(format!("read {}: {e}", self.path.display())))?;
        serde_json::from_str(&raw).map_err(|e| Error::Cache(format!("parse cache: {e}")))
    }

    pub fn load(&self, key: &str) -> Result<Option<CachedQuery>> {
        Ok(self.read_all()?.remove(key))
    }

    pub fn save(&self, key: &str, entry: CachedQuery) -> Result<()> {
        let mut cache = self.read_all().unwrap_or_default();
        cache.insert(key.to_string(), entry);
        let raw = serde_json::to_string_pretty(&cache)
            .map_err(|e| Error::Cache(format!("encode cache: {e}")))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Cache(format!("mkdir {}: {e}", parent.display())))?;
        }
        std::fs::write(&self.path, raw)
            .map_err(|e| Error::Cache(format!("write {}: {e}", self.path.display())))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeState {
    NotStarted,
    Done,
}

/// Per-session prober. Runs opportunistically from `update()`; once done it
/// only re-issues the known winner (if any).
pub struct QueryProber {
    device_name: String,
    model_name: String,
    key: String,
    state: ProbeState,
    winner: Option<Vec<u8>>,
    store: Option<QueryCacheStore>,
}

impl QueryProber {
    pub fn new(device_name: &str, model_name: &str, store: Option<QueryCacheStore>) -> QueryProber {
        QueryProber {
            device_name: device_name.to_string(),
            model_name: model_name.to_string(),
            key: format!("{device_name}_{model_name}"),
            state: ProbeState::NotStarted,
            winner: None,
            store,
        }
    }

    /// The detected command, once known.
    pub fn working_command(&self) -> Option<&[u8]> {
        self.winner.as_deref()
    }

    /// Issues the known query, or sweeps the catalog once to find one.
    ///
    /// `responded` is the session's notification-arrival flag; any inbound
    /// frame during a candidate's response window counts as an answer.
    /// Idempotent after completion.
    pub async fn run(&mut self, link: &Arc<Link>, responded: &Arc<AtomicBool>) {
        if !link.is_connected() {
            return;
        }

        // Known winner: one write, short settle, errors swallowed
        if let Some(cmd) = self.winner.clone() {
            debug!("{}: Using known working query command", self.device_name);
            if let Err(err) = link.write_while_connected(&cmd).await {
                debug!("{}: Error with saved query: {err}", self.device_name);
                return;
            }
            tokio::time::sleep(KNOWN_QUERY_SETTLE).await;
            return;
        }

        if self.state == ProbeState::Done {
            return;
        }

        // Cache hit skips the sweep entirely
        if let Some(cached) = self.load_cached() {
            info!(
                "{}: Loaded cached query command: {}",
                self.device_name, cached.description
            );
            self.winner = Some(cached.command.clone());
            self.state = ProbeState::Done;
            if let Err(err) = link.write_while_connected(&cached.command).await {
                debug!("{}: Cached command failed: {err}", self.device_name);
                return;
            }
            tokio::time::sleep(KNOWN_QUERY_SETTLE).await;
            return;
        }

        info!(
            "{}: Auto-detecting working query command (testing {} commands)...",
            self.device_name,
            QUERY_COMMANDS.len()
        );
        for (cmd, description) in QUERY_COMMANDS {
            responded.store(false, Ordering::SeqCst);
            debug!(
                "{}: Testing: {description} -> {}",
                self.device_name,
                cmd.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(" ")
            );
            if let Err(err) = link.write_while_connected(cmd).await {
                debug!("{}: Command failed: {description} - {err}", self.device_name);
                continue;
            }
            tokio::time::sleep(PROBE_RESPONSE_WINDOW).await;

            if responded.load(Ordering::SeqCst) {
                info!("{}: Found working command: {description}", self.device_name);
                self.winner = Some(cmd.to_vec());
                self.state = ProbeState::Done;
                self.persist(cmd, description);
                return;
            }
        }

        info!(
            "{}: No query command found (device may not support state queries)",
            self.device_name
        );
        self.state = ProbeState::Done;
    }

    fn load_cached(&self) -> Option<CachedQuery> {
        let store = self.store.as_ref()?;
        match store.load(&self.key) {
            Ok(entry) => entry,
            Err(err) => {
                debug!("{}: Could not load query cache: {err}", self.device_name);
                None
            }
        }
    }

    fn persist(&self, cmd: &[u8], description: &str) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let entry = CachedQuery {
            command: cmd.to_vec(),
            description: description.to_string(),
            device_name: self.device_name.clone(),
            model: self.model_name.clone(),
        };
        match store.save(&self.key, entry) {
            Ok(()) => info!(
                "{}: Saved working query command: {description}",
                self.device_name
            ),
            Err(err) => warn!("{}: Could not save query cache: {err}", self.device_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::testing::MockTransport;
    use std::time::Duration;

    fn store(dir: &tempfile::TempDir) -> QueryCacheStore {
        QueryCacheStore::new(dir.path().join("query_commands.json"))
    }

    async fn connected_link(transport: &Arc<MockTransport>) -> Arc<Link> {
        let link = Link::new("ELK-BLE-01", transport.clone(), Duration::ZERO);
        link.ensure_connected().await.unwrap();
        link
    }

    #[test]
    fn cache_store_round_trips_and_merges() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        assert_eq!(store.load("a_MODEL").unwrap(), None);

        let entry = CachedQuery {
            command: vec![0x7e, 0x10],
            description: "Minimal query".into(),
            device_name: "a".into(),
            model: "MODEL".into(),
        };
        store.save("a_MODEL", entry.clone()).unwrap();
        store
            .save(
                "b_MODEL",
                CachedQuery {
                    command: vec![0x01],
                    description: "Single byte query".into(),
                    device_name: "b".into(),
                    model: "MODEL".into(),
                },
            )
            .unwrap();

        // First key survives the second device's read-modify-write
        assert_eq!(store.load("a_MODEL").unwrap(), Some(entry));
        assert!(store.load("b_MODEL").unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_stops_at_first_responder_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::new();
        let _events = transport.with_events();
        let link = connected_link(&transport).await;
        let responded = Arc::new(AtomicBool::new(false));

        // Device answers only to candidate index 4
        let target: Vec<u8> = QUERY_COMMANDS[4].0.to_vec();
        let flag = responded.clone();
        *transport.responder.lock() = Some(Box::new(move |frame| {
            if frame == target.as_slice() {
                flag.store(true, Ordering::SeqCst);
            }
            None
        }));

        let mut prober = QueryProber::new("ELK-BLE-01", "ELK-BLE", Some(store(&dir)));
        prober.run(&link, &responded).await;

        let writes = transport.written();
        assert_eq!(writes.len(), 5, "candidates 0..=4 written, then stop");
        for (i, write) in writes.iter().enumerate() {
            assert_eq!(write.as_slice(), QUERY_COMMANDS[i].0);
        }
        assert_eq!(prober.working_command(), Some(QUERY_COMMANDS[4].0));

        let cached = store(&dir).load("ELK-BLE-01_ELK-BLE").unwrap().unwrap();
        assert_eq!(cached.command.as_slice(), QUERY_COMMANDS[4].0);
        assert_eq!(cached.description, QUERY_COMMANDS[4].1);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_hit_skips_the_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let cache = store(&dir);
        cache
            .save(
                "ELK-BLE-01_ELK-BLE",
                CachedQuery {
                    command: QUERY_COMMANDS[7].0.to_vec(),
                    description: QUERY_COMMANDS[7].1.to_string(),
                    device_name: "ELK-BLE-01".into(),
                    model: "ELK-BLE".into(),
                },
            )
            .unwrap();

        let transport = MockTransport::new();
        let link = connected_link(&transport).await;
        let responded = Arc::new(AtomicBool::new(false));

        let mut prober = QueryProber::new("ELK-BLE-01", "ELK-BLE", Some(cache));
        prober.run(&link, &responded).await;

        // Only the cached command was written; no probing
        assert_eq!(transport.written(), vec![QUERY_COMMANDS[7].0.to_vec()]);
        assert_eq!(prober.working_command(), Some(QUERY_COMMANDS[7].0));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_sweep_marks_done_and_stays_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::new();
        let link = connected_link(&transport).await;
        let responded = Arc::new(AtomicBool::new(false));

        let mut prober = QueryProber::new("MUTE-01", "ELK-BLEDDM", Some(store(&dir)));
        prober.run(&link, &responded).await;
        assert_eq!(transport.written().len(), QUERY_COMMANDS.len());
        assert_eq!(prober.working_command(), None);

        // Second invocation is a no-op
        prober.run(&link, &responded).await;
        assert_eq!(transport.written().len(), QUERY_COMMANDS.len());
        assert!(store(&dir).load("MUTE-01_ELK-BLEDDM").unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn known_winner_is_reissued_on_later_runs() {
        let transport = MockTransport::new();
        let link = connected_link(&transport).await;
        let responded = Arc::new(AtomicBool::new(false));

        let flag = responded.clone();
        *transport.responder.lock() = Some(Box::new(move |frame| {
            if frame == QUERY_COMMANDS[0].0 {
                flag.store(true, Ordering::SeqCst);
            }
            None
        }));

        // No store configured; detection still works in-session
        let mut prober = QueryProber::new("ELK-BLE-01", "ELK-BLE", None);
        prober.run(&link, &responded).await;
        assert_eq!(transport.written().len(), 1);

        prober.run(&link, &responded).await;
        assert_eq!(transport.written().len(), 2);
        assert_eq!(transport.written()[1].as_slice(), QUERY_COMMANDS[0].0);
    }

    #[tokio::test]
    async fn disconnected_link_is_ignored() {
        let transport = MockTransport::new();
        let link = Link::new("ELK-BLE-01", transport.clone(), Duration::ZERO);
        let responded = Arc::new(AtomicBool::new(false));
        let mut prober = QueryProber::new("ELK-BLE-01", "ELK-BLE", None);
        prober.run(&link, &responded).await;
        assert!(transport.written().is_empty());
    }
}

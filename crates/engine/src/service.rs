//! Hintergrund-Thread fuer den periodischen Dienst-Takt

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use iaxc_core::{IaxcError, Result};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::engine::EngineInner;

/// Abstand zwischen zwei Takten
pub(crate) const TAKT: Duration = Duration::from_millis(5);

pub(crate) struct ServiceThread {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl ServiceThread {
    pub(crate) fn starten(inner: Arc<Mutex<EngineInner>>) -> Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = std::thread::Builder::new()
            .name("iaxc-service".to_string())
            .spawn(move || {
                debug!("Dienst-Thread gestartet");
                loop {
                    match stop_rx.recv_timeout(TAKT) {
                        Err(RecvTimeoutError::Timeout) => {
                            inner.lock().process_calls(Instant::now());
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("Dienst-Thread beendet");
            })
            .map_err(|e| IaxcError::Konfiguration(format!("Dienst-Thread: {e}")))?;

        Ok(Self {
            stop_tx,
            handle: Some(handle),
        })
    }

    /// Beendet den Thread und wartet auf ihn
    pub(crate) fn stoppen(mut self) {
        self.beenden();
    }

    fn beenden(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Dienst-Thread mit Panic beendet");
            }
        }
    }
}

impl Drop for ServiceThread {
    fn drop(&mut self) {
        self.beenden();
    }
}

//! Ereigniszustellung an die Anwendung
//!
//! Die Engine legt Ereignisse unter ihrer Sperre in einen Kanal. Ein
//! eigener Thread (`iaxc-events`) leert den Kanal in Reihenfolge und ruft
//! den Callback ausserhalb jeder Engine-Sperre auf. Ein Callback darf
//! die Engine daher wieder aufrufen.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use iaxc_core::{IaxcError, IaxcEvent};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

/// Callback der Anwendung
pub type EventCallback = Box<dyn FnMut(IaxcEvent) + Send>;

/// Hoechstens so lange wird auf die Zustellung gewartet
const ABGLEICH_TIMEOUT: Duration = Duration::from_secs(2);

enum Nachricht {
    Ereignis(IaxcEvent),
    /// Bestaetigt, dass alle vorher eingereihten Ereignisse zugestellt sind
    Abgleich(Sender<()>),
    Ende,
}

#[derive(Default)]
struct CallbackSlot {
    callback: Option<EventCallback>,
    /// Zaehlt jede Neubelegung, damit ein laufender Aufruf einen
    /// inzwischen ersetzten Callback nicht zurueckschreibt
    generation: u64,
}

/// Sendeseite, lebt in der Engine
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<Nachricht>,
}

impl EventSender {
    pub fn senden(&self, event: IaxcEvent) {
        if self.tx.send(Nachricht::Ereignis(event)).is_err() {
            trace!("Ereignis-Dispatcher beendet, Ereignis verworfen");
        }
    }
}

/// Zustell-Thread mit austauschbarem Callback
pub struct EventDispatcher {
    tx: Sender<Nachricht>,
    slot: Arc<Mutex<CallbackSlot>>,
    thread: Option<JoinHandle<()>>,
}

impl EventDispatcher {
    pub fn starten() -> Result<(Self, EventSender), IaxcError> {
        let (tx, rx) = unbounded::<Nachricht>();
        let slot = Arc::new(Mutex::new(CallbackSlot::default()));

        let slot_thread = Arc::clone(&slot);
        let thread = std::thread::Builder::new()
            .name("iaxc-events".to_string())
            .spawn(move || dispatcher_loop(rx, slot_thread))
            .map_err(|e| IaxcError::Konfiguration(format!("Ereignis-Thread: {e}")))?;

        debug!("Ereignis-Dispatcher gestartet");
        Ok((
            Self {
                tx: tx.clone(),
                slot,
                thread: Some(thread),
            },
            EventSender { tx },
        ))
    }

    /// Setzt oder entfernt den Callback
    pub fn set_callback(&self, callback: Option<EventCallback>) {
        let mut slot = self.slot.lock();
        slot.callback = callback;
        slot.generation = slot.generation.wrapping_add(1);
    }

    /// Wartet, bis alle bisher eingereihten Ereignisse zugestellt sind
    pub fn abgleichen(&self) {
        let (ack_tx, ack_rx) = bounded(1);
        if self.tx.send(Nachricht::Abgleich(ack_tx)).is_err() {
            return;
        }
        if ack_rx.recv_timeout(ABGLEICH_TIMEOUT).is_err() {
            warn!("Ereignis-Dispatcher antwortet nicht");
        }
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        let _ = self.tx.send(Nachricht::Ende);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Ereignis-Thread mit Panic beendet");
            }
        }
    }
}

fn dispatcher_loop(rx: Receiver<Nachricht>, slot: Arc<Mutex<CallbackSlot>>) {
    for nachricht in rx.iter() {
        match nachricht {
            Nachricht::Ereignis(event) => zustellen(&slot, event),
            Nachricht::Abgleich(ack) => {
                let _ = ack.send(());
            }
            Nachricht::Ende => break,
        }
    }
    debug!("Ereignis-Dispatcher beendet");
}

fn zustellen(slot: &Mutex<CallbackSlot>, event: IaxcEvent) {
    let (callback, generation) = {
        let mut slot = slot.lock();
        (slot.callback.take(), slot.generation)
    };
    match callback {
        Some(mut callback) => {
            callback(event);
            let mut slot = slot.lock();
            if slot.generation == generation && slot.callback.is_none() {
                slot.callback = Some(callback);
            }
        }
        None => debug!(?event, "Ereignis ohne Callback"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iaxc_core::TextKind;

    fn text(n: usize) -> IaxcEvent {
        IaxcEvent::text(TextKind::Status, format!("Nachricht {n}"))
    }

    #[test]
    fn reihenfolge_bleibt_erhalten() {
        let (dispatcher, sender) = EventDispatcher::starten().unwrap();
        let empfangen = Arc::new(Mutex::new(Vec::new()));
        let ziel = Arc::clone(&empfangen);
        dispatcher.set_callback(Some(Box::new(move |e| ziel.lock().push(e))));

        for n in 0..50 {
            sender.senden(text(n));
        }
        dispatcher.abgleichen();

        let empfangen = empfangen.lock();
        assert_eq!(empfangen.len(), 50);
        assert_eq!(empfangen[0], text(0));
        assert_eq!(empfangen[49], text(49));
    }

    #[test]
    fn ohne_callback_wird_nur_geloggt() {
        let (dispatcher, sender) = EventDispatcher::starten().unwrap();
        sender.senden(text(1));
        dispatcher.abgleichen();

        let empfangen = Arc::new(Mutex::new(Vec::new()));
        let ziel = Arc::clone(&empfangen);
        dispatcher.set_callback(Some(Box::new(move |e| ziel.lock().push(e))));
        sender.senden(text(2));
        dispatcher.abgleichen();
        assert_eq!(*empfangen.lock(), vec![text(2)]);
    }

    #[test]
    fn callback_entfernen() {
        let (dispatcher, sender) = EventDispatcher::starten().unwrap();
        let zaehler = Arc::new(Mutex::new(0));
        let ziel = Arc::clone(&zaehler);
        dispatcher.set_callback(Some(Box::new(move |_| *ziel.lock() += 1)));
        sender.senden(text(1));
        dispatcher.abgleichen();
        dispatcher.set_callback(None);
        sender.senden(text(2));
        dispatcher.abgleichen();
        assert_eq!(*zaehler.lock(), 1);
    }

    #[test]
    fn senden_nach_ende_ist_harmlos() {
        let (dispatcher, sender) = EventDispatcher::starten().unwrap();
        drop(dispatcher);
        sender.senden(text(1));
    }
}

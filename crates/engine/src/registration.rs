//! Registrierungs-Leases bei einem Server
//!
//! Eine Registrierung wird kurz vor Ablauf mit einer frischen Sitzung
//! erneuert; Antworten des Servers kommen ueber die Registrierungs-Sitzung
//! und beenden sie.

use std::time::{Duration, Instant};

use iaxc_core::RegistrationId;
use iaxc_protocol::{RegistrationRequest, SessionId};

/// Vorlauf, mit dem ein Lease vor Ablauf erneuert wird
pub const ERNEUERUNG_VORLAUF: Duration = Duration::from_secs(3);

/// Eine stehende Registrierung
#[derive(Debug, Clone)]
pub struct Registration {
    pub id: RegistrationId,
    pub host: String,
    pub user: String,
    pub(crate) pass: String,
    /// Lease-Dauer in Sekunden
    pub refresh: u32,
    pub(crate) letzte: Instant,
    pub(crate) session: Option<SessionId>,
}

impl Registration {
    pub(crate) fn anfrage(&self) -> RegistrationRequest {
        RegistrationRequest {
            host: self.host.clone(),
            user: self.user.clone(),
            pass: self.pass.clone(),
            refresh: self.refresh,
        }
    }

    /// `true` wenn das Lease in weniger als drei Sekunden ablaeuft
    pub fn faellig(&self, now: Instant) -> bool {
        let frist = Duration::from_secs(u64::from(self.refresh)).saturating_sub(ERNEUERUNG_VORLAUF);
        now.saturating_duration_since(self.letzte) > frist
    }

    pub fn session(&self) -> Option<SessionId> {
        self.session
    }
}

/// Liste aller Registrierungen
#[derive(Debug, Default)]
pub struct Registrations {
    eintraege: Vec<Registration>,
    letzte_id: u32,
}

impl Registrations {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn hinzufuegen(
        &mut self,
        user: &str,
        pass: &str,
        host: &str,
        refresh: u32,
        session: SessionId,
        now: Instant,
    ) -> RegistrationId {
        self.letzte_id += 1;
        let id = RegistrationId(self.letzte_id);
        self.eintraege.push(Registration {
            id,
            host: host.to_string(),
            user: user.to_string(),
            pass: pass.to_string(),
            refresh,
            letzte: now,
            session: Some(session),
        });
        id
    }

    /// Entfernt die Registrierung, gibt die Anzahl entfernter Eintraege
    /// und deren noch offene Sitzungen zurueck
    pub(crate) fn entfernen(&mut self, id: RegistrationId) -> (usize, Vec<SessionId>) {
        let vorher = self.eintraege.len();
        let mut sitzungen = Vec::new();
        self.eintraege.retain(|r| {
            if r.id == id {
                sitzungen.extend(r.session);
                false
            } else {
                true
            }
        });
        (vorher - self.eintraege.len(), sitzungen)
    }

    pub fn get(&self, id: RegistrationId) -> Option<&Registration> {
        self.eintraege.iter().find(|r| r.id == id)
    }

    pub(crate) fn find_by_session(&mut self, session: SessionId) -> Option<&mut Registration> {
        self.eintraege
            .iter_mut()
            .find(|r| r.session == Some(session))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Registration> {
        self.eintraege.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.eintraege.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eintraege.is_empty()
    }
}

//! Anrufzustand als orthogonale Felder
//!
//! Ein Anruf hat einen Lebenszyklus, eine Richtung und zwei unabhaengige
//! Markierungen (ausgewaehlt, in Weitervermittlung). Fuer Anwendungen, die
//! die klassische Bitmaske erwarten, liefert [`CallState::bits`] sie zurueck.

use serde::{Deserialize, Serialize};

/// Lebenszyklus eines Anruf-Slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Lifecycle {
    /// Slot unbenutzt
    #[default]
    Free,
    /// Aufgebaut, aber weder klingelnd noch beantwortet
    Active,
    /// Es klingelt (eingehend: lokal, ausgehend: beim Gegenueber)
    Ringing,
    /// Beantwortet, Audio fliesst
    Complete,
    /// Gegenstelle ist besetzt
    Busy,
}

/// Richtung eines Anrufs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Incoming,
    Outgoing,
}

/// Vollstaendiger Zustand eines Anruf-Slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CallState {
    pub lifecycle: Lifecycle,
    pub direction: Direction,
    pub is_selected: bool,
    pub in_transfer: bool,
}

impl CallState {
    pub const BIT_ACTIVE: u32 = 1 << 1;
    pub const BIT_OUTGOING: u32 = 1 << 2;
    pub const BIT_RINGING: u32 = 1 << 3;
    pub const BIT_COMPLETE: u32 = 1 << 4;
    pub const BIT_SELECTED: u32 = 1 << 5;
    pub const BIT_BUSY: u32 = 1 << 6;
    pub const BIT_TRANSFER: u32 = 1 << 7;

    /// Freier, nicht ausgewaehlter Slot
    pub fn frei() -> Self {
        Self::default()
    }

    pub fn is_free(&self) -> bool {
        self.lifecycle == Lifecycle::Free
    }

    /// Jeder belegte Slot gilt als aktiv (entspricht dem ACTIVE-Bit)
    pub fn is_active(&self) -> bool {
        !self.is_free()
    }

    pub fn is_outgoing(&self) -> bool {
        self.is_active() && self.direction == Direction::Outgoing
    }

    pub fn is_ringing(&self) -> bool {
        self.lifecycle == Lifecycle::Ringing
    }

    pub fn is_complete(&self) -> bool {
        self.lifecycle == Lifecycle::Complete
    }

    pub fn is_busy(&self) -> bool {
        self.lifecycle == Lifecycle::Busy
    }

    /// Klassische Bitmaske (FREE = 0)
    pub fn bits(&self) -> u32 {
        if self.is_free() {
            return if self.is_selected { Self::BIT_SELECTED } else { 0 };
        }
        let mut bits = Self::BIT_ACTIVE;
        if self.direction == Direction::Outgoing {
            bits |= Self::BIT_OUTGOING;
        }
        bits |= match self.lifecycle {
            Lifecycle::Ringing => Self::BIT_RINGING,
            Lifecycle::Complete => Self::BIT_COMPLETE,
            Lifecycle::Busy => Self::BIT_BUSY,
            Lifecycle::Active | Lifecycle::Free => 0,
        };
        if self.is_selected {
            bits |= Self::BIT_SELECTED;
        }
        if self.in_transfer {
            bits |= Self::BIT_TRANSFER;
        }
        bits
    }
}

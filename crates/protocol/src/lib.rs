//! iaxc-protocol – Schnittstelle zum Signalisierungs-Transport
//!
//! Die Engine spricht nie direkt mit einem Socket. Sie arbeitet gegen das
//! [`Transport`]-Trait, das Sitzungen verwaltet, Protokollbefehle sendet und
//! eingehende [`ProtocolEvent`]s liefert. Dazu kommen der Frame-Slicer fuer
//! uebergrosse (Video-)Frames und ein In-Memory-Transport fuer Tests.

pub mod error;
pub mod memory;
pub mod slice;
pub mod transport;

pub use error::{ProtocolError, ProtocolResult};
pub use memory::{Command, MemoryTransport, MemoryTransportHandle};
pub use slice::{FrameAssembler, FrameSlicer, SliceHeader, MAX_FRAME_SIZE};
pub use transport::{
    CallSetup, ConnectInfo, EventKind, NetStatsReport, ProtocolEvent, RegistrationRequest,
    SessionId, Transport,
};

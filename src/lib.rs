pub mod accumulator;
pub mod codec;
pub mod error;
pub mod events;
pub mod frame;
pub mod mock;
pub mod openconnect;
pub mod physics;
pub mod protocol;
pub mod reconnect;
pub mod router;
pub mod session;
pub mod settings;
pub mod usb;

pub use accumulator::{ShotAccumulator, ShotOutcome, ValidatedShot};
pub use error::ProtocolError;
pub use events::{BridgeEvent, EventKind, Transport, TransportState};
pub use frame::{MessageSplitter, SplitterItem};
pub use openconnect::{SimClient, SimulatorError};
pub use physics::{Conditions, FlightEngine, ShotResult, Surface};
pub use protocol::{Message, ShotFrame, StatusFrame};
pub use reconnect::{BackoffPolicy, CancelToken, ReconnectStatus};
pub use router::{Router, RouterMode, ShotSink};
pub use session::Session;
pub use settings::Settings;
pub use usb::{ChunkSource, UsbSession};

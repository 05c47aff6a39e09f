//! Voice sessions and the gateway packets that drive them.

pub mod session;
pub mod voice;

pub use session::{Player, PlayerEvent, PlayerState};
pub use voice::{GatewayCommand, VoicePacket, VoiceServerUpdate, VoiceStateUpdate};

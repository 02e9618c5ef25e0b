pub mod client;
pub mod frame;
pub mod remote_audio;
pub mod server;
pub mod ui;

pub use client::UiClient;
pub use frame::{AudioOp, AudioReply, Frame};
pub use remote_audio::{AudioBridge, RemoteAudioHost};
pub use server::{ClientHub, TransportServer};
pub use ui::{UiNotifier, UiWindowHost};

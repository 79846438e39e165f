//! Instrument driver and its typed state.

pub mod keysight;
pub mod settings;
pub mod waveform;

pub use keysight::KeysightScope;
pub use settings::{
    ChannelConfig, ChannelId, ChannelSettings, EdgeCoupling, EdgeReject, EdgeSlope, EdgeSource,
    EdgeTriggerConfig, EdgeTriggerSettings, TimebaseConfig, TimebaseSettings, TriggerSettings,
};
pub use waveform::{ByteOrder, CaptureConfig, PointsMode, Preamble, Waveform, WaveformFormat};

//! The voice resolver and timestamped-audio synthesis model (spec §4.G,
//! §4.I).

pub mod resolver;
pub mod timestamps;

pub use resolver::{StaticVoiceMap, VoiceResolver};
pub use timestamps::synthesize_alignment;

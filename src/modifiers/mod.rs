//! Stock modifiers: playback pacing, volume, filtering, metering, toggling.

mod low_pass;
mod metering;
mod sync_play;
mod switchable;
mod volume;

pub use low_pass::LowPassFilterModifier;
pub use metering::{MeteringHandle, MeteringModifier};
pub use sync_play::{SyncPlayHandle, SyncPlayModifier};
pub use switchable::{SwitchHandle, SwitchableModifier};
pub use volume::{VolumeHandle, VolumeModifier};

//! Player configuration: a typed struct with a `Default` impl and setters
//! rather than a string-keyed options bag.

use crate::voice::VolumeModel;

/// How many times the global loop plays before falling through.
/// `0` means loop forever.
pub type LoopCount = u32;

/// Everything a [`crate::player::Player`] needs at construction time
/// beyond the score bytes and the host's [`crate::voice::Opl3Interface`].
#[derive(Clone, Debug)]
pub struct PlayerConfig {
    pub volume_model: VolumeModel,
    pub loop_enabled: bool,
    pub loop_count: LoopCount,
    pub tempo_multiplier: f64,
    pub sample_rate: u32,
    pub frame_size: usize,
    /// Lets CC74 (brightness) sweep the whole 0..127 filter range instead
    /// of only ever brightening (the GM-compatible half) past the default.
    pub full_range_brightness: bool,
    /// HMI scores retrigger a sounding note as a volume update instead of
    /// a fresh NoteOn; set this when the source format is known to be HMI.
    pub retrigger_as_aftertouch: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            volume_model: VolumeModel::Generic,
            loop_enabled: false,
            loop_count: 0,
            tempo_multiplier: 1.0,
            sample_rate: 49_716,
            frame_size: 512,
            full_range_brightness: false,
            retrigger_as_aftertouch: false,
        }
    }
}

impl PlayerConfig {
    pub fn with_volume_model(mut self, volume_model: VolumeModel) -> Self {
        self.volume_model = volume_model;
        self
    }

    pub fn with_loop(mut self, enabled: bool, count: LoopCount) -> Self {
        self.loop_enabled = enabled;
        self.loop_count = count;
        self
    }

    pub fn with_tempo_multiplier(mut self, multiplier: f64) -> Self {
        self.tempo_multiplier = multiplier;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_full_range_brightness(mut self, enabled: bool) -> Self {
        self.full_range_brightness = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_loop_count_is_infinite() {
        assert_eq!(PlayerConfig::default().loop_count, 0);
    }

    #[test]
    fn builder_methods_chain() {
        let config = PlayerConfig::default().with_loop(true, 3).with_tempo_multiplier(1.5);
        assert!(config.loop_enabled);
        assert_eq!(config.loop_count, 3);
        assert_eq!(config.tempo_multiplier, 1.5);
    }
}

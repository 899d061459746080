use pathtracer_shared::PathTracerConfig;

/// Runtime settings chosen when a renderer is constructed.
///
/// `bounces` and `debug` select the trace pipeline and cannot change afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub bounces: u32,
    pub debug: bool,
    /// Elements folded by one reduction thread.
    pub reduce_block_size: u32,
    pub power_preference: wgpu::PowerPreference,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            bounces: PathTracerConfig::DEFAULT_BOUNCES,
            debug: false,
            reduce_block_size: PathTracerConfig::REDUCE_BLOCK_SIZE,
            power_preference: wgpu::PowerPreference::HighPerformance,
        }
    }
}

impl RenderConfig {
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width.max(1);
        self.height = height.max(1);
        self
    }

    pub fn with_bounces(mut self, bounces: u32) -> Self {
        self.bounces = bounces;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_reduce_block_size(mut self, block_size: u32) -> Self {
        self.reduce_block_size = block_size.max(2);
        self
    }

    pub fn with_power_preference(mut self, power_preference: wgpu::PowerPreference) -> Self {
        self.power_preference = power_preference;
        self
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_builder_clamps() {
        let config = RenderConfig::default()
            .with_size(0, 32)
            .with_reduce_block_size(1)
            .with_bounces(5)
            .with_debug(true);
        assert_eq!((config.width, config.height), (1, 32));
        assert_eq!(config.reduce_block_size, 2);
        assert_eq!(config.bounces, 5);
        assert!(config.debug);
        assert_eq!(config.pixel_count(), 32);
    }
}

use crate::coords::Extent;
use crate::target::InternalFormat;

/// Render context configuration.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Initial window size; window-sized targets are allocated at this size.
    pub window_size: Extent,

    /// Create the `"default"` target at construction.
    pub create_default_target: bool,

    pub default_color_format: InternalFormat,

    /// `None` leaves the default target without depth.
    pub default_depth_format: Option<InternalFormat>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            window_size: Extent::new(640, 480),
            create_default_target: true,
            default_color_format: InternalFormat::Rgba8,
            default_depth_format: Some(InternalFormat::Depth24),
        }
    }
}

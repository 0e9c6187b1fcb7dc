use std::path::PathBuf;

/// Number of shadow-casting lights. Shader interfaces and uniform block
/// layouts are sized against this, so it is a compile-time constant.
pub const LIGHT_COUNT: usize = 3;

/// Startup settings for the deferred renderer. Attachments are sized once
/// from these values; there is no dynamic resize path.
#[derive(Debug, Clone)]
pub struct RendererSettings {
    pub width: u32,
    pub height: u32,
    /// Square shadow map resolution per light.
    pub shadow_map_dim: u32,
    /// Show the G-buffer attachments in corner quads and shrink the
    /// composited view.
    pub debug_display: bool,
    /// Apply the screen-space ambient occlusion term in composition.
    pub enable_ssao: bool,
    /// Ambient factor baked into the composition shader.
    pub ambient_factor: f32,
    /// Pin the first light to the camera position.
    pub attach_light: bool,
    /// Directory holding the compiled SPIR-V shaders.
    pub shader_dir: PathBuf,
    pub enable_validation: bool,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            shadow_map_dim: 2048,
            debug_display: false,
            enable_ssao: true,
            ambient_factor: 0.15,
            attach_light: false,
            shader_dir: PathBuf::from("shaders"),
            enable_validation: cfg!(debug_assertions),
        }
    }
}

/// Near/far planes shared by the shadow projections and the depth unpack in
/// composition.
pub const Z_NEAR: f32 = 1.0;
pub const Z_FAR: f32 = 200.0;

/// Depth bias applied while rendering the shadow maps.
pub const DEPTH_BIAS_CONSTANT: f32 = 1.25;
pub const DEPTH_BIAS_SLOPE: f32 = 1.75;

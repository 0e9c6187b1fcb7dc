//! Deferred shading renderer: per-light shadow depth passes feed an MRT
//! geometry pass whose attachments are resolved by a full-screen composition
//! pass, chained on the GPU timeline by a strictly linear semaphore chain.

pub mod config;
pub mod lights;
pub mod meshes;
pub mod passes;
pub mod pipelines;
pub mod registry;
pub mod renderer;
pub mod scene;
pub mod scheduler;
pub mod shader;
pub mod targets;
pub mod uniforms;

pub use config::RendererSettings;
pub use renderer::{Camera, DeferredRenderer, SceneAssets, SkyAssets};

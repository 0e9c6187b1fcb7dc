use crate::registry::ResourceMap;
use crate::scene::import::{AssetError, GpuTexture, ImportedMaterial, TextureSource};

/// File-name keyed texture cache. The first request for a file goes through
/// the source; every later request for the same name reuses the handle.
#[derive(Default)]
pub struct TextureCache {
    map: ResourceMap<GpuTexture>,
}

impl TextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_or_get(
        &mut self,
        file_name: &str,
        source: &mut dyn TextureSource,
    ) -> Result<GpuTexture, AssetError> {
        if self.map.present(file_name) {
            return Ok(self.map.get(file_name));
        }
        let texture = source.load(file_name)?;
        self.map.insert(file_name, texture);
        Ok(texture)
    }

    pub fn get(&self, file_name: &str) -> GpuTexture {
        self.map.get(file_name)
    }

    pub fn present(&self, file_name: &str) -> bool {
        self.map.present(file_name)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Releases every cached texture. Call once, before the device goes away.
    pub fn destroy_all(&mut self, device: &ash::Device) {
        for texture in self.map.values() {
            texture.destroy(device);
        }
        self.map = ResourceMap::new();
    }
}

/// Stand-in textures for unassigned material channels, one per channel so
/// the shaders read sensible neutral values.
#[derive(Debug, Clone, Copy)]
pub struct DummyTextures {
    pub diffuse: GpuTexture,
    pub roughness: GpuTexture,
    pub bump: GpuTexture,
    pub metallic: GpuTexture,
}

impl DummyTextures {
    pub const DIFFUSE_FILE: &'static str = "dummy_diffuse.ktx";
    pub const ROUGHNESS_FILE: &'static str = "dummy_specular.ktx";
    pub const BUMP_FILE: &'static str = "dummy_ddn.ktx";
    pub const METALLIC_FILE: &'static str = "dielectric_metallic.ktx";

    pub fn load(
        cache: &mut TextureCache,
        source: &mut dyn TextureSource,
    ) -> Result<Self, AssetError> {
        Ok(Self {
            diffuse: cache.load_or_get(Self::DIFFUSE_FILE, source)?,
            roughness: cache.load_or_get(Self::ROUGHNESS_FILE, source)?,
            bump: cache.load_or_get(Self::BUMP_FILE, source)?,
            metallic: cache.load_or_get(Self::METALLIC_FILE, source)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MaterialFlags {
    pub has_alpha: bool,
    pub has_bump: bool,
    pub has_roughness: bool,
    pub has_metalness: bool,
}

/// A material with every channel resolved to a live texture handle.
#[derive(Debug, Clone)]
pub struct SceneMaterial {
    pub name: String,
    pub diffuse: GpuTexture,
    pub roughness: GpuTexture,
    pub bump: GpuTexture,
    pub metallic: GpuTexture,
    pub flags: MaterialFlags,
    pub pipeline: &'static str,
}

/// Resolves imported materials against the texture cache. A channel that is
/// unassigned or fails to load falls back to its dummy; the handle is never
/// null.
pub fn resolve_materials(
    imported: &[ImportedMaterial],
    cache: &mut TextureCache,
    source: &mut dyn TextureSource,
    dummies: &DummyTextures,
) -> Vec<SceneMaterial> {
    imported
        .iter()
        .map(|material| {
            let mut load = |file: &Option<String>, fallback: GpuTexture| match file {
                Some(name) => match cache.load_or_get(name, source) {
                    Ok(texture) => (texture, true),
                    Err(e) => {
                        log::warn!("Material '{}': {}, using fallback", material.name, e);
                        (fallback, false)
                    }
                },
                None => (fallback, false),
            };

            let (diffuse, _) = load(&material.diffuse, dummies.diffuse);
            let (roughness, has_roughness) = load(&material.roughness, dummies.roughness);
            let (bump, has_bump) = load(&material.bump, dummies.bump);
            let (metallic, has_metalness) = load(&material.metallic, dummies.metallic);

            let flags = MaterialFlags {
                has_alpha: material.opacity_mask,
                has_bump,
                has_roughness,
                has_metalness,
            };

            SceneMaterial {
                name: material.name.clone(),
                diffuse,
                roughness,
                bump,
                metallic,
                flags,
                pipeline: if flags.has_alpha {
                    "scene.blend"
                } else {
                    "scene.solid"
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::{self, Handle};
    use std::collections::HashMap;

    /// Hands out one distinct handle per file name and counts loads.
    #[derive(Default)]
    struct CountingSource {
        loads: HashMap<String, usize>,
        next: u64,
    }

    impl TextureSource for CountingSource {
        fn load(&mut self, file_name: &str) -> Result<GpuTexture, AssetError> {
            *self.loads.entry(file_name.to_owned()).or_insert(0) += 1;
            self.next += 1;
            Ok(GpuTexture {
                image: vk::Image::from_raw(self.next),
                ..Default::default()
            })
        }
    }

    /// Refuses every load.
    struct FailingSource;

    impl TextureSource for FailingSource {
        fn load(&mut self, file_name: &str) -> Result<GpuTexture, AssetError> {
            Err(AssetError::TextureLoadFailed {
                name: file_name.to_owned(),
                reason: "missing".to_owned(),
            })
        }
    }

    fn dummies(source: &mut CountingSource, cache: &mut TextureCache) -> DummyTextures {
        DummyTextures::load(cache, source).unwrap()
    }

    #[test]
    fn same_file_loads_once_and_shares_the_handle() {
        let mut source = CountingSource::default();
        let mut cache = TextureCache::new();
        let dummies = dummies(&mut source, &mut cache);

        let materials = [
            ImportedMaterial {
                name: "floor".into(),
                diffuse: Some("stone.ktx".into()),
                ..Default::default()
            },
            ImportedMaterial {
                name: "wall".into(),
                diffuse: Some("stone.ktx".into()),
                ..Default::default()
            },
        ];
        let resolved = resolve_materials(&materials, &mut cache, &mut source, &dummies);

        assert_eq!(source.loads["stone.ktx"], 1);
        assert_eq!(resolved[0].diffuse, resolved[1].diffuse);
        assert_ne!(resolved[0].diffuse, dummies.diffuse);
    }

    #[test]
    fn unassigned_channels_resolve_to_dummies() {
        let mut source = CountingSource::default();
        let mut cache = TextureCache::new();
        let dummies = dummies(&mut source, &mut cache);

        let materials = [ImportedMaterial {
            name: "plain".into(),
            diffuse: Some("plain.ktx".into()),
            ..Default::default()
        }];
        let resolved = resolve_materials(&materials, &mut cache, &mut source, &dummies);

        let m = &resolved[0];
        assert_eq!(m.roughness, dummies.roughness);
        assert_eq!(m.bump, dummies.bump);
        assert_eq!(m.metallic, dummies.metallic);
        assert!(!m.flags.has_bump);
        assert!(!m.flags.has_roughness);
        assert!(!m.flags.has_metalness);
    }

    #[test]
    fn failed_load_falls_back_instead_of_erroring() {
        let mut count_source = CountingSource::default();
        let mut cache = TextureCache::new();
        let dummies = dummies(&mut count_source, &mut cache);

        let materials = [ImportedMaterial {
            name: "broken".into(),
            diffuse: Some("gone.ktx".into()),
            bump: Some("gone_n.ktx".into()),
            ..Default::default()
        }];
        let resolved =
            resolve_materials(&materials, &mut cache, &mut FailingSource, &dummies);

        assert_eq!(resolved[0].diffuse, dummies.diffuse);
        assert_eq!(resolved[0].bump, dummies.bump);
        assert!(!resolved[0].flags.has_bump);
    }

    #[test]
    fn alpha_materials_take_the_blend_pipeline() {
        let mut source = CountingSource::default();
        let mut cache = TextureCache::new();
        let dummies = dummies(&mut source, &mut cache);

        let materials = [
            ImportedMaterial {
                name: "leaf".into(),
                opacity_mask: true,
                ..Default::default()
            },
            ImportedMaterial {
                name: "brick".into(),
                ..Default::default()
            },
        ];
        let resolved = resolve_materials(&materials, &mut cache, &mut source, &dummies);
        assert_eq!(resolved[0].pipeline, "scene.blend");
        assert_eq!(resolved[1].pipeline, "scene.solid");
    }
}

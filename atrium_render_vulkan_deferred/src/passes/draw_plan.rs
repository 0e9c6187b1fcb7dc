use ash::vk;

use crate::scene::store::Submesh;

/// Which traversal of the submesh list a draw list is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    /// Depth-only; alpha-masked geometry casts no shadow here.
    Shadow,
    GeometryOpaque,
    GeometryBlend,
}

/// One indexed draw against the global buffers, resolved once at record
/// time so the per-frame path touches no material state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawOp {
    pub index_base: u32,
    pub index_count: u32,
    pub descriptor_set: vk::DescriptorSet,
}

pub fn build_draw_list(kind: PassKind, submeshes: &[Submesh]) -> Vec<DrawOp> {
    submeshes
        .iter()
        .filter(|submesh| match kind {
            PassKind::Shadow | PassKind::GeometryOpaque => !submesh.flags.has_alpha,
            PassKind::GeometryBlend => submesh.flags.has_alpha,
        })
        .map(|submesh| DrawOp {
            index_base: submesh.index_base,
            index_count: submesh.index_count,
            descriptor_set: submesh.descriptor_set,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::material::MaterialFlags;

    fn submesh(index_base: u32, index_count: u32, has_alpha: bool) -> Submesh {
        Submesh {
            index_base,
            index_count,
            flags: MaterialFlags {
                has_alpha,
                ..Default::default()
            },
            descriptor_set: vk::DescriptorSet::null(),
        }
    }

    #[test]
    fn shadow_list_skips_alpha_submeshes() {
        let submeshes = [submesh(0, 30, false), submesh(30, 12, true)];
        let list = build_draw_list(PassKind::Shadow, &submeshes);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].index_base, 0);
        assert_eq!(list[0].index_count, 30);
    }

    #[test]
    fn geometry_splits_into_opaque_and_blend() {
        let submeshes = [
            submesh(0, 30, false),
            submesh(30, 12, true),
            submesh(42, 9, false),
        ];
        let opaque = build_draw_list(PassKind::GeometryOpaque, &submeshes);
        let blend = build_draw_list(PassKind::GeometryBlend, &submeshes);
        assert_eq!(opaque.len(), 2);
        assert_eq!(blend.len(), 1);
        assert_eq!(blend[0].index_base, 30);
        // Together they cover every submesh exactly once.
        assert_eq!(opaque.len() + blend.len(), submeshes.len());
    }

    #[test]
    fn frame_plan_for_two_submeshes_and_three_lights() {
        let _ = env_logger::builder().is_test(true).try_init();
        let submeshes = [submesh(0, 30, false), submesh(30, 12, true)];

        // One depth draw of the opaque submesh per shadow submission.
        let chain = crate::scheduler::submission_chain(crate::config::LIGHT_COUNT);
        let shadow_submits = chain.len() - 2;
        let shadow_draws: usize = (0..shadow_submits)
            .map(|_| build_draw_list(PassKind::Shadow, &submeshes).len())
            .sum();
        assert_eq!(shadow_draws, 3);

        assert_eq!(build_draw_list(PassKind::GeometryOpaque, &submeshes).len(), 1);
        assert_eq!(build_draw_list(PassKind::GeometryBlend, &submeshes).len(), 1);

        // Composition is always one full-screen quad draw; debug display
        // draws the whole quad mesh on top of it.
        let (_, quad_indices) = crate::meshes::generate_screen_quads();
        assert_eq!(quad_indices.len(), 24);
        assert_eq!(crate::meshes::FULL_SCREEN_INDEX_COUNT, 6);
    }

    #[test]
    fn empty_scene_builds_empty_lists() {
        for kind in [
            PassKind::Shadow,
            PassKind::GeometryOpaque,
            PassKind::GeometryBlend,
        ] {
            assert!(build_draw_list(kind, &[]).is_empty());
        }
    }
}

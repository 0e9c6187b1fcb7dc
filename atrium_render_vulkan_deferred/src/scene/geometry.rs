use bytemuck::{Pod, Zeroable};

use crate::scene::import::ImportedMesh;

/// Vertex layout shared by every pass. The importer's coordinate system is
/// Y-up opposite ours, so position and normal Y flip on merge.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SceneVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
    pub color: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
}

impl SceneVertex {
    pub const STRIDE: u32 = std::mem::size_of::<SceneVertex>() as u32;
}

/// Index range of one submesh inside the merged buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmeshRange {
    pub index_base: u32,
    pub index_count: u32,
    pub material: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MergedGeometry {
    pub vertices: Vec<SceneVertex>,
    pub indices: Vec<u32>,
    pub ranges: Vec<SubmeshRange>,
}

/// Appends every mesh into one global vertex/index pair. Indices are
/// rebased onto the running vertex count so a single buffer bind serves all
/// submeshes; each submesh keeps only its `{index_base, index_count}` window.
pub fn merge_submeshes(meshes: &[ImportedMesh]) -> MergedGeometry {
    let mut merged = MergedGeometry::default();

    for mesh in meshes {
        let vertex_base = merged.vertices.len() as u32;
        let index_base = merged.indices.len() as u32;

        for (i, &position) in mesh.positions.iter().enumerate() {
            let uv = mesh.uvs.get(i).copied().unwrap_or([0.0, 0.0]);
            let color = mesh.colors.get(i).copied().unwrap_or([1.0, 1.0, 1.0]);
            let normal = mesh.normals.get(i).copied().unwrap_or([0.0, 1.0, 0.0]);
            let tangent = mesh.tangents.get(i).copied().unwrap_or([0.0, 1.0, 0.0]);

            merged.vertices.push(SceneVertex {
                position: [position[0], -position[1], position[2]],
                uv,
                color,
                normal: [normal[0], -normal[1], normal[2]],
                tangent,
            });
        }

        merged
            .indices
            .extend(mesh.indices.iter().map(|&i| vertex_base + i));

        merged.ranges.push(SubmeshRange {
            index_base,
            index_count: mesh.indices.len() as u32,
            material: mesh.material,
        });
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tri(material: usize) -> ImportedMesh {
        ImportedMesh {
            positions: vec![[0.0, 1.0, 0.0], [1.0, 2.0, 0.0], [0.0, 3.0, 1.0]],
            normals: vec![[0.0, 1.0, 0.0]; 3],
            indices: vec![0, 1, 2],
            material,
            ..Default::default()
        }
    }

    #[test]
    fn ranges_stay_inside_merged_buffers() {
        let meshes = [tri(0), tri(1), tri(0)];
        let merged = merge_submeshes(&meshes);

        assert_eq!(merged.vertices.len(), 9);
        assert_eq!(merged.indices.len(), 9);
        assert_eq!(merged.ranges.len(), 3);

        let total = merged.indices.len() as u32;
        for range in &merged.ranges {
            assert!(range.index_base + range.index_count <= total);
        }
        assert_eq!(merged.ranges[1].index_base, 3);
        assert_eq!(merged.ranges[2].index_base, 6);
    }

    #[test]
    fn indices_are_rebased_and_in_bounds() {
        let merged = merge_submeshes(&[tri(0), tri(0)]);
        let vertex_count = merged.vertices.len() as u32;
        assert!(merged.indices.iter().all(|&i| i < vertex_count));
        // Second mesh reuses local indices 0..2 but lands after the first.
        assert_eq!(&merged.indices[3..], &[3, 4, 5]);
    }

    #[test]
    fn y_axis_flips_on_position_and_normal() {
        let merged = merge_submeshes(&[tri(0)]);
        assert_eq!(merged.vertices[0].position, [0.0, -1.0, 0.0]);
        assert_eq!(merged.vertices[0].normal, [0.0, -1.0, 0.0]);
    }

    #[test]
    fn missing_attributes_fall_back_to_defaults() {
        let mesh = ImportedMesh {
            positions: vec![[1.0, 1.0, 1.0]],
            indices: vec![0],
            ..Default::default()
        };
        let merged = merge_submeshes(&[mesh]);
        let v = merged.vertices[0];
        assert_eq!(v.uv, [0.0, 0.0]);
        assert_eq!(v.color, [1.0, 1.0, 1.0]);
        assert_eq!(v.tangent, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn vertex_stride_matches_attribute_layout() {
        // 3 + 2 + 3 + 3 + 3 floats
        assert_eq!(SceneVertex::STRIDE, 14 * 4);
    }
}

//! OBJ mesh loading.
//!
//! Meshes are parsed with `tobj` (triangulated, 0-based indices) and then
//! de-indexed: every face corner becomes its own [`MeshVertex`] and the index
//! list is simply `0..vertex_count`. Nothing is deduplicated. The flattened
//! arrays are copied into the asset arena before they are uploaded to the GPU.

use std::{
  io::BufRead,
  path::{Path, PathBuf},
};

use bytemuck::{Pod, Zeroable};
use log::debug;
use vulkano::pipeline::graphics::vertex_input::Vertex;

use crate::{
  error::MeshError,
  memory::{ArenaAllocation, MemoryArena, PersistentMemory},
};

/// Interleaved vertex layout of every loaded mesh.
#[derive(Vertex, Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct MeshVertex {
  #[format(R32G32B32_SFLOAT)]
  pub position:  [f32; 3],
  #[format(R32G32_SFLOAT)]
  pub tex_coord: [f32; 2],
  #[format(R32G32B32_SFLOAT)]
  pub normal:    [f32; 3],
}

/// Position-only vertex used by the skybox cube.
#[derive(Vertex, Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct SkyboxVertex {
  #[format(R32G32B32_SFLOAT)]
  pub position: [f32; 3],
}

/// A flattened mesh before it is stored anywhere.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MeshData {
  pub vertices: Vec<MeshVertex>,
  pub indices:  Vec<u32>,
}

/// A mesh whose vertex and index data live in the asset arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mesh {
  pub vertices:     ArenaAllocation,
  pub indices:      ArenaAllocation,
  pub vertex_count: u32,
  pub index_count:  u32,
}

fn load_options() -> tobj::LoadOptions {
  tobj::LoadOptions {
    triangulate: true,
    ..Default::default()
  }
}

impl MeshData {
  /// Loads and flattens an OBJ file. Material libraries are ignored.
  pub fn load(path: &Path) -> Result<Self, MeshError> {
    let (models, _materials) = tobj::load_obj(path, &load_options()).map_err(|source| {
      MeshError::Load {
        path: path.to_path_buf(),
        source,
      }
    })?;

    let mesh = Self::flatten(&models, path)?;
    debug!(
      "loaded '{}': {} models, {} vertices",
      path.display(),
      models.len(),
      mesh.vertices.len()
    );
    Ok(mesh)
  }

  /// Parses OBJ text from any reader; `origin` only labels errors.
  pub fn parse<R: BufRead>(reader: &mut R, origin: &Path) -> Result<Self, MeshError> {
    let (models, _materials) =
      tobj::load_obj_buf(reader, &load_options(), |_| Err(tobj::LoadError::OpenFileFailed))
        .map_err(|source| MeshError::Load {
          path: origin.to_path_buf(),
          source,
        })?;

    Self::flatten(&models, origin)
  }

  fn flatten(models: &[tobj::Model], path: &Path) -> Result<Self, MeshError> {
    let mut vertices = Vec::new();

    for model in models {
      let mesh = &model.mesh;

      for (corner, &position_index) in mesh.indices.iter().enumerate() {
        let position = fetch::<3>(&mesh.positions, position_index, "position", path)?;

        let tex_coord = match mesh.texcoord_indices.get(corner) {
          Some(&index) => {
            let [u, v] = fetch::<2>(&mesh.texcoords, index, "texcoord", path)?;
            [u, 1.0 - v]
          }
          None => [0.0; 2],
        };

        let normal = match mesh.normal_indices.get(corner) {
          Some(&index) => fetch::<3>(&mesh.normals, index, "normal", path)?,
          None => [0.0; 3],
        };

        vertices.push(MeshVertex {
          position,
          tex_coord,
          normal,
        });
      }
    }

    let indices = (0..vertices.len() as u32).collect();
    Ok(Self { vertices, indices })
  }

  /// Copies vertices and indices into `arena`.
  pub fn store(
    &self,
    memory: &mut PersistentMemory,
    arena: &mut MemoryArena,
  ) -> Result<Mesh, MeshError> {
    let vertices = memory.write_slice(arena, &self.vertices)?;
    let indices = memory.write_slice(arena, &self.indices)?;

    Ok(Mesh {
      vertices,
      indices,
      vertex_count: self.vertices.len() as u32,
      index_count: self.indices.len() as u32,
    })
  }
}

impl Mesh {
  pub fn vertices(&self, memory: &PersistentMemory) -> Vec<MeshVertex> {
    memory.read_slice(self.vertices)
  }

  pub fn indices(&self, memory: &PersistentMemory) -> Vec<u32> {
    memory.read_slice(self.indices)
  }
}

fn fetch<const N: usize>(
  data: &[f32],
  index: u32,
  attribute: &'static str,
  path: &Path,
) -> Result<[f32; N], MeshError> {
  let start = index as usize * N;
  data
    .get(start..start + N)
    .and_then(|slice| slice.try_into().ok())
    .ok_or_else(|| MeshError::IndexOutOfRange {
      path: PathBuf::from(path),
      attribute,
      index,
      available: data.len() / N,
    })
}

#[rustfmt::skip]
const SKYBOX_CUBE: [[f32; 3]; 36] = [
  [-1.0,  1.0, -1.0], [-1.0, -1.0, -1.0], [ 1.0, -1.0, -1.0],
  [ 1.0, -1.0, -1.0], [ 1.0,  1.0, -1.0], [-1.0,  1.0, -1.0],

  [-1.0, -1.0,  1.0], [-1.0, -1.0, -1.0], [-1.0,  1.0, -1.0],
  [-1.0,  1.0, -1.0], [-1.0,  1.0,  1.0], [-1.0, -1.0,  1.0],

  [ 1.0, -1.0, -1.0], [ 1.0, -1.0,  1.0], [ 1.0,  1.0,  1.0],
  [ 1.0,  1.0,  1.0], [ 1.0,  1.0, -1.0], [ 1.0, -1.0, -1.0],

  [-1.0, -1.0,  1.0], [-1.0,  1.0,  1.0], [ 1.0,  1.0,  1.0],
  [ 1.0,  1.0,  1.0], [ 1.0, -1.0,  1.0], [-1.0, -1.0,  1.0],

  [-1.0,  1.0, -1.0], [ 1.0,  1.0, -1.0], [ 1.0,  1.0,  1.0],
  [ 1.0,  1.0,  1.0], [-1.0,  1.0,  1.0], [-1.0,  1.0, -1.0],

  [-1.0, -1.0, -1.0], [-1.0, -1.0,  1.0], [ 1.0, -1.0, -1.0],
  [ 1.0, -1.0, -1.0], [-1.0, -1.0,  1.0], [ 1.0, -1.0,  1.0],
];

/// The 36 corners of a unit cube, drawn inside-out around the camera.
pub fn skybox_cube() -> Vec<SkyboxVertex> {
  SKYBOX_CUBE
    .iter()
    .map(|&position| SkyboxVertex { position })
    .collect()
}

#[cfg(test)]
mod tests {
  use std::io::Cursor;

  use super::*;

  const TRIANGLE: &str = "\
# one textured triangle
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 0.0 1.0 0.0
vt 0.0 0.0
vt 1.0 0.0
vt 0.0 1.0
vn 0.0 0.0 1.0
f 1/1/1 2/2/1 3/3/1
";

  fn parse(text: &str) -> Result<MeshData, MeshError> {
    MeshData::parse(&mut Cursor::new(text), Path::new("test.obj"))
  }

  #[test]
  fn textured_triangle_flattens_in_order() {
    let mesh = parse(TRIANGLE).unwrap();

    assert_eq!(mesh.indices, vec![0, 1, 2]);
    assert_eq!(mesh.vertices.len(), 3);
    assert_eq!(mesh.vertices[1].position, [1.0, 0.0, 0.0]);
    // V is flipped for a top-left texture origin.
    assert_eq!(mesh.vertices[2].tex_coord, [0.0, 0.0]);
    assert_eq!(mesh.vertices[0].tex_coord, [0.0, 1.0]);
    assert!(mesh.vertices.iter().all(|v| v.normal == [0.0, 0.0, 1.0]));
  }

  #[test]
  fn shared_corners_are_not_deduplicated() {
    let quad = "\
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
f 1 2 3
f 1 3 4
";
    let mesh = parse(quad).unwrap();
    assert_eq!(mesh.vertices.len(), 6);
    assert_eq!(mesh.indices, (0..6).collect::<Vec<u32>>());
    assert_eq!(mesh.vertices[0].position, mesh.vertices[3].position);
    // No texcoords or normals in the file.
    assert!(mesh.vertices.iter().all(|v| v.tex_coord == [0.0; 2] && v.normal == [0.0; 3]));
  }

  #[test]
  fn quads_are_triangulated() {
    let quad = "\
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
f 1 2 3 4
";
    let mesh = parse(quad).unwrap();
    assert_eq!(mesh.vertices.len(), 6);
  }

  #[test]
  fn negative_indices_are_relative() {
    let relative = "\
v 0 0 0
v 1 0 0
v 0 1 0
f -3 -2 -1
";
    let mesh = parse(relative).unwrap();
    assert_eq!(mesh.vertices[0].position, [0.0, 0.0, 0.0]);
    assert_eq!(mesh.vertices[2].position, [0.0, 1.0, 0.0]);
  }

  #[test]
  fn malformed_lines_are_errors() {
    assert!(matches!(parse("v 1.0 nope 2.0\n"), Err(MeshError::Load { .. })));
    assert!(parse("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 9\n").is_err());
  }

  #[test]
  fn stored_mesh_round_trips_through_arena() {
    let mesh = parse(TRIANGLE).unwrap();
    let mut memory = PersistentMemory::new(4096);
    let mut assets = memory.permanent().sub_arena(1024).unwrap();

    let stored = mesh.store(&mut memory, &mut assets).unwrap();
    assert_eq!(stored.vertex_count, 3);
    assert_eq!(stored.index_count, 3);
    assert_eq!(stored.vertices.len, 3 * std::mem::size_of::<MeshVertex>());
    assert_eq!(stored.indices.offset, stored.vertices.range().end);
    assert_eq!(stored.vertices(&memory), mesh.vertices);
    assert_eq!(stored.indices(&memory), mesh.indices);
  }

  #[test]
  fn store_fails_when_assets_are_full() {
    let mesh = parse(TRIANGLE).unwrap();
    let mut memory = PersistentMemory::new(64);
    let mut assets = memory.permanent().sub_arena(64).unwrap();
    assert!(matches!(mesh.store(&mut memory, &mut assets), Err(MeshError::Arena(_))));
  }

  #[test]
  fn skybox_cube_has_twelve_triangles() {
    let cube = skybox_cube();
    assert_eq!(cube.len(), 36);
    assert!(cube.iter().all(|v| v.position.iter().all(|c| c.abs() == 1.0)));
  }

  #[test]
  fn shipped_cube_loads() {
    let cube = MeshData::load(Path::new("assets/cube.obj")).unwrap();
    assert_eq!(cube.vertices.len(), 36);
    assert_eq!(cube.indices, (0..36).collect::<Vec<u32>>());
    assert!(cube.vertices.iter().all(|v| {
      let [x, y, z] = v.normal;
      (x * x + y * y + z * z - 1.0).abs() < 1e-6
    }));
  }
}

//! GLSL shaders, compiled to SPIR-V at build time by `vulkano_shaders`.
//!
//! The mesh shaders share one uniform block, `Data`, at set 0 binding 0:
//! world, view and projection matrices, the camera position, and the material
//! factors (`albedo_factor`, then `material` = metalness, roughness, maximum
//! prefilter LOD, normal map flag). Bindings 1-4 are the material maps and
//! 5-7 the image-based lighting inputs.

/// Mesh vertex shader: world transform and normal matrix.
pub mod mesh_vs {
  vulkano_shaders::shader! {
    ty: "vertex",
    path: "src/shaders/mesh.vert",
  }
}

/// Mesh fragment shader: metalness/roughness PBR lit by the environment.
pub mod mesh_fs {
  vulkano_shaders::shader! {
    ty: "fragment",
    path: "src/shaders/mesh.frag",
  }
}

pub mod sky_vs {
  vulkano_shaders::shader! {
    ty: "vertex",
    path: "src/shaders/sky.vert",
  }
}

pub mod sky_fs {
  vulkano_shaders::shader! {
    ty: "fragment",
    path: "src/shaders/sky.frag",
  }
}

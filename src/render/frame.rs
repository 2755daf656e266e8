use std::sync::Arc;

use vulkano::{
  buffer::Subbuffer,
  command_buffer::{
    AutoCommandBufferBuilder,
    RenderPassBeginInfo,
    SecondaryAutoCommandBuffer,
    SubpassBeginInfo,
    SubpassContents,
    SubpassEndInfo,
  },
  descriptor_set::DescriptorSet,
  pipeline::{Pipeline, PipelineBindPoint},
  render_pass::Framebuffer,
};

use super::{GpuMesh, pipeline::Pipelines};
use crate::{
  error::{GpuResultExt, RenderError},
  mesh::SkyboxVertex,
};

/// Everything one frame records, with descriptor sets already written.
pub(crate) struct FrameCommands<'a> {
  pub framebuffer: Arc<Framebuffer>,
  pub clear_color: [f32; 4],
  pub pipelines:   &'a Pipelines,
  pub meshes:      Vec<(Arc<DescriptorSet>, &'a GpuMesh)>,
  pub sky:         (Arc<DescriptorSet>, Subbuffer<[SkyboxVertex]>),
  pub overlay:     Arc<SecondaryAutoCommandBuffer>,
}

pub(crate) trait AutoCommandBufferBuilderExt<L> {
  fn record_frame(&mut self, commands: FrameCommands) -> Result<(), RenderError>;
}

impl<L> AutoCommandBufferBuilderExt<L> for AutoCommandBufferBuilder<L> {
  fn record_frame(&mut self, commands: FrameCommands) -> Result<(), RenderError> {
    self
      .begin_render_pass(
        RenderPassBeginInfo {
          clear_values: vec![
            Some(commands.clear_color.into()),
            None,
            Some(1.0.into()),
          ],
          ..RenderPassBeginInfo::framebuffer(commands.framebuffer)
        },
        SubpassBeginInfo {
          contents: SubpassContents::Inline,
          ..Default::default()
        },
      )
      .gpu("beginning the render pass")?;

    let mesh_pipeline = &commands.pipelines.mesh;
    self
      .bind_pipeline_graphics(mesh_pipeline.clone())
      .gpu("binding the mesh pipeline")?;

    for (descriptor_set, mesh) in commands.meshes {
      self
        .bind_descriptor_sets(
          PipelineBindPoint::Graphics,
          mesh_pipeline.layout().clone(),
          0,
          descriptor_set,
        )
        .gpu("binding mesh descriptors")?
        .bind_vertex_buffers(0, mesh.vertices.clone())
        .gpu("binding mesh vertices")?
        .bind_index_buffer(mesh.indices.clone())
        .gpu("binding mesh indices")?;

      unsafe { self.draw_indexed(mesh.index_count, 1, 0, 0, 0) }.gpu("drawing a mesh")?;
    }

    // Last, so the depth test rejects every covered pixel.
    let (sky_descriptor_set, cube) = commands.sky;
    let sky_pipeline = &commands.pipelines.sky;
    let vertex_count = cube.len() as u32;
    self
      .bind_pipeline_graphics(sky_pipeline.clone())
      .gpu("binding the skybox pipeline")?
      .bind_descriptor_sets(
        PipelineBindPoint::Graphics,
        sky_pipeline.layout().clone(),
        0,
        sky_descriptor_set,
      )
      .gpu("binding skybox descriptors")?
      .bind_vertex_buffers(0, cube)
      .gpu("binding the skybox cube")?;

    unsafe { self.draw(vertex_count, 1, 0, 0) }.gpu("drawing the skybox")?;

    self
      .next_subpass(SubpassEndInfo::default(), SubpassBeginInfo {
        contents: SubpassContents::SecondaryCommandBuffers,
        ..Default::default()
      })
      .gpu("moving to the overlay subpass")?;

    self
      .execute_commands(commands.overlay)
      .gpu("drawing the overlay")?;

    self
      .end_render_pass(SubpassEndInfo::default())
      .gpu("ending the render pass")?;

    Ok(())
  }
}

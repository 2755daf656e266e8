//! Render pass, framebuffers and graphics pipelines.
//!
//! The render pass has two subpasses. The first renders the scene into a 4x
//! multisampled color target that resolves into the swapchain image; the second
//! draws the egui overlay straight onto the resolved image. Pipelines bake the
//! viewport in, so they are rebuilt with the framebuffers whenever the
//! swapchain changes size or the polygon mode is toggled.

use std::sync::Arc;

use vulkano::{
  Validated,
  VulkanError,
  device::{Device, DeviceOwned},
  format::Format,
  image::{Image, ImageCreateInfo, ImageType, ImageUsage, SampleCount, view::ImageView},
  memory::allocator::{AllocationCreateInfo, StandardMemoryAllocator},
  pipeline::{
    GraphicsPipeline,
    PipelineLayout,
    PipelineShaderStageCreateInfo,
    graphics::{
      GraphicsPipelineCreateInfo,
      color_blend::{
        AttachmentBlend,
        BlendFactor,
        BlendOp,
        ColorBlendAttachmentState,
        ColorBlendState,
        ColorComponents,
      },
      depth_stencil::{CompareOp, DepthState, DepthStencilState},
      input_assembly::InputAssemblyState,
      multisample::MultisampleState,
      rasterization::{CullMode, PolygonMode, RasterizationState},
      vertex_input::{Vertex, VertexDefinition, VertexInputState},
      viewport::{Viewport, ViewportState},
    },
    layout::PipelineDescriptorSetLayoutCreateInfo,
  },
  render_pass::{Framebuffer, FramebufferCreateInfo, RenderPass, Subpass},
  shader::{EntryPoint, ShaderModule},
};

use crate::{
  error::{GpuResultExt, RenderError},
  mesh::{MeshVertex, SkyboxVertex},
  shaders::{mesh_fs, mesh_vs, sky_fs, sky_vs},
};

const SAMPLES: SampleCount = SampleCount::Sample4;
const DEPTH_FORMAT: Format = Format::D32_SFLOAT;

/// Entry points of every shader the renderer uses.
#[derive(Clone)]
pub struct ShaderSet {
  pub mesh_vs: EntryPoint,
  pub mesh_fs: EntryPoint,
  pub sky_vs:  EntryPoint,
  pub sky_fs:  EntryPoint,
}

fn entry_point(
  module: Result<Arc<ShaderModule>, Validated<VulkanError>>,
  what: &'static str,
) -> Result<EntryPoint, RenderError> {
  module.gpu(what)?.entry_point("main").gpu(what)
}

impl ShaderSet {
  pub fn load(device: &Arc<Device>) -> Result<Self, RenderError> {
    Ok(Self {
      mesh_vs: entry_point(mesh_vs::load(device.clone()), "loading the mesh vertex shader")?,
      mesh_fs: entry_point(mesh_fs::load(device.clone()), "loading the mesh fragment shader")?,
      sky_vs:  entry_point(sky_vs::load(device.clone()), "loading the skybox vertex shader")?,
      sky_fs:  entry_point(sky_fs::load(device.clone()), "loading the skybox fragment shader")?,
    })
  }
}

#[derive(Clone)]
pub struct Pipelines {
  pub mesh: Arc<GraphicsPipeline>,
  pub sky:  Arc<GraphicsPipeline>,
}

pub fn create_render_pass(
  device: &Arc<Device>,
  format: Format,
) -> Result<Arc<RenderPass>, RenderError> {
  vulkano::ordered_passes_renderpass!(
    device.clone(),
    attachments: {
      msaa_color: {
        format: format,
        samples: 4,
        load_op: Clear,
        store_op: DontCare,
      },
      final_color: {
        format: format,
        samples: 1,
        load_op: DontCare,
        store_op: Store,
      },
      depth: {
        format: DEPTH_FORMAT,
        samples: 4,
        load_op: Clear,
        store_op: DontCare,
      }
    },
    passes: [
      {
        color: [msaa_color],
        color_resolve: [final_color],
        depth_stencil: {depth},
        input: []
      },
      {
        color: [final_color],
        depth_stencil: {},
        input: []
      }
    ]
  )
  .gpu("creating the render pass")
}

pub struct WindowSizeSetupConfig<'a> {
  pub images:           &'a [Arc<Image>],
  pub render_pass:      &'a Arc<RenderPass>,
  pub memory_allocator: &'a Arc<StandardMemoryAllocator>,
  pub shaders:          &'a ShaderSet,
  pub wireframe:        bool,
}

fn transient_attachment(
  allocator: &Arc<StandardMemoryAllocator>,
  format: Format,
  extent: [u32; 3],
  usage: ImageUsage,
) -> Result<Arc<ImageView>, RenderError> {
  let image = Image::new(
    allocator.clone(),
    ImageCreateInfo {
      image_type: ImageType::Dim2d,
      format,
      extent,
      usage: usage | ImageUsage::TRANSIENT_ATTACHMENT,
      samples: SAMPLES,
      ..Default::default()
    },
    AllocationCreateInfo::default(),
  )
  .gpu("allocating a multisampled attachment")?;
  ImageView::new_default(image).gpu("creating an attachment view")
}

/// Builds framebuffers and pipelines for the current swapchain images.
pub fn window_size_dependent_setup(
  config: WindowSizeSetupConfig,
) -> Result<(Vec<Arc<Framebuffer>>, Pipelines), RenderError> {
  let extent = config.images[0].extent();

  let depth_buffer = transient_attachment(
    config.memory_allocator,
    DEPTH_FORMAT,
    extent,
    ImageUsage::DEPTH_STENCIL_ATTACHMENT,
  )?;

  let framebuffers = config
    .images
    .iter()
    .map(|image| {
      let view = ImageView::new_default(image.clone()).gpu("creating a swapchain image view")?;
      let msaa_color = transient_attachment(
        config.memory_allocator,
        image.format(),
        image.extent(),
        ImageUsage::COLOR_ATTACHMENT,
      )?;

      Framebuffer::new(config.render_pass.clone(), FramebufferCreateInfo {
        attachments: vec![msaa_color, view, depth_buffer.clone()],
        ..Default::default()
      })
      .gpu("creating a framebuffer")
    })
    .collect::<Result<Vec<_>, _>>()?;

  let device = config.memory_allocator.device();
  let subpass = Subpass::from(config.render_pass.clone(), 0).gpu("looking up the scene subpass")?;
  let viewport = Viewport {
    offset:      [0.0, 0.0],
    extent:      [extent[0] as f32, extent[1] as f32],
    depth_range: 0.0..=1.0,
  };

  let mesh = build_pipeline(device, PipelineDesc {
    vertex_shader:   &config.shaders.mesh_vs,
    fragment_shader: &config.shaders.mesh_fs,
    vertex_input:    [MeshVertex::per_vertex()]
      .definition(&config.shaders.mesh_vs)
      .gpu("matching mesh vertex input")?,
    subpass:         subpass.clone(),
    viewport:        viewport.clone(),
    polygon_mode:    if config.wireframe {
      PolygonMode::Line
    } else {
      PolygonMode::Fill
    },
    depth:           DepthState::simple(),
    blend:           Some(AttachmentBlend {
      src_color_blend_factor: BlendFactor::SrcAlpha,
      dst_color_blend_factor: BlendFactor::OneMinusSrcAlpha,
      color_blend_op:         BlendOp::Add,
      src_alpha_blend_factor: BlendFactor::One,
      dst_alpha_blend_factor: BlendFactor::Zero,
      alpha_blend_op:         BlendOp::Add,
    }),
  })?;

  // Drawn after the scene at depth 1.0, so it only fills uncovered pixels.
  let sky = build_pipeline(device, PipelineDesc {
    vertex_shader:   &config.shaders.sky_vs,
    fragment_shader: &config.shaders.sky_fs,
    vertex_input:    [SkyboxVertex::per_vertex()]
      .definition(&config.shaders.sky_vs)
      .gpu("matching skybox vertex input")?,
    subpass,
    viewport,
    polygon_mode:    PolygonMode::Fill,
    depth:           DepthState {
      write_enable: false,
      compare_op:   CompareOp::LessOrEqual,
    },
    blend:           None,
  })?;

  Ok((framebuffers, Pipelines { mesh, sky }))
}

struct PipelineDesc<'a> {
  vertex_shader:   &'a EntryPoint,
  fragment_shader: &'a EntryPoint,
  vertex_input:    VertexInputState,
  subpass:         Subpass,
  viewport:        Viewport,
  polygon_mode:    PolygonMode,
  depth:           DepthState,
  blend:           Option<AttachmentBlend>,
}

fn build_pipeline(
  device: &Arc<Device>,
  desc: PipelineDesc,
) -> Result<Arc<GraphicsPipeline>, RenderError> {
  let stages = [
    PipelineShaderStageCreateInfo::new(desc.vertex_shader.clone()),
    PipelineShaderStageCreateInfo::new(desc.fragment_shader.clone()),
  ];

  let layout = PipelineLayout::new(
    device.clone(),
    PipelineDescriptorSetLayoutCreateInfo::from_stages(&stages)
      .into_pipeline_layout_create_info(device.clone())
      .gpu("deriving the pipeline layout")?,
  )
  .gpu("creating the pipeline layout")?;

  GraphicsPipeline::new(device.clone(), None, GraphicsPipelineCreateInfo {
    stages: stages.into_iter().collect(),
    vertex_input_state: Some(desc.vertex_input),
    input_assembly_state: Some(InputAssemblyState::default()),
    viewport_state: Some(ViewportState {
      viewports: [desc.viewport].into_iter().collect(),
      ..Default::default()
    }),
    rasterization_state: Some(RasterizationState {
      cull_mode: CullMode::None,
      polygon_mode: desc.polygon_mode,
      ..Default::default()
    }),
    depth_stencil_state: Some(DepthStencilState {
      depth: Some(desc.depth),
      ..Default::default()
    }),
    multisample_state: Some(MultisampleState {
      rasterization_samples: SAMPLES,
      ..Default::default()
    }),
    color_blend_state: Some(ColorBlendState::with_attachment_states(
      desc.subpass.num_color_attachments(),
      ColorBlendAttachmentState {
        blend: desc.blend,
        color_write_mask: ColorComponents::all(),
        ..Default::default()
      },
    )),
    subpass: Some(desc.subpass.into()),
    ..GraphicsPipelineCreateInfo::layout(layout)
  })
  .gpu("creating a graphics pipeline")
}

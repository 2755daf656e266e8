//! Vulkan renderer.
//!
//! [`Renderer`] owns the device, the swapchain, the pipelines and the egui
//! integration for one window. The game uploads meshes, material textures and
//! environment maps through it once, then hands it a list of [`DrawCall`]s
//! every frame.

mod frame;
mod init;
mod pipeline;
mod upload;

use std::sync::Arc;

use egui_winit_vulkano::{Gui, GuiConfig};
use glam::{Mat4, Vec3};
use log::{debug, warn};
use vulkano::{
  Validated,
  VulkanError,
  buffer::{BufferUsage, Subbuffer},
  command_buffer::{AutoCommandBufferBuilder, CommandBufferUsage},
  descriptor_set::{DescriptorSet, WriteDescriptorSet},
  image::{
    sampler::{Filter, LOD_CLAMP_NONE, Sampler, SamplerAddressMode, SamplerCreateInfo, SamplerMipmapMode},
    view::ImageView,
  },
  pipeline::Pipeline,
  render_pass::{Framebuffer, RenderPass, Subpass},
  swapchain::{Surface, Swapchain, SwapchainCreateInfo, SwapchainPresentInfo, acquire_next_image},
  sync::{self, GpuFuture},
};
use winit::{event::WindowEvent, event_loop::ActiveEventLoop, window::Window};

use self::{
  frame::{AutoCommandBufferBuilderExt, FrameCommands},
  init::{VulkanContext, create_swapchain, initialize_vulkan},
  pipeline::{Pipelines, ShaderSet, WindowSizeSetupConfig, create_render_pass, window_size_dependent_setup},
};
use crate::{
  config::RenderConfig,
  error::{GpuResultExt, RenderError},
  mesh::{MeshVertex, SkyboxVertex, skybox_cube},
  shaders::{mesh_vs, sky_vs},
};

/// Vertex and index buffers of an uploaded mesh.
#[derive(Clone)]
pub struct GpuMesh {
  pub vertices:    Subbuffer<[MeshVertex]>,
  pub indices:     Subbuffer<[u32]>,
  pub index_count: u32,
}

/// Material maps plus the factors they are multiplied by.
#[derive(Clone)]
pub struct GpuMaterial {
  pub albedo:           Arc<ImageView>,
  pub normal:           Arc<ImageView>,
  pub metalness:        Arc<ImageView>,
  pub roughness:        Arc<ImageView>,
  pub albedo_factor:    [f32; 4],
  pub metalness_factor: f32,
  pub roughness_factor: f32,
  /// The normal map is a real texture, not the flat fallback.
  pub has_normal_map:   bool,
}

/// Environment cubemaps and the BRDF table used for ambient lighting.
#[derive(Clone)]
pub struct GpuEnvironment {
  pub skybox:            Arc<ImageView>,
  pub irradiance:        Arc<ImageView>,
  pub prefiltered:       Arc<ImageView>,
  pub brdf_lut:          Arc<ImageView>,
  pub prefilter_max_lod: f32,
}

pub struct DrawCall<'a> {
  pub mesh:     &'a GpuMesh,
  pub material: &'a GpuMaterial,
  pub world:    Mat4,
}

/// Camera state for one frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameParams {
  pub view:            Mat4,
  pub projection:      Mat4,
  pub camera_position: Vec3,
}

pub struct Renderer {
  vulkan:              VulkanContext,
  window:              Arc<Window>,
  swapchain:           Arc<Swapchain>,
  render_pass:         Arc<RenderPass>,
  framebuffers:        Vec<Arc<Framebuffer>>,
  shaders:             ShaderSet,
  pipelines:           Pipelines,
  gui:                 Gui,
  skybox_cube:         Subbuffer<[SkyboxVertex]>,
  material_sampler:    Arc<Sampler>,
  environment_sampler: Arc<Sampler>,
  recreate_swapchain:  bool,
  rebuild_pipelines:   bool,
  overlay_pending:     bool,
  previous_frame_end:  Option<Box<dyn GpuFuture>>,
  wireframe:           bool,
  clear_color:         [f32; 4],
}

impl Renderer {
  /// Initializes Vulkan and everything needed to draw into `window`.
  pub fn new(
    event_loop: &ActiveEventLoop,
    window: Arc<Window>,
    config: &RenderConfig,
  ) -> Result<Self, RenderError> {
    let vulkan = initialize_vulkan(event_loop)?;
    let device = vulkan.device.clone();

    let surface =
      Surface::from_window(vulkan.instance.clone(), window.clone()).gpu("creating the window surface")?;
    let (swapchain, images) =
      create_swapchain(&device, surface.clone(), window.inner_size(), config.vsync)?;

    let render_pass = create_render_pass(&device, swapchain.image_format())?;
    let shaders = ShaderSet::load(&device)?;

    let wireframe = config.wireframe && vulkan.supports_wireframe;
    if config.wireframe && !wireframe {
      warn!("wireframe requested but the device cannot draw lines; using fill mode");
    }

    let (framebuffers, pipelines) = window_size_dependent_setup(WindowSizeSetupConfig {
      images: &images,
      render_pass: &render_pass,
      memory_allocator: &vulkan.memory_allocator,
      shaders: &shaders,
      wireframe,
    })?;

    let gui = Gui::new_with_subpass(
      event_loop,
      surface,
      vulkan.queue.clone(),
      Subpass::from(render_pass.clone(), 1).gpu("looking up the overlay subpass")?,
      swapchain.image_format(),
      GuiConfig::default(),
    );

    let material_sampler = Sampler::new(device.clone(), SamplerCreateInfo {
      mag_filter: Filter::Linear,
      min_filter: Filter::Linear,
      address_mode: [SamplerAddressMode::Repeat; 3],
      ..Default::default()
    })
    .gpu("creating the material sampler")?;

    // Needs the full LOD range for roughness-driven prefilter lookups.
    let environment_sampler = Sampler::new(device.clone(), SamplerCreateInfo {
      mag_filter: Filter::Linear,
      min_filter: Filter::Linear,
      mipmap_mode: SamplerMipmapMode::Linear,
      address_mode: [SamplerAddressMode::ClampToEdge; 3],
      lod: 0.0..=LOD_CLAMP_NONE,
      ..Default::default()
    })
    .gpu("creating the environment sampler")?;

    let skybox_cube =
      upload::buffer_from_iter(&vulkan.memory_allocator, BufferUsage::VERTEX_BUFFER, skybox_cube())?;
    let previous_frame_end = Some(sync::now(device.clone()).boxed());

    Ok(Self {
      vulkan,
      window,
      swapchain,
      render_pass,
      framebuffers,
      shaders,
      pipelines,
      gui,
      skybox_cube,
      material_sampler,
      environment_sampler,
      recreate_swapchain: false,
      rebuild_pipelines: false,
      overlay_pending: false,
      previous_frame_end,
      wireframe,
      clear_color: config.clear_color,
    })
  }

  pub fn window(&self) -> &Arc<Window> {
    &self.window
  }

  pub fn device_name(&self) -> String {
    self.vulkan.device.physical_device().properties().device_name.clone()
  }

  pub fn extent(&self) -> [u32; 2] {
    self.swapchain.image_extent()
  }

  pub fn aspect_ratio(&self) -> f64 {
    let [width, height] = self.extent();
    if height == 0 {
      1.0
    } else {
      width as f64 / height as f64
    }
  }

  pub fn supports_wireframe(&self) -> bool {
    self.vulkan.supports_wireframe
  }

  pub fn wireframe(&self) -> bool {
    self.wireframe
  }

  /// Switches the mesh pipeline's polygon mode. Ignored on devices without
  /// `fill_mode_non_solid`.
  pub fn set_wireframe(&mut self, enabled: bool) {
    let enabled = enabled && self.vulkan.supports_wireframe;
    if enabled != self.wireframe {
      self.wireframe = enabled;
      self.rebuild_pipelines = true;
    }
  }

  pub fn set_clear_color(&mut self, color: [f32; 4]) {
    self.clear_color = color;
  }

  /// Feeds a window event to egui. Returns true if egui consumed it.
  pub fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
    if let WindowEvent::Resized(_) = event {
      self.recreate_swapchain = true;
    }
    self.gui.update(event)
  }

  /// Lays out this frame's egui overlay. Call at most once per frame, before
  /// [`Renderer::draw_frame`].
  pub fn overlay(&mut self, build: impl FnOnce(&egui::Context)) {
    self.gui.immediate_ui(|gui| build(&gui.context()));
    self.overlay_pending = true;
  }

  fn rebuild_swapchain(&mut self) -> Result<(), RenderError> {
    let window_size = self.window.inner_size();
    let (swapchain, images) = self
      .swapchain
      .recreate(SwapchainCreateInfo {
        image_extent: window_size.into(),
        ..self.swapchain.create_info()
      })
      .gpu("recreating the swapchain")?;
    self.swapchain = swapchain;

    (self.framebuffers, self.pipelines) = window_size_dependent_setup(WindowSizeSetupConfig {
      images:           &images,
      render_pass:      &self.render_pass,
      memory_allocator: &self.vulkan.memory_allocator,
      shaders:          &self.shaders,
      wireframe:        self.wireframe,
    })?;

    self.recreate_swapchain = false;
    self.rebuild_pipelines = false;
    debug!("swapchain rebuilt at {}x{}", window_size.width, window_size.height);
    Ok(())
  }

  fn mesh_descriptor_set(
    &self,
    frame: &FrameParams,
    draw: &DrawCall,
    environment: &GpuEnvironment,
  ) -> Result<Arc<DescriptorSet>, RenderError> {
    let layout = self
      .pipelines
      .mesh
      .layout()
      .set_layouts()
      .first()
      .gpu("looking up the mesh descriptor layout")?;

    let material = draw.material;
    let uniforms = self
      .vulkan
      .uniform_buffer_allocator
      .allocate_sized()
      .gpu("allocating mesh uniforms")?;
    *uniforms.write().gpu("writing mesh uniforms")? = mesh_vs::Data {
      world:           draw.world.to_cols_array_2d(),
      view:            frame.view.to_cols_array_2d(),
      proj:            frame.projection.to_cols_array_2d(),
      camera_position: frame.camera_position.extend(1.0).to_array(),
      albedo_factor:   material.albedo_factor,
      material:        [
        material.metalness_factor,
        material.roughness_factor,
        environment.prefilter_max_lod,
        if material.has_normal_map { 1.0 } else { 0.0 },
      ],
    };

    let sampler = &self.material_sampler;
    let env_sampler = &self.environment_sampler;
    DescriptorSet::new(
      self.vulkan.descriptor_set_allocator.clone(),
      layout.clone(),
      [
        WriteDescriptorSet::buffer(0, uniforms),
        WriteDescriptorSet::image_view_sampler(1, material.albedo.clone(), sampler.clone()),
        WriteDescriptorSet::image_view_sampler(2, material.normal.clone(), sampler.clone()),
        WriteDescriptorSet::image_view_sampler(3, material.metalness.clone(), sampler.clone()),
        WriteDescriptorSet::image_view_sampler(4, material.roughness.clone(), sampler.clone()),
        WriteDescriptorSet::image_view_sampler(5, environment.irradiance.clone(), env_sampler.clone()),
        WriteDescriptorSet::image_view_sampler(6, environment.prefiltered.clone(), env_sampler.clone()),
        WriteDescriptorSet::image_view_sampler(7, environment.brdf_lut.clone(), env_sampler.clone()),
      ],
      [],
    )
    .gpu("writing mesh descriptors")
  }

  fn sky_descriptor_set(
    &self,
    frame: &FrameParams,
    environment: &GpuEnvironment,
  ) -> Result<Arc<DescriptorSet>, RenderError> {
    let layout = self
      .pipelines
      .sky
      .layout()
      .set_layouts()
      .first()
      .gpu("looking up the skybox descriptor layout")?;

    let uniforms = self
      .vulkan
      .uniform_buffer_allocator
      .allocate_sized()
      .gpu("allocating skybox uniforms")?;
    *uniforms.write().gpu("writing skybox uniforms")? = sky_vs::SkyData {
      view: frame.view.to_cols_array_2d(),
      proj: frame.projection.to_cols_array_2d(),
    };

    DescriptorSet::new(
      self.vulkan.descriptor_set_allocator.clone(),
      layout.clone(),
      [
        WriteDescriptorSet::buffer(0, uniforms),
        WriteDescriptorSet::image_view_sampler(
          1,
          environment.skybox.clone(),
          self.environment_sampler.clone(),
        ),
      ],
      [],
    )
    .gpu("writing skybox descriptors")
  }

  /// Draws `draws`, then the skybox, then the overlay, and presents.
  ///
  /// An out-of-date swapchain is not an error: the frame is skipped and the
  /// swapchain rebuilt on the next call. Nothing is drawn while the window is
  /// minimized.
  pub fn draw_frame(
    &mut self,
    frame: &FrameParams,
    draws: &[DrawCall],
    environment: &GpuEnvironment,
  ) -> Result<(), RenderError> {
    let window_size = self.window.inner_size();
    if window_size.width == 0 || window_size.height == 0 {
      return Ok(());
    }

    if let Some(previous_frame_end) = self.previous_frame_end.as_mut() {
      previous_frame_end.cleanup_finished();
    }

    if self.recreate_swapchain || self.rebuild_pipelines {
      self.rebuild_swapchain()?;
    }

    let meshes = draws
      .iter()
      .map(|draw| -> Result<_, RenderError> {
        Ok((self.mesh_descriptor_set(frame, draw, environment)?, draw.mesh))
      })
      .collect::<Result<Vec<_>, _>>()?;
    let sky = (self.sky_descriptor_set(frame, environment)?, self.skybox_cube.clone());

    let (image_index, suboptimal, acquire_future) =
      match acquire_next_image(self.swapchain.clone(), None).map_err(Validated::unwrap) {
        Ok(acquired) => acquired,
        Err(VulkanError::OutOfDate) => {
          self.recreate_swapchain = true;
          return Ok(());
        }
        Err(e) => return Err(e).gpu("acquiring a swapchain image"),
      };

    if suboptimal {
      self.recreate_swapchain = true;
    }

    if !self.overlay_pending {
      self.gui.immediate_ui(|_| {});
    }
    self.overlay_pending = false;
    let overlay = self.gui.draw_on_subpass_image(self.swapchain.image_extent());

    let framebuffer = self
      .framebuffers
      .get(image_index as usize)
      .cloned()
      .gpu("looking up the framebuffer")?;

    let mut builder = AutoCommandBufferBuilder::primary(
      self.vulkan.command_buffer_allocator.clone(),
      self.vulkan.queue.queue_family_index(),
      CommandBufferUsage::OneTimeSubmit,
    )
    .gpu("creating the frame command buffer")?;

    builder.record_frame(FrameCommands {
      framebuffer,
      clear_color: self.clear_color,
      pipelines: &self.pipelines,
      meshes,
      sky,
      overlay,
    })?;

    let command_buffer = builder.build().gpu("building the frame command buffer")?;

    let device = self.vulkan.device.clone();
    let queue = self.vulkan.queue.clone();
    let future = self
      .previous_frame_end
      .take()
      .unwrap_or_else(|| sync::now(device.clone()).boxed())
      .join(acquire_future)
      .then_execute(queue.clone(), command_buffer)
      .gpu("submitting the frame")?
      .then_swapchain_present(
        queue,
        SwapchainPresentInfo::swapchain_image_index(self.swapchain.clone(), image_index),
      )
      .then_signal_fence_and_flush();

    self.previous_frame_end = match future.map_err(Validated::unwrap) {
      Ok(future) => Some(future.boxed()),
      Err(VulkanError::OutOfDate) => {
        self.recreate_swapchain = true;
        Some(sync::now(device).boxed())
      }
      Err(e) => {
        warn!("failed to flush frame: {e}");
        Some(sync::now(device).boxed())
      }
    };

    Ok(())
  }
}

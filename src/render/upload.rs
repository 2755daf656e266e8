//! Staging-buffer uploads of meshes, textures, cubemaps and lookup tables.

use std::sync::Arc;

use glam::Vec2;
use image::RgbaImage;
use log::debug;
use vulkano::{
  buffer::{Buffer, BufferContents, BufferCreateInfo, BufferUsage, Subbuffer},
  command_buffer::{
    AutoCommandBufferBuilder,
    BufferImageCopy,
    CommandBufferUsage,
    CopyBufferToImageInfo,
    PrimaryAutoCommandBuffer,
    PrimaryCommandBufferAbstract,
  },
  format::Format,
  image::{
    Image,
    ImageCreateFlags,
    ImageCreateInfo,
    ImageType,
    ImageUsage,
    view::{ImageView, ImageViewCreateInfo, ImageViewType},
  },
  memory::allocator::{AllocationCreateInfo, MemoryTypeFilter, StandardMemoryAllocator},
  sync::GpuFuture,
};

use super::{GpuEnvironment, GpuMesh, Renderer};
use crate::{
  error::{GpuResultExt, RenderError},
  ibl::{Cubemap, EnvironmentMaps, FACE_COUNT},
  mesh::MeshVertex,
};

const RGBA32F_TEXEL: u64 = 16;

/// Creates a host-writable buffer filled from `data`. Staging buffers live in
/// host memory; everything else prefers device-local memory.
pub(super) fn buffer_from_iter<T, I>(
  allocator: &Arc<StandardMemoryAllocator>,
  usage: BufferUsage,
  data: I,
) -> Result<Subbuffer<[T]>, RenderError>
where
  T: BufferContents,
  I: IntoIterator<Item = T>,
  I::IntoIter: ExactSizeIterator,
{
  let memory_type_filter = if usage.intersects(BufferUsage::TRANSFER_SRC) {
    MemoryTypeFilter::PREFER_HOST | MemoryTypeFilter::HOST_SEQUENTIAL_WRITE
  } else {
    MemoryTypeFilter::PREFER_DEVICE | MemoryTypeFilter::HOST_SEQUENTIAL_WRITE
  };

  Buffer::from_iter(
    allocator.clone(),
    BufferCreateInfo {
      usage,
      ..Default::default()
    },
    AllocationCreateInfo {
      memory_type_filter,
      ..Default::default()
    },
    data,
  )
  .gpu("allocating a buffer")
}

impl Renderer {
  fn buffer_from_iter<T, I>(&self, usage: BufferUsage, data: I) -> Result<Subbuffer<[T]>, RenderError>
  where
    T: BufferContents,
    I: IntoIterator<Item = T>,
    I::IntoIter: ExactSizeIterator,
  {
    buffer_from_iter(&self.vulkan.memory_allocator, usage, data)
  }

  /// Records commands into a one-off command buffer and waits for them.
  fn submit_and_wait(
    &self,
    record: impl FnOnce(&mut AutoCommandBufferBuilder<PrimaryAutoCommandBuffer>) -> Result<(), RenderError>,
  ) -> Result<(), RenderError> {
    let mut builder = AutoCommandBufferBuilder::primary(
      self.vulkan.command_buffer_allocator.clone(),
      self.vulkan.queue.queue_family_index(),
      CommandBufferUsage::OneTimeSubmit,
    )
    .gpu("creating an upload command buffer")?;

    record(&mut builder)?;

    builder
      .build()
      .gpu("building an upload command buffer")?
      .execute(self.vulkan.queue.clone())
      .gpu("submitting an upload")?
      .then_signal_fence_and_flush()
      .gpu("flushing an upload")?
      .wait(None)
      .gpu("waiting for an upload")
  }

  /// Creates a device-local image and fills it from `staging`. When `regions`
  /// returns nothing the whole first mip level is copied.
  fn upload_image<T: BufferContents + ?Sized>(
    &self,
    create_info: ImageCreateInfo,
    staging: Subbuffer<T>,
    regions: impl FnOnce(&Arc<Image>) -> Vec<BufferImageCopy>,
  ) -> Result<Arc<Image>, RenderError> {
    let image = Image::new(
      self.vulkan.memory_allocator.clone(),
      ImageCreateInfo {
        usage: ImageUsage::TRANSFER_DST | ImageUsage::SAMPLED,
        ..create_info
      },
      AllocationCreateInfo {
        memory_type_filter: MemoryTypeFilter::PREFER_DEVICE,
        ..Default::default()
      },
    )
    .gpu("creating an image")?;

    let regions = regions(&image);
    let mut copy = CopyBufferToImageInfo::buffer_image(staging, image.clone());
    if !regions.is_empty() {
      copy.regions = regions.into();
    }

    self.submit_and_wait(|builder| {
      builder.copy_buffer_to_image(copy).gpu("recording an image copy")?;
      Ok(())
    })?;

    Ok(image)
  }

  pub fn upload_mesh(&self, vertices: &[MeshVertex], indices: &[u32]) -> Result<GpuMesh, RenderError> {
    Ok(GpuMesh {
      vertices:    self.buffer_from_iter(BufferUsage::VERTEX_BUFFER, vertices.iter().copied())?,
      indices:     self.buffer_from_iter(BufferUsage::INDEX_BUFFER, indices.iter().copied())?,
      index_count: indices.len() as u32,
    })
  }

  /// A 2D RGBA8 texture. Color maps use `srgb`; data maps (normals,
  /// metalness, roughness) must not.
  pub fn texture_rgba8(&self, image: &RgbaImage, srgb: bool) -> Result<Arc<ImageView>, RenderError> {
    let staging = self.buffer_from_iter(BufferUsage::TRANSFER_SRC, image.as_raw().iter().copied())?;
    let image = self.upload_image(
      ImageCreateInfo {
        image_type: ImageType::Dim2d,
        format: if srgb {
          Format::R8G8B8A8_SRGB
        } else {
          Format::R8G8B8A8_UNORM
        },
        extent: [image.width(), image.height(), 1],
        ..Default::default()
      },
      staging,
      |_| Vec::new(),
    )?;
    ImageView::new_default(image).gpu("creating a texture view")
  }

  /// A 1x1 texture of one color, used when a material map is missing.
  pub fn solid_texture(&self, rgba: [u8; 4], srgb: bool) -> Result<Arc<ImageView>, RenderError> {
    self.texture_rgba8(&RgbaImage::from_pixel(1, 1, image::Rgba(rgba)), srgb)
  }

  /// A float cubemap with one mip level per entry of `mips`.
  pub fn cubemap(&self, mips: &[Cubemap]) -> Result<Arc<ImageView>, RenderError> {
    let size = mips.first().map(Cubemap::size).gpu("uploading a cubemap without mips")?;
    let texels: Vec<f32> = mips.iter().flat_map(Cubemap::to_rgba_f32).collect();
    let staging = self.buffer_from_iter(BufferUsage::TRANSFER_SRC, texels)?;

    // Mips are packed back to back, each holding all six faces.
    let mip_regions = |image: &Arc<Image>| {
      let mut offset = 0;
      mips
        .iter()
        .enumerate()
        .map(|(level, mip)| {
          let mut image_subresource = image.subresource_layers();
          image_subresource.mip_level = level as u32;
          let region = BufferImageCopy {
            buffer_offset: offset,
            image_subresource,
            image_extent: [mip.size(), mip.size(), 1],
            ..Default::default()
          };
          offset += u64::from(mip.size()).pow(2) * FACE_COUNT as u64 * RGBA32F_TEXEL;
          region
        })
        .collect()
    };

    let image = self.upload_image(
      ImageCreateInfo {
        flags: ImageCreateFlags::CUBE_COMPATIBLE,
        image_type: ImageType::Dim2d,
        format: Format::R32G32B32A32_SFLOAT,
        extent: [size, size, 1],
        array_layers: FACE_COUNT as u32,
        mip_levels: mips.len() as u32,
        ..Default::default()
      },
      staging,
      mip_regions,
    )?;
    debug!("uploaded {size}px cubemap with {} mips", mips.len());

    ImageView::new(image.clone(), ImageViewCreateInfo {
      view_type: ImageViewType::Cube,
      ..ImageViewCreateInfo::from_image(&image)
    })
    .gpu("creating a cubemap view")
  }

  /// The split-sum BRDF table as an RG float texture.
  pub fn lut(&self, table: &[Vec2], size: u32) -> Result<Arc<ImageView>, RenderError> {
    let texels: Vec<f32> = table.iter().flat_map(|v| v.to_array()).collect();
    let staging = self.buffer_from_iter(BufferUsage::TRANSFER_SRC, texels)?;
    let image = self.upload_image(
      ImageCreateInfo {
        image_type: ImageType::Dim2d,
        format: Format::R32G32_SFLOAT,
        extent: [size, size, 1],
        ..Default::default()
      },
      staging,
      |_| Vec::new(),
    )?;
    ImageView::new_default(image).gpu("creating the BRDF lookup view")
  }

  pub fn upload_environment(&self, maps: &EnvironmentMaps) -> Result<GpuEnvironment, RenderError> {
    Ok(GpuEnvironment {
      skybox:            self.cubemap(std::slice::from_ref(&maps.environment))?,
      irradiance:        self.cubemap(std::slice::from_ref(&maps.irradiance))?,
      prefiltered:       self.cubemap(&maps.prefiltered)?,
      brdf_lut:          self.lut(&maps.brdf_lut, maps.lut_size)?,
      prefilter_max_lod: maps.prefiltered.len().saturating_sub(1) as f32,
    })
  }
}

use std::sync::Arc;

use log::{debug, info};
use vulkano::{
  VulkanLibrary,
  buffer::{
    BufferUsage,
    allocator::{SubbufferAllocator, SubbufferAllocatorCreateInfo},
  },
  command_buffer::allocator::StandardCommandBufferAllocator,
  descriptor_set::allocator::StandardDescriptorSetAllocator,
  device::{
    Device,
    DeviceCreateInfo,
    DeviceExtensions,
    DeviceFeatures,
    Queue,
    QueueCreateInfo,
    QueueFlags,
    physical::PhysicalDeviceType,
  },
  format::Format,
  image::{Image, ImageUsage},
  instance::{Instance, InstanceCreateFlags, InstanceCreateInfo},
  memory::allocator::{MemoryTypeFilter, StandardMemoryAllocator},
  swapchain::{CompositeAlpha, PresentMode, Surface, Swapchain, SwapchainCreateInfo},
};
use winit::{dpi::PhysicalSize, event_loop::ActiveEventLoop};

use crate::error::{GpuResultExt, RenderError};

/// Device-level objects that outlive any window.
pub struct VulkanContext {
  pub instance:                 Arc<Instance>,
  pub device:                   Arc<Device>,
  pub queue:                    Arc<Queue>,
  pub memory_allocator:         Arc<StandardMemoryAllocator>,
  pub descriptor_set_allocator: Arc<StandardDescriptorSetAllocator>,
  pub command_buffer_allocator: Arc<StandardCommandBufferAllocator>,
  pub uniform_buffer_allocator: SubbufferAllocator,
  /// `fill_mode_non_solid` is available and enabled.
  pub supports_wireframe:       bool,
}

fn device_rank(device_type: PhysicalDeviceType) -> u32 {
  match device_type {
    PhysicalDeviceType::DiscreteGpu => 0,
    PhysicalDeviceType::IntegratedGpu => 1,
    PhysicalDeviceType::VirtualGpu => 2,
    PhysicalDeviceType::Cpu => 3,
    PhysicalDeviceType::Other => 4,
    _ => 5,
  }
}

/// Creates the instance and picks the best device that can present to
/// windows of `event_loop`.
pub fn initialize_vulkan(event_loop: &ActiveEventLoop) -> Result<VulkanContext, RenderError> {
  let library = VulkanLibrary::new().gpu("loading the Vulkan library")?;
  let required_extensions =
    Surface::required_extensions(event_loop).gpu("querying surface extensions")?;
  let instance = Instance::new(library, InstanceCreateInfo {
    flags: InstanceCreateFlags::ENUMERATE_PORTABILITY,
    enabled_extensions: required_extensions,
    ..Default::default()
  })
  .gpu("creating the Vulkan instance")?;

  let device_extensions = DeviceExtensions {
    khr_swapchain: true,
    ..DeviceExtensions::empty()
  };

  let (physical_device, queue_family_index) = instance
    .enumerate_physical_devices()
    .gpu("enumerating physical devices")?
    .filter(|p| p.supported_extensions().contains(&device_extensions))
    .filter_map(|p| {
      p.queue_family_properties()
        .iter()
        .enumerate()
        .position(|(i, q)| {
          q.queue_flags.intersects(QueueFlags::GRAPHICS)
            && p.presentation_support(i as u32, event_loop).unwrap_or(false)
        })
        .map(|i| (p, i as u32))
    })
    .min_by_key(|(p, _)| device_rank(p.properties().device_type))
    .ok_or(RenderError::NoSuitableDevice)?;

  info!(
    "using device: {} ({:?})",
    physical_device.properties().device_name,
    physical_device.properties().device_type,
  );

  let supports_wireframe = physical_device.supported_features().fill_mode_non_solid;
  debug!("wireframe support: {supports_wireframe}");

  let (device, mut queues) = Device::new(physical_device.clone(), DeviceCreateInfo {
    enabled_extensions: device_extensions,
    enabled_features: DeviceFeatures {
      fill_mode_non_solid: supports_wireframe,
      ..DeviceFeatures::empty()
    },
    queue_create_infos: vec![QueueCreateInfo {
      queue_family_index,
      ..Default::default()
    }],
    ..Default::default()
  })
  .gpu("creating the logical device")?;

  let queue = queues.next().gpu("taking the graphics queue")?;

  let memory_allocator = Arc::new(StandardMemoryAllocator::new_default(device.clone()));
  let descriptor_set_allocator = Arc::new(StandardDescriptorSetAllocator::new(
    device.clone(),
    Default::default(),
  ));
  let command_buffer_allocator = Arc::new(StandardCommandBufferAllocator::new(
    device.clone(),
    Default::default(),
  ));

  let uniform_buffer_allocator =
    SubbufferAllocator::new(memory_allocator.clone(), SubbufferAllocatorCreateInfo {
      buffer_usage: BufferUsage::UNIFORM_BUFFER,
      memory_type_filter: MemoryTypeFilter::PREFER_DEVICE | MemoryTypeFilter::HOST_SEQUENTIAL_WRITE,
      ..Default::default()
    });

  Ok(VulkanContext {
    instance,
    device,
    queue,
    memory_allocator,
    descriptor_set_allocator,
    command_buffer_allocator,
    uniform_buffer_allocator,
    supports_wireframe,
  })
}

fn pick_present_mode(available: &[PresentMode], vsync: bool) -> PresentMode {
  if vsync {
    return PresentMode::Fifo;
  }
  [PresentMode::Immediate, PresentMode::Mailbox]
    .into_iter()
    .find(|mode| available.contains(mode))
    .unwrap_or(PresentMode::Fifo)
}

/// Creates a swapchain for `surface`. The shaders tonemap and gamma-encode
/// themselves, so UNORM formats are preferred over sRGB ones.
pub fn create_swapchain(
  device: &Arc<Device>,
  surface: Arc<Surface>,
  window_size: PhysicalSize<u32>,
  vsync: bool,
) -> Result<(Arc<Swapchain>, Vec<Arc<Image>>), RenderError> {
  let physical_device = device.physical_device();
  let surface_capabilities = physical_device
    .surface_capabilities(&surface, Default::default())
    .gpu("querying surface capabilities")?;

  let present_modes: Vec<PresentMode> = physical_device
    .surface_present_modes(&surface, Default::default())
    .gpu("querying present modes")?
    .into_iter()
    .collect();
  let present_mode = pick_present_mode(&present_modes, vsync);
  info!("present mode: {present_mode:?}");

  let formats = physical_device
    .surface_formats(&surface, Default::default())
    .gpu("querying surface formats")?;
  let (image_format, _) = formats
    .iter()
    .copied()
    .find(|(format, _)| {
      matches!(
        format,
        Format::B8G8R8A8_UNORM | Format::R8G8B8A8_UNORM | Format::A8B8G8R8_UNORM_PACK32
      )
    })
    .or_else(|| formats.first().copied())
    .gpu("choosing a surface format")?;
  info!("swapchain format: {image_format:?}");

  Swapchain::new(device.clone(), surface, SwapchainCreateInfo {
    min_image_count: surface_capabilities.min_image_count.max(2),
    image_format,
    image_extent: window_size.into(),
    image_usage: ImageUsage::COLOR_ATTACHMENT,
    composite_alpha: CompositeAlpha::Opaque,
    pre_transform: surface_capabilities.current_transform,
    clipped: true,
    present_mode,
    ..Default::default()
  })
  .gpu("creating the swapchain")
}

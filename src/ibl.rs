//! Image-based lighting precomputation.
//!
//! All three split-sum products are computed on the CPU once at startup and
//! uploaded as ordinary textures:
//! * an irradiance cubemap (cosine-weighted hemisphere convolution) for the
//!   diffuse term,
//! * a prefiltered radiance cubemap with one mip per roughness step, built by
//!   GGX importance sampling, for the specular term,
//! * a BRDF lookup table indexed by `(n·v, roughness)` holding the scale and
//!   bias applied to F0.
//!
//! Face order and orientation follow the Vulkan cube map convention
//! (+X, -X, +Y, -Y, +Z, -Z; `v` grows downwards in each face image).

use std::f32::consts::{FRAC_PI_2, PI, TAU};

use glam::{Vec2, Vec3, Vec4, Vec4Swizzles};
use image::Rgba32FImage;

pub const FACE_COUNT: usize = 6;

/// A cube map of linear RGBA float texels.
#[derive(Debug, Clone, PartialEq)]
pub struct Cubemap {
  size:  u32,
  faces: [Vec<Vec4>; FACE_COUNT],
}

/// Direction through `(u, v)` on `face`, with `u, v` in `[-1, 1]`.
pub fn face_direction(face: usize, u: f32, v: f32) -> Vec3 {
  let direction = match face {
    0 => Vec3::new(1.0, -v, -u),
    1 => Vec3::new(-1.0, -v, u),
    2 => Vec3::new(u, 1.0, v),
    3 => Vec3::new(u, -1.0, -v),
    4 => Vec3::new(u, -v, 1.0),
    _ => Vec3::new(-u, -v, -1.0),
  };
  direction.normalize()
}

/// Inverse of [`face_direction`]: the face a direction hits and where.
pub fn direction_to_face_uv(direction: Vec3) -> (usize, f32, f32) {
  let abs = direction.abs();
  if abs.x >= abs.y && abs.x >= abs.z {
    if direction.x > 0.0 {
      (0, -direction.z / abs.x, -direction.y / abs.x)
    } else {
      (1, direction.z / abs.x, -direction.y / abs.x)
    }
  } else if abs.y >= abs.z {
    if direction.y > 0.0 {
      (2, direction.x / abs.y, direction.z / abs.y)
    } else {
      (3, direction.x / abs.y, -direction.z / abs.y)
    }
  } else if direction.z > 0.0 {
    (4, direction.x / abs.z, -direction.y / abs.z)
  } else {
    (5, -direction.x / abs.z, -direction.y / abs.z)
  }
}

impl Cubemap {
  /// Builds a cubemap by evaluating `f` at the center of every texel.
  pub fn from_fn(size: u32, mut f: impl FnMut(Vec3) -> Vec4) -> Self {
    let faces = std::array::from_fn(|face| {
      let mut texels = Vec::with_capacity((size * size) as usize);
      for y in 0..size {
        for x in 0..size {
          texels.push(f(Self::texel_direction(face, x, y, size)));
        }
      }
      texels
    });
    Self { size, faces }
  }

  /// Wraps already decoded faces. Each face must hold `size * size` texels.
  pub fn from_faces(size: u32, faces: [Vec<Vec4>; FACE_COUNT]) -> Self {
    debug_assert!(faces.iter().all(|face| face.len() == (size * size) as usize));
    Self { size, faces }
  }

  /// Resamples an equirectangular panorama into a cubemap.
  pub fn from_equirectangular(panorama: &Rgba32FImage, size: u32) -> Self {
    Self::from_fn(size, |direction| sample_equirectangular(panorama, direction))
  }

  /// A procedural sky: blue zenith, pale horizon, dark ground.
  pub fn gradient_sky(size: u32) -> Self {
    let zenith = Vec3::new(0.15, 0.35, 0.9);
    let horizon = Vec3::new(0.85, 0.85, 0.8);
    let ground = Vec3::new(0.2, 0.18, 0.16);
    let sun_direction = Vec3::new(0.4, 0.6, -0.7).normalize();

    Self::from_fn(size, |direction| {
      let color = if direction.y >= 0.0 {
        horizon.lerp(zenith, direction.y.powf(0.5))
      } else {
        horizon.lerp(ground, (-direction.y).powf(0.35))
      };
      let sun = direction.dot(sun_direction).max(0.0).powf(256.0) * 20.0;
      (color + Vec3::splat(sun)).extend(1.0)
    })
  }

  pub fn size(&self) -> u32 {
    self.size
  }

  pub fn face(&self, face: usize) -> &[Vec4] {
    &self.faces[face]
  }

  /// Direction through the center of texel `(x, y)` of `face`.
  pub fn texel_direction(face: usize, x: u32, y: u32, size: u32) -> Vec3 {
    let u = (x as f32 + 0.5) / size as f32 * 2.0 - 1.0;
    let v = (y as f32 + 0.5) / size as f32 * 2.0 - 1.0;
    face_direction(face, u, v)
  }

  fn texel(&self, face: usize, x: i64, y: i64) -> Vec4 {
    let last = self.size as i64 - 1;
    let x = x.clamp(0, last) as usize;
    let y = y.clamp(0, last) as usize;
    self.faces[face][y * self.size as usize + x]
  }

  /// Bilinear sample along `direction`. Filtering does not cross face edges.
  pub fn sample(&self, direction: Vec3) -> Vec4 {
    let (face, u, v) = direction_to_face_uv(direction);
    let px = (u + 1.0) * 0.5 * self.size as f32 - 0.5;
    let py = (v + 1.0) * 0.5 * self.size as f32 - 0.5;
    let x0 = px.floor();
    let y0 = py.floor();
    let tx = px - x0;
    let ty = py - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let top = self.texel(face, x0, y0).lerp(self.texel(face, x0 + 1, y0), tx);
    let bottom = self.texel(face, x0, y0 + 1).lerp(self.texel(face, x0 + 1, y0 + 1), tx);
    top.lerp(bottom, ty)
  }

  /// All faces back to back as `f32` RGBA, ready for a layered upload.
  pub fn to_rgba_f32(&self) -> Vec<f32> {
    self
      .faces
      .iter()
      .flat_map(|face| face.iter().flat_map(|texel| texel.to_array()))
      .collect()
  }
}

fn sample_equirectangular(panorama: &Rgba32FImage, direction: Vec3) -> Vec4 {
  let (width, height) = panorama.dimensions();
  let u = direction.z.atan2(direction.x) / TAU + 0.5;
  let v = direction.y.clamp(-1.0, 1.0).asin() / PI + 0.5;

  let px = u * width as f32 - 0.5;
  let py = (1.0 - v) * height as f32 - 0.5;
  let x0 = px.floor();
  let y0 = py.floor();
  let tx = px - x0;
  let ty = py - y0;

  let fetch = |x: i64, y: i64| {
    let x = x.rem_euclid(width as i64) as u32;
    let y = y.clamp(0, height as i64 - 1) as u32;
    Vec4::from_array(panorama.get_pixel(x, y).0)
  };

  let (x0, y0) = (x0 as i64, y0 as i64);
  let top = fetch(x0, y0).lerp(fetch(x0 + 1, y0), tx);
  let bottom = fetch(x0, y0 + 1).lerp(fetch(x0 + 1, y0 + 1), tx);
  top.lerp(bottom, ty)
}

/// Orthonormal basis `(tangent, bitangent)` around `normal`.
fn tangent_frame(normal: Vec3) -> (Vec3, Vec3) {
  let up = if normal.y.abs() < 0.999 { Vec3::Y } else { Vec3::Z };
  let tangent = up.cross(normal).normalize();
  let bitangent = normal.cross(tangent);
  (tangent, bitangent)
}

/// Diffuse irradiance: walks the hemisphere around each texel normal in
/// `sample_delta` radian steps.
pub fn irradiance_map(source: &Cubemap, size: u32, sample_delta: f32) -> Cubemap {
  let phi_steps = (TAU / sample_delta).ceil() as u32;
  let theta_steps = (FRAC_PI_2 / sample_delta).ceil() as u32;

  Cubemap::from_fn(size, |normal| {
    let (tangent, bitangent) = tangent_frame(normal);
    let mut irradiance = Vec3::ZERO;

    for i in 0..phi_steps {
      let (sin_phi, cos_phi) = (i as f32 * sample_delta).sin_cos();
      for j in 0..theta_steps {
        let (sin_theta, cos_theta) = (j as f32 * sample_delta).sin_cos();
        let direction = sin_theta * cos_phi * tangent + sin_theta * sin_phi * bitangent + cos_theta * normal;
        irradiance += source.sample(direction).xyz() * cos_theta * sin_theta;
      }
    }

    (PI * irradiance / (phi_steps * theta_steps) as f32).extend(1.0)
  })
}

/// Specular prefiltering, one cubemap per mip level.
///
/// Mip `m` has size `size >> m` and roughness `m / (mip_levels - 1)`.
pub fn prefilter_map(source: &Cubemap, size: u32, mip_levels: u32, sample_count: u32) -> Vec<Cubemap> {
  (0..mip_levels)
    .map(|mip| {
      let mip_size = (size >> mip).max(1);
      let roughness = if mip_levels > 1 {
        mip as f32 / (mip_levels - 1) as f32
      } else {
        0.0
      };
      Cubemap::from_fn(mip_size, |normal| prefilter_texel(source, normal, roughness, sample_count))
    })
    .collect()
}

fn prefilter_texel(source: &Cubemap, normal: Vec3, roughness: f32, sample_count: u32) -> Vec4 {
  if roughness <= 0.0 || sample_count == 0 {
    return source.sample(normal);
  }

  // Split-sum approximation: view and reflection directions equal the normal.
  let view = normal;
  let mut color = Vec3::ZERO;
  let mut weight = 0.0;

  for i in 0..sample_count {
    let halfway = importance_sample_ggx(hammersley(i, sample_count), normal, roughness);
    let light = (2.0 * view.dot(halfway) * halfway - view).normalize();
    let n_dot_l = normal.dot(light);
    if n_dot_l > 0.0 {
      color += source.sample(light).xyz() * n_dot_l;
      weight += n_dot_l;
    }
  }

  if weight > 0.0 {
    (color / weight).extend(1.0)
  } else {
    source.sample(normal)
  }
}

/// Van der Corput radical inverse in base 2.
pub fn radical_inverse(bits: u32) -> f32 {
  bits.reverse_bits() as f32 * 2.328_306_4e-10
}

/// `i`-th point of an `n`-point Hammersley set on the unit square.
pub fn hammersley(i: u32, n: u32) -> Vec2 {
  Vec2::new(i as f32 / n as f32, radical_inverse(i))
}

/// GGX-distributed halfway vector around `normal` for the sample `xi`.
pub fn importance_sample_ggx(xi: Vec2, normal: Vec3, roughness: f32) -> Vec3 {
  let a = roughness * roughness;
  let phi = TAU * xi.x;
  let cos_theta = ((1.0 - xi.y) / (1.0 + (a * a - 1.0) * xi.y)).sqrt();
  let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();

  let (tangent, bitangent) = tangent_frame(normal);
  (phi.cos() * sin_theta * tangent + phi.sin() * sin_theta * bitangent + cos_theta * normal).normalize()
}

fn geometry_schlick_ggx(n_dot: f32, roughness: f32) -> f32 {
  // IBL remapping of k.
  let k = roughness * roughness / 2.0;
  n_dot / (n_dot * (1.0 - k) + k)
}

fn geometry_smith(n_dot_v: f32, n_dot_l: f32, roughness: f32) -> f32 {
  geometry_schlick_ggx(n_dot_v, roughness) * geometry_schlick_ggx(n_dot_l, roughness)
}

/// Scale and bias to F0 for one `(n·v, roughness)` pair.
pub fn integrate_brdf(n_dot_v: f32, roughness: f32, sample_count: u32) -> Vec2 {
  if sample_count == 0 {
    return Vec2::ZERO;
  }
  let view = Vec3::new((1.0 - n_dot_v * n_dot_v).max(0.0).sqrt(), 0.0, n_dot_v);
  let normal = Vec3::Z;
  let mut scale = 0.0;
  let mut bias = 0.0;

  for i in 0..sample_count {
    let halfway = importance_sample_ggx(hammersley(i, sample_count), normal, roughness);
    let light = (2.0 * view.dot(halfway) * halfway - view).normalize();

    let n_dot_l = light.z.max(0.0);
    let n_dot_h = halfway.z.max(0.0);
    let v_dot_h = view.dot(halfway).max(0.0);

    if n_dot_l > 0.0 && n_dot_h > 0.0 {
      let g = geometry_smith(n_dot_v, n_dot_l, roughness);
      let g_vis = g * v_dot_h / (n_dot_h * n_dot_v);
      let fresnel = (1.0 - v_dot_h).powi(5);
      scale += (1.0 - fresnel) * g_vis;
      bias += fresnel * g_vis;
    }
  }

  Vec2::new(scale, bias) / sample_count as f32
}

/// `size * size` table, row-major; x is n·v and y is roughness.
pub fn brdf_lut(size: u32, sample_count: u32) -> Vec<Vec2> {
  let mut table = Vec::with_capacity((size * size) as usize);
  for y in 0..size {
    let roughness = (y as f32 + 0.5) / size as f32;
    for x in 0..size {
      let n_dot_v = (x as f32 + 0.5) / size as f32;
      table.push(integrate_brdf(n_dot_v, roughness, sample_count));
    }
  }
  table
}

/// Everything the PBR shader samples for ambient light.
pub struct EnvironmentMaps {
  pub environment: Cubemap,
  pub irradiance:  Cubemap,
  pub prefiltered: Vec<Cubemap>,
  pub brdf_lut:    Vec<Vec2>,
  pub lut_size:    u32,
}

impl EnvironmentMaps {
  pub fn compute(environment: Cubemap, config: &crate::config::IblConfig) -> Self {
    let irradiance = irradiance_map(
      &environment,
      config.irradiance_size,
      config.irradiance_sample_delta,
    );
    let prefiltered = prefilter_map(
      &environment,
      config.prefilter_size,
      config.prefilter_mips,
      config.prefilter_samples,
    );
    let brdf_lut = brdf_lut(config.brdf_lut_size, config.brdf_samples);

    Self {
      environment,
      irradiance,
      prefiltered,
      brdf_lut,
      lut_size: config.brdf_lut_size,
    }
  }
}

//! Image decoding for textures and environment maps.

use std::path::{Path, PathBuf};

use glam::Vec4;
use image::{DynamicImage, Rgba32FImage, RgbaImage};
use log::debug;

use crate::{config::SkyboxSource, error::AssetError, ibl::Cubemap};

fn open(path: &Path) -> Result<DynamicImage, AssetError> {
  image::open(path).map_err(|source| AssetError::Image {
    path: path.to_path_buf(),
    source,
  })
}

/// Loads an 8-bit RGBA texture. Rows stay top-down, matching Vulkan's
/// texture origin.
pub fn load_rgba8(path: &Path) -> Result<RgbaImage, AssetError> {
  let image = open(path)?.to_rgba8();
  debug!("loaded texture '{}' ({}x{})", path.display(), image.width(), image.height());
  Ok(image)
}

pub fn srgb_to_linear(c: f32) -> f32 {
  if c <= 0.04045 {
    c / 12.92
  } else {
    ((c + 0.055) / 1.055).powf(2.4)
  }
}

/// Decodes any image to linear float RGBA.
///
/// Float formats (Radiance HDR, OpenEXR) are already linear; everything else
/// is assumed to be sRGB encoded.
pub fn to_linear_rgba32f(image: DynamicImage) -> Rgba32FImage {
  let is_float = matches!(image, DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_));
  let mut pixels = image.to_rgba32f();
  if !is_float {
    for pixel in pixels.pixels_mut() {
      for channel in &mut pixel.0[..3] {
        *channel = srgb_to_linear(*channel);
      }
    }
  }
  pixels
}

pub fn load_linear(path: &Path) -> Result<Rgba32FImage, AssetError> {
  Ok(to_linear_rgba32f(open(path)?))
}

/// Six square, equally sized faces in +X, -X, +Y, -Y, +Z, -Z order.
pub fn load_cubemap_faces(paths: &[PathBuf; 6]) -> Result<Cubemap, AssetError> {
  let mut size = None;
  let mut faces: [Vec<Vec4>; 6] = Default::default();

  for (face, path) in faces.iter_mut().zip(paths) {
    let image = load_linear(path)?;
    let (width, height) = image.dimensions();
    let expected = *size.get_or_insert(width);
    if width != expected || height != expected {
      return Err(AssetError::CubemapFace {
        path: path.clone(),
        width,
        height,
        expected,
      });
    }
    *face = image.pixels().map(|pixel| Vec4::from_array(pixel.0)).collect();
  }

  Ok(Cubemap::from_faces(size.unwrap_or(0), faces))
}

/// Builds the environment cubemap for a skybox source.
pub fn load_environment(source: &SkyboxSource, size: u32) -> Result<Cubemap, AssetError> {
  match source {
    SkyboxSource::Hdr(path) => {
      let panorama = load_linear(path)?;
      debug!("resampling '{}' into a {size}px cubemap", path.display());
      Ok(Cubemap::from_equirectangular(&panorama, size))
    }
    SkyboxSource::Faces(paths) => load_cubemap_faces(paths),
    SkyboxSource::Gradient => Ok(Cubemap::gradient_sky(size)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("epsilon-assets-{name}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
  }

  #[test]
  fn srgb_curve_endpoints() {
    assert_eq!(srgb_to_linear(0.0), 0.0);
    assert!((srgb_to_linear(1.0) - 1.0).abs() < 1e-6);
    assert!((srgb_to_linear(0.5) - 0.214).abs() < 1e-3);
  }

  #[test]
  fn ldr_images_are_linearized() {
    let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, image::Rgba([255, 128, 0, 255])));
    let linear = to_linear_rgba32f(image);
    let [r, g, b, a] = linear.get_pixel(0, 0).0;
    assert!((r - 1.0).abs() < 1e-6);
    assert!((g - 0.2158).abs() < 1e-3);
    assert_eq!(b, 0.0);
    assert_eq!(a, 1.0);
  }

  #[test]
  fn float_images_are_left_alone() {
    let image = DynamicImage::ImageRgba32F(Rgba32FImage::from_pixel(1, 1, image::Rgba([4.0, 0.5, 0.25, 1.0])));
    assert_eq!(to_linear_rgba32f(image).get_pixel(0, 0).0, [4.0, 0.5, 0.25, 1.0]);
  }

  #[test]
  fn cubemap_faces_must_match() {
    let dir = scratch_dir("faces");
    let mut paths: Vec<PathBuf> = Vec::new();
    for i in 0..6 {
      let size = if i == 4 { 2 } else { 4 };
      let path = dir.join(format!("face{i}.png"));
      RgbaImage::from_pixel(size, size, image::Rgba([10, 20, 30, 255]))
        .save(&path)
        .unwrap();
      paths.push(path);
    }
    let paths: [PathBuf; 6] = paths.try_into().unwrap();

    match load_cubemap_faces(&paths) {
      Err(AssetError::CubemapFace { width: 2, expected: 4, .. }) => {}
      other => panic!("unexpected result: {other:?}"),
    }

    RgbaImage::from_pixel(4, 4, image::Rgba([10, 20, 30, 255]))
      .save(&paths[4])
      .unwrap();
    let cubemap = load_cubemap_faces(&paths).unwrap();
    assert_eq!(cubemap.size(), 4);
    assert_eq!(cubemap.face(5).len(), 16);
  }

  #[test]
  fn missing_image_is_an_error() {
    let missing = scratch_dir("missing").join("nope.png");
    assert!(matches!(load_rgba8(&missing), Err(AssetError::Image { .. })));
  }

  #[test]
  fn gradient_needs_no_files() {
    let cubemap = load_environment(&SkyboxSource::Gradient, 4).unwrap();
    assert_eq!(cubemap.size(), 4);
  }
}

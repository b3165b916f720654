// 该文件是 Tanzhen （探针） 项目的一部分。
// src/message/image.rs - 图像消息与像素格式转换
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::str::FromStr;

use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use thiserror::Error;

use crate::message::{Header, Message};

#[derive(Error, Debug)]
pub enum ImageError {
  #[error("不支持的像素编码: {0}")]
  UnsupportedEncoding(String),
  #[error("数据长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  DataLength { expected: usize, actual: usize },
  #[error("行跨度过小: 每行至少需要 {min} 字节, 实际为 {step}")]
  StepTooSmall { min: usize, step: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
  Mono8,
  Rgb8,
  Bgr8,
  Rgba8,
  Bgra8,
}

impl Encoding {
  pub fn channels(&self) -> usize {
    match self {
      Encoding::Mono8 => 1,
      Encoding::Rgb8 | Encoding::Bgr8 => 3,
      Encoding::Rgba8 | Encoding::Bgra8 => 4,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Encoding::Mono8 => "mono8",
      Encoding::Rgb8 => "rgb8",
      Encoding::Bgr8 => "bgr8",
      Encoding::Rgba8 => "rgba8",
      Encoding::Bgra8 => "bgra8",
    }
  }
}

impl FromStr for Encoding {
  type Err = ImageError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "mono8" => Ok(Encoding::Mono8),
      "rgb8" => Ok(Encoding::Rgb8),
      "bgr8" => Ok(Encoding::Bgr8),
      "rgba8" => Ok(Encoding::Rgba8),
      "bgra8" => Ok(Encoding::Bgra8),
      other => Err(ImageError::UnsupportedEncoding(other.to_string())),
    }
  }
}

/// 原始图像消息
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Image {
  pub header: Header,
  pub height: u32,
  pub width: u32,
  pub encoding: String,
  pub is_bigendian: bool,
  /// 每行字节数
  pub step: u32,
  pub data: Vec<u8>,
}

impl Message for Image {
  const TYPE_NAME: &'static str = "sensor_msgs/msg/Image";
}

impl Image {
  /// 按给定编码从数据构造图像，行之间无填充
  pub fn with_data(
    width: u32,
    height: u32,
    encoding: Encoding,
    data: Vec<u8>,
  ) -> Result<Self, ImageError> {
    let step = width as usize * encoding.channels();
    let expected = step * height as usize;
    if data.len() != expected {
      return Err(ImageError::DataLength {
        expected,
        actual: data.len(),
      });
    }

    Ok(Image {
      header: Header::default(),
      height,
      width,
      encoding: encoding.as_str().to_string(),
      is_bigendian: false,
      step: step as u32,
      data,
    })
  }

  pub fn pixel_encoding(&self) -> Result<Encoding, ImageError> {
    self.encoding.parse()
  }

  /// 检查 `step` 与 `data` 是否与尺寸一致
  pub fn validate(&self) -> Result<Encoding, ImageError> {
    let encoding = self.pixel_encoding()?;
    let min = self.width as usize * encoding.channels();
    let step = self.step as usize;
    if step < min {
      return Err(ImageError::StepTooSmall { min, step });
    }
    let expected = step * self.height as usize;
    if self.data.len() != expected {
      return Err(ImageError::DataLength {
        expected,
        actual: self.data.len(),
      });
    }
    Ok(encoding)
  }

  pub fn from_rgb_image(image: &RgbImage, encoding: Encoding) -> Result<Self, ImageError> {
    let (width, height) = image.dimensions();
    let data = match encoding {
      Encoding::Rgb8 => image.as_raw().clone(),
      Encoding::Bgr8 => {
        let mut data = Vec::with_capacity(image.as_raw().len());
        for pixel in image.pixels() {
          data.extend_from_slice(&[pixel[2], pixel[1], pixel[0]]);
        }
        data
      }
      Encoding::Rgba8 | Encoding::Bgra8 => {
        let swap = encoding == Encoding::Bgra8;
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for pixel in image.pixels() {
          if swap {
            data.extend_from_slice(&[pixel[2], pixel[1], pixel[0], u8::MAX]);
          } else {
            data.extend_from_slice(&[pixel[0], pixel[1], pixel[2], u8::MAX]);
          }
        }
        data
      }
      Encoding::Mono8 => DynamicImage::ImageRgb8(image.clone()).to_luma8().into_raw(),
    };
    Image::with_data(width, height, encoding, data)
  }

  pub fn from_gray_image(image: &GrayImage) -> Self {
    let (width, height) = image.dimensions();
    Image {
      header: Header::default(),
      height,
      width,
      encoding: Encoding::Mono8.as_str().to_string(),
      is_bigendian: false,
      step: width,
      data: image.as_raw().clone(),
    }
  }

  /// 去掉行填充后的紧凑像素数据
  fn packed(&self, channels: usize) -> Vec<u8> {
    let row = self.width as usize * channels;
    let step = self.step as usize;
    if row == step {
      return self.data.clone();
    }
    let mut data = Vec::with_capacity(row * self.height as usize);
    for line in self.data.chunks(step).take(self.height as usize) {
      data.extend_from_slice(&line[..row]);
    }
    data
  }

  pub fn to_gray_image(&self) -> Result<GrayImage, ImageError> {
    let encoding = self.validate()?;
    let data = self.packed(encoding.channels());
    let expected = data.len();
    let mismatch = || ImageError::DataLength {
      expected,
      actual: self.data.len(),
    };

    let gray = match encoding {
      Encoding::Mono8 => GrayImage::from_raw(self.width, self.height, data).ok_or_else(mismatch)?,
      Encoding::Rgb8 => {
        let rgb = RgbImage::from_raw(self.width, self.height, data).ok_or_else(mismatch)?;
        DynamicImage::ImageRgb8(rgb).to_luma8()
      }
      Encoding::Bgr8 => {
        let mut data = data;
        for pixel in data.chunks_exact_mut(3) {
          pixel.swap(0, 2);
        }
        let rgb = RgbImage::from_raw(self.width, self.height, data).ok_or_else(mismatch)?;
        DynamicImage::ImageRgb8(rgb).to_luma8()
      }
      Encoding::Rgba8 | Encoding::Bgra8 => {
        let mut data = data;
        if encoding == Encoding::Bgra8 {
          for pixel in data.chunks_exact_mut(4) {
            pixel.swap(0, 2);
          }
        }
        let rgba = RgbaImage::from_raw(self.width, self.height, data).ok_or_else(mismatch)?;
        DynamicImage::ImageRgba8(rgba).to_luma8()
      }
    };
    Ok(gray)
  }

  /// 转换为 mono8 编码，保留消息头
  pub fn to_mono8(&self) -> Result<Image, ImageError> {
    let gray = self.to_gray_image()?;
    let mut image = Image::from_gray_image(&gray);
    image.header = self.header.clone();
    Ok(image)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn checker() -> RgbImage {
    RgbImage::from_fn(4, 2, |x, _| {
      if x % 2 == 0 {
        image::Rgb([255, 0, 0])
      } else {
        image::Rgb([0, 0, 255])
      }
    })
  }

  #[test]
  fn bgr8_swaps_channel_order() {
    let image = Image::from_rgb_image(&checker(), Encoding::Bgr8).unwrap();
    assert_eq!(image.encoding, "bgr8");
    assert_eq!(image.step, 12);
    assert_eq!(&image.data[..6], &[0, 0, 255, 255, 0, 0]);
  }

  #[test]
  fn mono8_conversion_matches_across_color_orders() {
    let rgb = Image::from_rgb_image(&checker(), Encoding::Rgb8).unwrap();
    let bgr = Image::from_rgb_image(&checker(), Encoding::Bgr8).unwrap();
    let bgra = Image::from_rgb_image(&checker(), Encoding::Bgra8).unwrap();

    let a = rgb.to_mono8().unwrap();
    let b = bgr.to_mono8().unwrap();
    let c = bgra.to_mono8().unwrap();
    assert_eq!(a.encoding, "mono8");
    assert_eq!(a.step, 4);
    assert_eq!(a.data, b.data);
    assert_eq!(c.data.len(), a.data.len());
    // 红色比蓝色更亮
    assert!(a.data[0] > a.data[1]);
  }

  #[test]
  fn padded_rows_are_packed_before_conversion() {
    let mut data = Vec::new();
    for row in [[10u8, 20], [30, 40]] {
      data.extend_from_slice(&row);
      data.extend_from_slice(&[0, 0]);
    }
    let image = Image {
      height: 2,
      width: 2,
      encoding: "mono8".to_string(),
      step: 4,
      data,
      ..Default::default()
    };
    let gray = image.to_gray_image().unwrap();
    assert_eq!(gray.into_raw(), vec![10, 20, 30, 40]);
  }

  #[test]
  fn rejects_unknown_encoding_and_short_data() {
    let image = Image {
      height: 1,
      width: 1,
      encoding: "yuv422".to_string(),
      step: 2,
      data: vec![0, 0],
      ..Default::default()
    };
    assert!(matches!(
      image.to_mono8(),
      Err(ImageError::UnsupportedEncoding(_))
    ));

    assert!(matches!(
      Image::with_data(2, 2, Encoding::Rgb8, vec![0; 3]),
      Err(ImageError::DataLength {
        expected: 12,
        actual: 3
      })
    ));
  }
}

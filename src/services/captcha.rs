// src/services/captcha.rs

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use rand::Rng;
use uuid::Uuid;

use crate::common::error::AppError;
use crate::kv::KvStore;
use crate::models::security::CaptchaResponse;

const KEY_PREFIX: &str = "captcha:";
const WIDTH: u32 = 130;
const HEIGHT: u32 = 48;
const CODE_LENGTH: usize = 4;
const SCALE: u32 = 4;

// No 0/O, 1/I.
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

// 5x7 bitmaps, one row per byte, most significant of the low 5 bits on the left.
const GLYPHS: [(u8, [u8; 7]); 32] = [
    (b'A', [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11]),
    (b'B', [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E]),
    (b'C', [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E]),
    (b'D', [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E]),
    (b'E', [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F]),
    (b'F', [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10]),
    (b'G', [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F]),
    (b'H', [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11]),
    (b'J', [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C]),
    (b'K', [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11]),
    (b'L', [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F]),
    (b'M', [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11]),
    (b'N', [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11]),
    (b'P', [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10]),
    (b'Q', [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D]),
    (b'R', [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11]),
    (b'S', [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E]),
    (b'T', [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04]),
    (b'U', [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E]),
    (b'V', [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04]),
    (b'W', [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A]),
    (b'X', [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11]),
    (b'Y', [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04]),
    (b'Z', [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F]),
    (b'2', [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F]),
    (b'3', [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E]),
    (b'4', [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02]),
    (b'5', [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E]),
    (b'6', [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E]),
    (b'7', [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08]),
    (b'8', [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E]),
    (b'9', [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C]),
];

/// Image captchas whose answers live in the key-value store.
#[derive(Clone)]
pub struct CaptchaService {
    store: Arc<dyn KvStore>,
    ttl: Duration,
}

impl CaptchaService {
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub async fn generate(&self) -> Result<CaptchaResponse, AppError> {
        // ThreadRng is not Send; finish with it before the first await.
        let (code, png) = {
            let mut rng = rand::thread_rng();
            let code = random_code(&mut rng);
            let png = render(&code, &mut rng)?;
            (code, png)
        };

        let key = Uuid::new_v4().simple().to_string();
        self.store
            .set(&format!("{}{}", KEY_PREFIX, key), &code.to_lowercase(), self.ttl)
            .await?;
        tracing::debug!(%key, "Captcha issued");

        Ok(CaptchaResponse {
            key,
            image: format!(
                "data:image/png;base64,{}",
                base64::engine::general_purpose::STANDARD.encode(png)
            ),
            expires_in: self.ttl.as_secs(),
        })
    }

    /// Case-insensitive check. The answer is consumed only when it matches.
    pub async fn verify(&self, key: &str, code: &str) -> Result<bool, AppError> {
        let (key, code) = (key.trim(), code.trim());
        if key.is_empty() || code.is_empty() {
            return Ok(false);
        }

        let store_key = format!("{}{}", KEY_PREFIX, key);
        let Some(expected) = self.store.get(&store_key).await? else {
            tracing::debug!(%key, "Captcha missing or expired");
            return Ok(false);
        };

        if expected.eq_ignore_ascii_case(code) {
            self.store.delete(&store_key).await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

fn random_code(rng: &mut impl Rng) -> String {
    (0..CODE_LENGTH)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

fn glyph(c: char) -> Option<&'static [u8; 7]> {
    GLYPHS.iter().find(|(g, _)| *g as char == c).map(|(_, rows)| rows)
}

fn random_color(rng: &mut impl Rng, min: u8, max: u8) -> Rgb<u8> {
    Rgb([rng.gen_range(min..max), rng.gen_range(min..max), rng.gen_range(min..max)])
}

fn put(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

// Bresenham
fn draw_line(img: &mut RgbImage, (mut x0, mut y0): (i64, i64), (x1, y1): (i64, i64), color: Rgb<u8>) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        put(img, x0, y0, color);
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

fn render(code: &str, rng: &mut impl Rng) -> Result<Vec<u8>, AppError> {
    let mut img = RgbImage::from_pixel(WIDTH, HEIGHT, Rgb([245, 245, 245]));

    for _ in 0..120 {
        let color = random_color(rng, 150, 230);
        put(&mut img, rng.gen_range(0..WIDTH as i64), rng.gen_range(0..HEIGHT as i64), color);
    }

    for (i, c) in code.chars().enumerate() {
        let Some(rows) = glyph(c) else { continue };
        let color = random_color(rng, 20, 120);
        let left = 8 + i as u32 * 30 + rng.gen_range(0..4);
        let top = 6 + rng.gen_range(0..8);
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..5u32 {
                if bits & (0x10 >> col) == 0 {
                    continue;
                }
                for dy in 0..SCALE {
                    for dx in 0..SCALE {
                        let x = left + col * SCALE + dx;
                        let y = top + row as u32 * SCALE + dy;
                        put(&mut img, x as i64, y as i64, color);
                    }
                }
            }
        }
    }

    for _ in 0..4 {
        let color = random_color(rng, 80, 200);
        let from = (rng.gen_range(0..WIDTH as i64 / 3), rng.gen_range(0..HEIGHT as i64));
        let to = (rng.gen_range(2 * WIDTH as i64 / 3..WIDTH as i64), rng.gen_range(0..HEIGHT as i64));
        draw_line(&mut img, from, to, color);
    }

    let mut png = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| anyhow::anyhow!("Failed to encode captcha image: {}", e))?;
    Ok(png)
}

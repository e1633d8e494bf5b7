use rand::Rng;

use super::keyboard::{KEY_SIZE, Keyboard};

const KEY_PLATEAU: f32 = 0.2;
const DOT_SIGMA: f32 = 0.06;
const DOT_HEIGHT: f32 = 0.8;

/// Renders what the tactile sensor feels at a given position.
#[derive(Clone, Debug)]
pub struct TactileSensor {
    image_size: [usize; 2],
    view_size: f32,
    noise: f32,
}

impl TactileSensor {
    pub fn new(image_size: [usize; 2], view_size: f32, noise: f32) -> Self {
        Self {
            image_size,
            view_size,
            noise,
        }
    }

    pub fn image_size(&self) -> [usize; 2] {
        self.image_size
    }

    pub fn pixels(&self) -> usize {
        self.image_size[0] * self.image_size[1]
    }

    /// Row-major intensity image in `[0, 1]`.
    pub fn render<R: Rng>(&self, keyboard: &Keyboard, position: [f32; 2], rng: &mut R) -> Vec<f32> {
        let [height, width] = self.image_size;
        let mut image = Vec::with_capacity(height * width);
        let reach = self.view_size * 0.5 + KEY_SIZE;
        let nearby: Vec<_> = keyboard
            .keys()
            .iter()
            .filter(|key| {
                (key.center[0] - position[0]).abs() <= reach
                    && (key.center[1] - position[1]).abs() <= reach
            })
            .collect();
        let dots: Vec<[f32; 2]> = nearby.iter().flat_map(|key| key.dot_positions()).collect();
        let two_sigma_sq = 2.0 * DOT_SIGMA * DOT_SIGMA;
        for row in 0..height {
            let y = position[1] + self.view_size * (pixel_offset(row, height));
            for column in 0..width {
                let x = position[0] + self.view_size * (pixel_offset(column, width));
                let point = [x, y];
                let mut value = if nearby.iter().any(|key| key.contains(point)) {
                    KEY_PLATEAU
                } else {
                    0.0
                };
                for dot in &dots {
                    let dx = x - dot[0];
                    let dy = y - dot[1];
                    value += DOT_HEIGHT * (-(dx * dx + dy * dy) / two_sigma_sq).exp();
                }
                if self.noise > 0.0 {
                    value += rng.gen_range(-self.noise..=self.noise);
                }
                image.push(value.clamp(0.0, 1.0));
            }
        }
        image
    }
}

/// Offset of a pixel centre from the sensor centre, as a fraction of the view.
#[inline]
fn pixel_offset(index: usize, count: usize) -> f32 {
    (index as f32 + 0.5) / count as f32 - 0.5
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::keyboard::KeyboardLayout;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn render_has_requested_size_and_range() {
        let keyboard = Keyboard::new(KeyboardLayout::Arrows);
        let sensor = TactileSensor::new([12, 16], 1.0, 0.05);
        let mut rng = StdRng::seed_from_u64(3);
        let image = sensor.render(&keyboard, [1.0, 1.0], &mut rng);
        assert_eq!(image.len(), 12 * 16);
        assert!(image.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn different_keys_feel_different() {
        let keyboard = Keyboard::new(KeyboardLayout::Arrows);
        let sensor = TactileSensor::new([16, 16], 1.0, 0.0);
        let mut rng = StdRng::seed_from_u64(0);
        let up = sensor.render(&keyboard, [1.0, 0.0], &mut rng);
        let down = sensor.render(&keyboard, [1.0, 1.0], &mut rng);
        let diff: f32 = up.iter().zip(&down).map(|(a, b)| (a - b).abs()).sum();
        assert!(diff > 1.0);
    }

    #[test]
    fn empty_space_is_flat() {
        let keyboard = Keyboard::new(KeyboardLayout::Arrows);
        let sensor = TactileSensor::new([8, 8], 0.2, 0.0);
        let mut rng = StdRng::seed_from_u64(0);
        let image = sensor.render(&keyboard, [-0.5, -0.5], &mut rng);
        assert!(image.iter().all(|v| *v < 1e-3));
    }
}

//! Targets, crosshair and hit detection

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::GameConfig;

/// A bouncing target
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub x: f32,
    pub y: f32,
    pub vel_x: f32,
    pub vel_y: f32,
    pub radius: f32,
}

impl Target {
    /// Move one frame, reflecting off the playfield edges
    pub fn update(&mut self, width: f32, height: f32) {
        self.x += self.vel_x;
        self.y += self.vel_y;

        if self.x + self.radius > width || self.x - self.radius < 0.0 {
            self.vel_x = -self.vel_x;
        }
        if self.y + self.radius > height || self.y - self.radius < 0.0 {
            self.vel_y = -self.vel_y;
        }
    }

    /// Point strictly inside the target
    pub fn contains(&self, x: f32, y: f32) -> bool {
        let dx = x - self.x;
        let dy = y - self.y;
        dx * dx + dy * dy < self.radius * self.radius
    }
}

/// Locally generated targets; never shared with other peers
#[derive(Debug, Clone)]
pub struct TargetField {
    width: f32,
    height: f32,
    radius: f32,
    max_speed: f32,
    cap: usize,
    targets: Vec<Target>,
    rng: ChaCha8Rng,
}

impl TargetField {
    pub fn new(config: &GameConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        Self {
            width: config.field_width,
            height: config.field_height,
            radius: config.target_radius,
            max_speed: config.target_speed,
            cap: config.max_targets,
            targets: Vec::new(),
            rng,
        }
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn clear(&mut self) {
        self.targets.clear();
    }

    pub fn size(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    /// Spawn a target at a random spot fully inside the field
    pub fn spawn(&mut self) -> Option<&Target> {
        if self.targets.len() >= self.cap {
            return None;
        }

        let r = self.radius;
        let x = self.random_coord(self.width, r);
        let y = self.random_coord(self.height, r);
        let vel_x = self.random_velocity();
        let vel_y = self.random_velocity();

        self.targets.push(Target {
            x,
            y,
            vel_x,
            vel_y,
            radius: r,
        });
        self.targets.last()
    }

    /// Place a stationary target, ignoring the cap
    pub fn spawn_at(&mut self, x: f32, y: f32) {
        self.targets.push(Target {
            x,
            y,
            vel_x: 0.0,
            vel_y: 0.0,
            radius: self.radius,
        });
    }

    /// One render frame: top up by one target, then move everything
    pub fn step(&mut self) {
        self.spawn();
        let (w, h) = (self.width, self.height);
        for target in &mut self.targets {
            target.update(w, h);
        }
    }

    /// Remove the first target under the point; true on a hit
    pub fn hit(&mut self, x: f32, y: f32) -> bool {
        match self.targets.iter().position(|t| t.contains(x, y)) {
            Some(idx) => {
                self.targets.remove(idx);
                true
            }
            None => false,
        }
    }

    fn random_coord(&mut self, extent: f32, radius: f32) -> f32 {
        let span = extent - 2.0 * radius;
        if !span.is_finite() || span <= 0.0 {
            return extent / 2.0;
        }
        self.rng.gen_range(0.0..span) + radius
    }

    fn random_velocity(&mut self) -> f32 {
        if !self.max_speed.is_finite() || self.max_speed <= 0.0 {
            return 0.0;
        }
        self.rng.gen_range(-self.max_speed..self.max_speed)
    }
}

/// Pointer-locked aim position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crosshair {
    pub x: f32,
    pub y: f32,
    pub sensitivity: f32,
}

impl Crosshair {
    pub fn centered(width: f32, height: f32, sensitivity: f32) -> Self {
        Self {
            x: width / 2.0,
            y: height / 2.0,
            sensitivity,
        }
    }

    /// Apply raw pointer movement, clamped to the field
    pub fn apply_motion(&mut self, dx: f32, dy: f32, width: f32, height: f32) {
        self.x = (self.x + dx * self.sensitivity).clamp(0.0, width);
        self.y = (self.y + dy * self.sensitivity).clamp(0.0, height);
    }
}

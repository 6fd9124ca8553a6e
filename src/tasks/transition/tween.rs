//! Interpolated surface transforms and the motion presets for each kind of transition.

use std::time::Duration;

use rand::Rng;

/// Maps `t` in [0, 1] onto eased progress.
pub type EasingFn = fn(f32) -> f32;

const BACK_OVERSHOOT: f32 = 2.0;

pub fn linear(t: f32) -> f32 {
    t.clamp(0.0, 1.0)
}

pub fn ease_in(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t
}

pub fn ease_out(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t) * (1.0 - t)
}

pub fn ease_in_out(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        2.0 * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
    }
}

pub fn ease_out_cubic(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

/// Overshoots past 1 before settling; not clamped to [0, 1] on the way.
pub fn back_out(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    let c3 = BACK_OVERSHOOT + 1.0;
    1.0 + c3 * (t - 1.0).powi(3) + BACK_OVERSHOOT * (t - 1.0).powi(2)
}

/// Placement and look of one display surface. Angles are degrees, blur is pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub scale: f32,
    pub opacity: f32,
    pub rotation_x: f32,
    pub rotation_y: f32,
    pub blur: f32,
    pub brightness: f32,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        scale: 1.0,
        opacity: 1.0,
        rotation_x: 0.0,
        rotation_y: 0.0,
        blur: 0.0,
        brightness: 1.0,
    };

    pub const HIDDEN: Transform = Transform {
        opacity: 0.0,
        ..Transform::IDENTITY
    };

    pub fn lerp(&self, to: &Transform, t: f32) -> Transform {
        let mix = |a: f32, b: f32| a + (b - a) * t;
        Transform {
            x: mix(self.x, to.x),
            y: mix(self.y, to.y),
            z: mix(self.z, to.z),
            scale: mix(self.scale, to.scale),
            opacity: mix(self.opacity, to.opacity).clamp(0.0, 1.0),
            rotation_x: mix(self.rotation_x, to.rotation_x),
            rotation_y: mix(self.rotation_y, to.rotation_y),
            blur: mix(self.blur, to.blur).max(0.0),
            brightness: mix(self.brightness, to.brightness).max(0.0),
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Transform::IDENTITY
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Tween {
    pub from: Transform,
    pub to: Transform,
    pub easing: EasingFn,
}

impl Tween {
    pub fn sample(&self, progress: f32) -> Transform {
        self.from.lerp(&self.to, (self.easing)(progress))
    }
}

/// Outgoing and incoming motion for one transition.
#[derive(Debug, Clone, Copy)]
pub struct TransitionStyle {
    pub duration: Duration,
    pub exit: Tween,
    pub enter: Tween,
}

impl TransitionStyle {
    /// Subtle turn away and back in.
    pub fn normal<R: Rng + ?Sized>(duration: Duration, rng: &mut R) -> Self {
        let dir = direction(rng);
        let rotation_y = dir * (15.0 + rng.random_range(0.0..20.0));
        let rotation_x = (rng.random_range(0.0..1.0) - 0.5) * 10.0;
        Self {
            duration,
            exit: normal_exit(rotation_x, rotation_y),
            enter: Tween {
                from: Transform {
                    y: 30.0,
                    z: -250.0,
                    scale: 0.85,
                    opacity: 0.0,
                    rotation_x,
                    rotation_y,
                    blur: 8.0,
                    brightness: 0.6,
                    ..Transform::IDENTITY
                },
                to: Transform::IDENTITY,
                easing: ease_out_cubic,
            },
        }
    }

    /// Faster, wider flip with sideways and depth travel.
    pub fn recap<R: Rng + ?Sized>(duration: Duration, rng: &mut R) -> Self {
        let dir = direction(rng);
        let rotation_y = dir * (25.0 + rng.random_range(0.0..35.0));
        let rotation_x = (rng.random_range(0.0..1.0) - 0.5) * 15.0;
        let x = dir * (50.0 + rng.random_range(0.0..100.0));
        let z = -300.0 - rng.random_range(0.0..200.0);
        Self {
            duration,
            exit: Tween {
                from: Transform::IDENTITY,
                to: Transform {
                    x: -x * 0.6,
                    y: -20.0,
                    z,
                    scale: 0.75,
                    opacity: 0.0,
                    rotation_x: rotation_x * 0.9,
                    rotation_y: -rotation_y * 0.9,
                    blur: 6.0,
                    brightness: 0.6,
                },
                easing: ease_in_out,
            },
            enter: Tween {
                from: Transform {
                    x,
                    y: 30.0,
                    z: -z * 0.8,
                    scale: 0.8,
                    opacity: 0.0,
                    rotation_x,
                    rotation_y,
                    blur: 6.0,
                    brightness: 0.5,
                },
                to: Transform::IDENTITY,
                easing: ease_out,
            },
        }
    }

    /// Dramatic entrance that overshoots and settles slightly enlarged.
    pub fn winner<R: Rng + ?Sized>(duration: Duration, rng: &mut R) -> Self {
        let dir = direction(rng);
        let rotation_y = dir * (15.0 + rng.random_range(0.0..20.0));
        let rotation_x = (rng.random_range(0.0..1.0) - 0.5) * 10.0;
        Self {
            duration,
            exit: normal_exit(rotation_x, rotation_y),
            enter: Tween {
                from: Transform {
                    y: 40.0,
                    z: -300.0,
                    scale: 0.8,
                    opacity: 0.0,
                    rotation_x: -10.0,
                    rotation_y: 30.0,
                    blur: 10.0,
                    brightness: 0.5,
                    ..Transform::IDENTITY
                },
                to: Transform {
                    scale: 1.05,
                    ..Transform::IDENTITY
                },
                easing: back_out,
            },
        }
    }
}

fn normal_exit(rotation_x: f32, rotation_y: f32) -> Tween {
    Tween {
        from: Transform::IDENTITY,
        to: Transform {
            y: -30.0,
            z: -200.0,
            scale: 0.85,
            opacity: 0.0,
            rotation_x: rotation_x * 0.8,
            rotation_y: -rotation_y * 0.8,
            blur: 8.0,
            brightness: 0.7,
            ..Transform::IDENTITY
        },
        easing: ease_in,
    }
}

fn direction<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    if rng.random_bool(0.5) { 1.0 } else { -1.0 }
}

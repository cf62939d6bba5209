use rand::Rng;

use crate::device::{AccelerometerRange, Channel, SampleValue};

/// Peak-to-peak noise added to every generated value, relative to its range
const NOISE: f64 = 0.002;

/// Orientation of the simulated wearer at time `t` (seconds), in degrees
fn orientation(t: f64) -> (f64, f64, f64) {
    let pitch = 60.0 * (t * 0.9).sin();
    let roll = 30.0 * (t * 0.5).sin();
    let yaw = (180.0 + 170.0 * (t * 0.2).sin()).rem_euclid(360.0);
    (pitch, roll, yaw)
}

fn noise(scale: f64) -> f64 {
    let amplitude = NOISE * scale;
    rand::rng().random_range(-amplitude..=amplitude)
}

/// Generate the value a sensor-fusion output would report at time `t`
pub fn value_at(channel: Channel, t: f64, range: AccelerometerRange) -> SampleValue {
    let (pitch, roll, yaw) = orientation(t);
    match channel {
        Channel::EulerAngle => SampleValue::EulerAngle {
            pitch: (pitch + noise(360.0)).clamp(-180.0, 180.0),
            roll: (roll + noise(180.0)).clamp(-90.0, 90.0),
            yaw: (yaw + noise(360.0)).rem_euclid(360.0),
        },
        Channel::Quaternion => {
            let (x, y, z, w) = quaternion(pitch, roll, yaw);
            SampleValue::Quaternion { x, y, z, w }
        }
        Channel::Gravity => {
            let (pitch, roll) = (pitch.to_radians(), roll.to_radians());
            SampleValue::Gravity {
                x: -pitch.sin(),
                y: roll.sin() * pitch.cos(),
                z: roll.cos() * pitch.cos(),
            }
        }
        Channel::LinearAcceleration => {
            // Wrist motion rarely goes past a quarter of the configured range
            let peak = range.g() / 4.0;
            SampleValue::LinearAcceleration {
                x: peak * (t * 3.1).sin() + noise(range.g()),
                y: peak * 0.5 * (t * 1.7).cos() + noise(range.g()),
                z: peak * 0.25 * (t * 4.3).sin() + noise(range.g()),
            }
        }
    }
}

/// Unit quaternion for the given Tait-Bryan angles in degrees
fn quaternion(pitch: f64, roll: f64, yaw: f64) -> (f64, f64, f64, f64) {
    let (sr, cr) = (roll.to_radians() / 2.0).sin_cos();
    let (sp, cp) = (pitch.to_radians() / 2.0).sin_cos();
    let (sy, cy) = (yaw.to_radians() / 2.0).sin_cos();

    let w = cr * cp * cy + sr * sp * sy;
    let x = sr * cp * cy - cr * sp * sy;
    let y = cr * sp * cy + sr * cp * sy;
    let z = cr * cp * sy - sr * sp * cy;
    (x, y, z, w)
}

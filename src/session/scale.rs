use serde::Serialize;

use crate::device::{AccelerometerRange, Channel, SampleValue};

/// Bounds of the normalized display range
pub const DISPLAY_MIN: f64 = -1.0;
pub const DISPLAY_MAX: f64 = 1.0;

/// A sample projected into normalized display coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DisplayPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Linearly map `value` from [min, max] into the display range. Values
/// outside the source range are pinned to the display bounds.
pub fn scale(value: f64, min: f64, max: f64) -> f64 {
    if max <= min {
        return (DISPLAY_MIN + DISPLAY_MAX) / 2.0;
    }
    let fraction = (value - min) / (max - min);
    let scaled = DISPLAY_MIN + fraction * (DISPLAY_MAX - DISPLAY_MIN);
    scaled.clamp(DISPLAY_MIN, DISPLAY_MAX)
}

/// Source range of a single plotted axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisRange {
    pub min: f64,
    pub max: f64,
}

impl AxisRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn project(&self, value: f64) -> f64 {
        scale(value, self.min, self.max)
    }
}

const PITCH: AxisRange = AxisRange::new(-180.0, 180.0);
const ROLL: AxisRange = AxisRange::new(-90.0, 90.0);
const YAW: AxisRange = AxisRange::new(0.0, 360.0);
const UNIT: AxisRange = AxisRange::new(-1.0, 1.0);

/// Per-channel projection of samples into display coordinates. Resolved once
/// when a session starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelScale {
    channel: Channel,
    axes: [AxisRange; 3],
}

impl ChannelScale {
    /// Build the scale for the given channel. The accelerometer range only
    /// matters for linear acceleration.
    pub fn for_channel(channel: Channel, range: AccelerometerRange) -> Self {
        let axes = match channel {
            Channel::EulerAngle => [PITCH, ROLL, YAW],
            Channel::Quaternion | Channel::Gravity => [UNIT; 3],
            Channel::LinearAcceleration => {
                let g = range.g();
                [AxisRange::new(-g, g); 3]
            }
        };
        Self { channel, axes }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Project the given value. Returns [None] if the value belongs to a
    /// different channel.
    pub fn project(&self, value: &SampleValue) -> Option<DisplayPoint> {
        if !self.channel.matches(value) {
            return None;
        }
        // Quaternions plot their vector part only
        let (x, y, z) = match *value {
            SampleValue::EulerAngle { pitch, roll, yaw } => (pitch, roll, yaw),
            SampleValue::Quaternion { x, y, z, .. } => (x, y, z),
            SampleValue::Gravity { x, y, z } => (x, y, z),
            SampleValue::LinearAcceleration { x, y, z } => (x, y, z),
        };
        let [ax, ay, az] = self.axes;
        Some(DisplayPoint {
            x: ax.project(x),
            y: ay.project(y),
            z: az.project(z),
        })
    }
}

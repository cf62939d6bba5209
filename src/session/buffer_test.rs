use std::error::Error;

use crate::device::{Sample, SampleValue};

use super::buffer::{format_record, SampleBuffer};

#[test]
fn test_euler_record() {
    let sample = Sample::at_secs(
        1000.0,
        SampleValue::EulerAngle {
            pitch: 0.0,
            roll: 0.0,
            yaw: 180.0,
        },
    )
    .unwrap();
    assert_eq!(format_record(&sample), "1000.0,0,0,180\n");
}

#[test]
fn test_record_field_order() {
    let quaternion = Sample::at_secs(
        12.5,
        SampleValue::Quaternion {
            x: 0.1,
            y: -0.2,
            z: 0.3,
            w: 0.9,
        },
    )
    .unwrap();
    assert_eq!(format_record(&quaternion), "12.5,0.1,-0.2,0.3\n");

    let acceleration = Sample::at_secs(
        3.25,
        SampleValue::LinearAcceleration {
            x: -1.5,
            y: 0.0,
            z: 16.0,
        },
    )
    .unwrap();
    assert_eq!(format_record(&acceleration), "3.25,-1.5,0,16\n");
}

#[test]
fn test_serialize_lines() -> Result<(), Box<dyn Error>> {
    let mut buffer = SampleBuffer::new();
    for i in 0..5 {
        let sample = Sample::at_secs(
            1000.0 + i as f64,
            SampleValue::Gravity {
                x: 0.0,
                y: 0.0,
                z: i as f64,
            },
        );
        buffer.append(sample.unwrap());
    }

    let text = String::from_utf8(buffer.serialize())?;
    assert!(text.ends_with('\n'));
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), buffer.len());
    // No header: every line starts with a timestamp
    for (i, line) in lines.iter().enumerate() {
        let fields: Vec<f64> = line
            .split(',')
            .map(|f| f.parse::<f64>())
            .collect::<Result<_, _>>()?;
        assert_eq!(fields, vec![1000.0 + i as f64, 0.0, 0.0, i as f64]);
    }

    Ok(())
}

#[test]
fn test_serialize_does_not_consume() {
    let mut buffer = SampleBuffer::new();
    let sample = Sample::at_secs(
        1.0,
        SampleValue::Gravity {
            x: 1.0,
            y: 0.0,
            z: 0.0,
        },
    );
    buffer.append(sample.unwrap());
    let first = buffer.serialize();
    let second = buffer.serialize();
    assert_eq!(first, second);
    assert_eq!(buffer.len(), 1);

    buffer.clear();
    assert!(buffer.is_empty());
    assert!(buffer.serialize().is_empty());
}

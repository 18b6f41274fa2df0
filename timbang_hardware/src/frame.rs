use std::io::{BufRead, BufReader, Read};
use timbang_traits::{Sample, Sensor};

use crate::error::DeviceError;

/// Sensor that decodes newline-delimited `W:<kg>;H:<cm>` frames from a byte
/// stream, e.g. a serial port exposed by a combined scale/stadiometer head
/// unit. Malformed frames fail the read; the acquisition loop treats that as
/// a device fault and the operator reconnects.
pub struct FrameSensor<R> {
    reader: BufReader<R>,
    line: String,
}

impl<R: Read> FrameSensor<R> {
    pub fn new(input: R) -> Self {
        Self {
            reader: BufReader::new(input),
            line: String::new(),
        }
    }
}

impl<R: Read> Sensor for FrameSensor<R> {
    fn sample(
        &mut self,
        _timeout: std::time::Duration,
    ) -> Result<Sample, Box<dyn std::error::Error + Send + Sync>> {
        self.line.clear();
        let n = self.reader.read_line(&mut self.line).map_err(DeviceError::Io)?;
        if n == 0 {
            return Err(Box::new(DeviceError::Disconnected));
        }
        let sample = parse_frame(self.line.trim_end())?;
        tracing::trace!(
            weight_kg = sample.weight_kg,
            height_cm = sample.height_cm,
            "device frame"
        );
        Ok(sample)
    }
}

/// Parse one `W:<kg>;H:<cm>` frame.
fn parse_frame(frame: &str) -> Result<Sample, DeviceError> {
    let mut parts = frame.trim().split(';');
    let weight_kg = parse_field(parts.next(), "W:", frame)?;
    let height_cm = parse_field(parts.next(), "H:", frame)?;
    if parts.next().is_some() {
        return Err(DeviceError::Frame(format!("trailing fields in '{frame}'")));
    }
    if weight_kg < 0.0 || height_cm < 0.0 {
        return Err(DeviceError::Frame(format!("negative value in '{frame}'")));
    }
    Ok(Sample {
        weight_kg,
        height_cm,
    })
}

fn parse_field(part: Option<&str>, prefix: &str, frame: &str) -> Result<f32, DeviceError> {
    let part = part.ok_or_else(|| DeviceError::Frame(format!("missing field in '{frame}'")))?;
    let value = part
        .trim()
        .strip_prefix(prefix)
        .ok_or_else(|| DeviceError::Frame(format!("expected '{prefix}' in '{frame}'")))?;
    let value: f32 = value
        .trim()
        .parse()
        .map_err(|_| DeviceError::Frame(format!("bad number in '{frame}'")))?;
    if !value.is_finite() {
        return Err(DeviceError::Frame(format!("non-finite value in '{frame}'")));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::time::Duration;

    #[test]
    fn decodes_a_frame_stream() {
        let input = "W:8.53;H:70.2\nW:8.51;H:70.1\n";
        let mut sensor = FrameSensor::new(input.as_bytes());
        let a = sensor.sample(Duration::from_millis(10)).unwrap();
        assert!((a.weight_kg - 8.53).abs() < 1e-4);
        assert!((a.height_cm - 70.2).abs() < 1e-4);
        let b = sensor.sample(Duration::from_millis(10)).unwrap();
        assert!((b.weight_kg - 8.51).abs() < 1e-4);
    }

    #[test]
    fn end_of_stream_reports_disconnect() {
        let mut sensor = FrameSensor::new("W:8.5;H:70.0\n".as_bytes());
        sensor.sample(Duration::from_millis(10)).unwrap();
        let err = sensor.sample(Duration::from_millis(10)).unwrap_err();
        assert!(format!("{err}").contains("ended"));
    }

    #[rstest]
    #[case("")]
    #[case("8.5;70.0")]
    #[case("W:8.5")]
    #[case("H:70.0;W:8.5")]
    #[case("W:abc;H:70.0")]
    #[case("W:8.5;H:70.0;X:1")]
    #[case("W:-1.0;H:70.0")]
    #[case("W:inf;H:70.0")]
    fn rejects_malformed_frames(#[case] frame: &str) {
        assert!(parse_frame(frame).is_err(), "frame should be rejected: {frame}");
    }

    #[test]
    fn tolerates_surrounding_whitespace() {
        let s = parse_frame("  W: 8.5 ; H: 70.0  ").unwrap();
        assert!((s.weight_kg - 8.5).abs() < 1e-4);
        assert!((s.height_cm - 70.0).abs() < 1e-4);
    }
}

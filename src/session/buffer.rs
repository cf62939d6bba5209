use std::fmt::Write;

use crate::device::Sample;

/// Ordered, append-only collection of the samples received during a session
#[derive(Debug, Default, Clone)]
pub struct SampleBuffer {
    samples: Vec<Sample>,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Serialize every sample as one CSV record per line in arrival order.
    /// There is no header row.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = String::with_capacity(self.samples.len() * 48);
        for sample in &self.samples {
            write_record(&mut out, sample);
        }
        out.into_bytes()
    }
}

/// Format a single sample as a newline terminated CSV record
pub fn format_record(sample: &Sample) -> String {
    let mut out = String::new();
    write_record(&mut out, sample);
    out
}

fn write_record(out: &mut String, sample: &Sample) {
    // Debug formatting keeps the fractional part on whole seconds ("1000.0")
    let _ = write!(out, "{:?}", sample.timestamp_secs());
    for field in sample.value.fields() {
        let _ = write!(out, ",{field}");
    }
    out.push('\n');
}

//! Tensorboard logging sink.
use log::{debug, warn};
use neuralmpc_core::record::{AggregateRecorder, Record, RecordStorage, RecordValue, Recorder};
use std::path::Path;
use tensorboard_rs::summary_writer::SummaryWriter;

/// Write records to TFRecord.
///
/// * [`RecordValue::Scalar`] is written as a scalar.
/// * [`RecordValue::Array1`] is written as one scalar per element, tagged `key/i`.
/// * [`RecordValue::Array2`] is written as a grey-scale image.
///
/// Other values are skipped. The step of a record is taken from the value of the step
/// key, `"t"` by default; a record without it is skipped with a warning.
pub struct TensorboardRecorder {
    writer: SummaryWriter,
    step_key: String,
    storage: RecordStorage,
}

impl TensorboardRecorder {
    /// Construct a [`TensorboardRecorder`].
    ///
    /// TFRecord will be stored in `logdir`.
    pub fn new<P: AsRef<Path>>(logdir: P) -> Self {
        Self {
            writer: SummaryWriter::new(logdir),
            step_key: "t".to_string(),
            storage: RecordStorage::new(),
        }
    }

    /// Sets the key of the step of a record.
    pub fn step_key(mut self, v: impl Into<String>) -> Self {
        self.step_key = v.into();
        self
    }

    fn add_image(&mut self, k: &str, data: &[f32], shape: &[usize; 2], step: usize) {
        let shape = [3, shape[0], shape[1]];
        let min = data.iter().fold(f32::MAX, |m, v| v.min(m));
        let scale = data.iter().fold(-f32::MAX, |m, v| v.max(m)) - min;
        let scale = if scale > 0.0 { scale } else { 1.0 };
        let mut data = data
            .iter()
            .map(|&e| ((e - min) / scale * 255f32) as u8)
            .collect::<Vec<_>>();
        let data_ = data.clone();
        data.extend(data_.iter());
        data.extend(data_.iter());
        self.writer.add_image(k, data.as_slice(), &shape, step)
    }

    fn write_with_step(&mut self, record: &Record, step: usize) {
        for (k, v) in record.iter() {
            if *k == self.step_key {
                continue;
            }
            match v {
                RecordValue::Scalar(v) => self.writer.add_scalar(k, *v, step),
                RecordValue::Array1(data) => {
                    for (i, v) in data.iter().enumerate() {
                        self.writer.add_scalar(&format!("{}/{}", k, i), *v, step);
                    }
                }
                RecordValue::Array2(data, shape) => self.add_image(k, data, shape, step),
                _ => debug!("{} is not written to tensorboard", k),
            }
        }
    }
}

impl Recorder for TensorboardRecorder {
    fn write(&mut self, record: Record) {
        let step = match record.get(&self.step_key) {
            Some(RecordValue::Scalar(v)) => *v as usize,
            _ => {
                warn!("Record without step key {}, skipped", self.step_key);
                return;
            }
        };
        self.write_with_step(&record, step);
    }
}

impl AggregateRecorder for TensorboardRecorder {
    fn store(&mut self, record: Record) {
        self.storage.store(record);
    }

    fn flush(&mut self, step: i64) {
        let record = self.storage.aggregate();
        self.write_with_step(&record, step.max(0) as usize);
        self.writer.flush();
    }
}

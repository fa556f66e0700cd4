//! Per-camera record worker.

use super::{CameraShared, FrameCounter, PipelineError, SessionState};
use crate::frame::Frame;
use crate::output::RawFrameRow;
use crossbeam_channel::Receiver;
use ndarray::ArrayView2;
use std::fs::File;
use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Destination for recorded frames.
///
/// Video encoding is out of scope for this repository; real sinks are
/// provided by an external collaborator. The pipeline only needs the
/// write/finish seam.
pub trait VideoSink: Send {
    /// Append one frame to the stream.
    fn write_frame(&mut self, pixels: &ArrayView2<u8>) -> io::Result<()>;

    /// Flush and close the stream.
    fn finish(&mut self) -> io::Result<()>;
}

/// Sink that counts frames and discards the pixels.
#[derive(Debug, Default)]
pub struct NullVideoSink {
    frames_written: u64,
}

impl NullVideoSink {
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl VideoSink for NullVideoSink {
    fn write_frame(&mut self, _pixels: &ArrayView2<u8>) -> io::Result<()> {
        self.frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Consumes the record queue and persists frames plus metadata.
///
/// A pure consumer: it blocks on the queue receive (released by the
/// capture worker dropping its sender at shutdown) and writes only
/// while both the recording and raw-recording flags are set. One
/// metadata row goes to `raw/<camera>.csv` per recorded frame.
pub struct RecordWorker {
    camera_id: String,
    state: Arc<SessionState>,
    shared: Arc<CameraShared>,
    rx: Receiver<Frame>,
    sink: Box<dyn VideoSink>,
    metadata: csv::Writer<File>,
}

impl RecordWorker {
    pub fn new(
        camera_id: &str,
        state: Arc<SessionState>,
        shared: Arc<CameraShared>,
        rx: Receiver<Frame>,
        sink: Box<dyn VideoSink>,
        metadata: csv::Writer<File>,
    ) -> Self {
        Self {
            camera_id: camera_id.to_string(),
            state,
            shared,
            rx,
            sink,
            metadata,
        }
    }

    /// Run the record loop on a dedicated thread.
    pub fn spawn(self) -> JoinHandle<()> {
        let camera_id = self.camera_id.clone();
        std::thread::spawn(move || {
            if let Err(e) = self.run() {
                tracing::error!("record worker [{camera_id}] failed: {e}");
            }
        })
    }

    fn run(mut self) -> Result<(), PipelineError> {
        tracing::info!("record worker [{}] started", self.camera_id);
        let mut counter = FrameCounter::new(format!("record {}", self.camera_id));

        // Blocks on receive; the disconnect at capture teardown is the
        // release path. The flag check keeps a drained-but-alive worker
        // from writing after shutdown was requested.
        while let Ok(frame) = self.rx.recv() {
            if !self.state.is_running() {
                break;
            }

            if self.state.is_recording() && self.state.is_recording_raw() {
                self.sink.write_frame(&frame.pixels.view())?;
                self.metadata.serialize(RawFrameRow {
                    frame_number: frame.frame_index,
                    process_timestamp: frame.process_timestamp.as_secs_f64(),
                    camera_timestamp: frame.capture_timestamp.as_secs_f64(),
                })?;
            }

            if let Some(rate) = counter.step() {
                self.shared.record_rate.store(rate);
            }
        }

        self.sink.finish()?;
        self.metadata.flush()?;
        tracing::info!("record worker [{}] shutting down", self.camera_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{create_csv_writer, SessionPaths};
    use crate::timestamp::Timestamp;
    use ndarray::Array2;
    use tempfile::TempDir;

    fn test_frame(index: u64) -> Frame {
        Frame {
            camera_id: "cam0".to_string(),
            frame_index: index,
            capture_timestamp: Timestamp::new(index, 0),
            process_timestamp: Timestamp::new(index, 500_000_000),
            pixels: Array2::zeros((4, 4)),
        }
    }

    #[test]
    fn test_record_worker_writes_metadata_while_recording() {
        let dir = TempDir::new().unwrap();
        let paths = SessionPaths::new(dir.path());
        let state = Arc::new(SessionState::new());
        state.set_recording(true);

        let (shared, channels) = state.register_camera("cam0", 8);
        let metadata = create_csv_writer(&paths.raw_csv("cam0")).unwrap();
        let worker = RecordWorker::new(
            "cam0",
            state.clone(),
            shared,
            channels.record_rx,
            Box::new(NullVideoSink::default()),
            metadata,
        );
        let handle = worker.spawn();

        for i in 1..=3 {
            channels.record_tx.send(test_frame(i)).unwrap();
        }
        drop(channels.record_tx);
        handle.join().unwrap();

        let mut reader = csv::Reader::from_path(paths.raw_csv("cam0")).unwrap();
        let rows: Vec<RawFrameRow> = reader.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].frame_number, 1);
        assert_eq!(rows[2].frame_number, 3);
    }

    #[test]
    fn test_record_worker_skips_frames_when_not_recording() {
        let dir = TempDir::new().unwrap();
        let paths = SessionPaths::new(dir.path());
        let state = Arc::new(SessionState::new());

        let (shared, channels) = state.register_camera("cam0", 8);
        let metadata = create_csv_writer(&paths.raw_csv("cam0")).unwrap();
        let worker = RecordWorker::new(
            "cam0",
            state.clone(),
            shared,
            channels.record_rx,
            Box::new(NullVideoSink::default()),
            metadata,
        );
        let handle = worker.spawn();

        channels.record_tx.send(test_frame(0)).unwrap();
        drop(channels.record_tx);
        handle.join().unwrap();

        let mut reader = csv::Reader::from_path(paths.raw_csv("cam0")).unwrap();
        assert_eq!(reader.deserialize::<RawFrameRow>().count(), 0);
    }
}

use std::path::Path;
use std::thread::JoinHandle;

use crossbeam_channel::{Sender, TrySendError};

use crate::shared::camera_info::CameraInfo;
use crate::shared::frame::Frame;
use crate::video::domain::video_writer::{VideoWriter, WriterError};

pub const DEFAULT_RECORDER_CAPACITY: usize = 8;

/// Frame counts reported when a recording is finalized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecordingStats {
    pub written: usize,
    /// Frames discarded because the encoder thread had fallen behind.
    pub dropped: usize,
}

/// Feeds a [`VideoWriter`] running on its own thread.
///
/// Submission never blocks the caller: when the bounded queue is full the
/// frame is dropped and counted. Encoding errors stop the writer thread and
/// are reported by [`BackgroundRecorder::close`].
pub struct BackgroundRecorder {
    tx: Option<Sender<Frame>>,
    handle: Option<JoinHandle<Result<usize, WriterError>>>,
    stats: RecordingStats,
}

impl BackgroundRecorder {
    /// Opens `writer` on the calling thread, then hands it to the encoder
    /// thread. Open failures are returned directly.
    pub fn start(
        mut writer: Box<dyn VideoWriter>,
        path: &Path,
        info: &CameraInfo,
        capacity: usize,
    ) -> Result<Self, WriterError> {
        writer.open(path, info)?;
        let (tx, rx) = crossbeam_channel::bounded::<Frame>(capacity.max(1));

        let handle = std::thread::Builder::new()
            .name("recorder".into())
            .spawn(move || {
                let mut written = 0;
                let mut failure = None;
                for frame in rx {
                    if let Err(e) = writer.write(&frame) {
                        failure = Some(e);
                        break;
                    }
                    written += 1;
                }
                let closed = writer.close();
                match failure {
                    Some(e) => Err(e),
                    None => closed.map(|_| written),
                }
            })?;

        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
            stats: RecordingStats::default(),
        })
    }

    /// Queues a copy of `frame`. Returns false when it was dropped.
    pub fn submit(&mut self, frame: &Frame) -> bool {
        let Some(tx) = &self.tx else {
            self.stats.dropped += 1;
            return false;
        };
        match tx.try_send(frame.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.stats.dropped += 1;
                log::debug!("Recorder queue full, dropped frame {}", frame.index());
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                // Writer thread already stopped on an error; close() reports it.
                log::warn!("Recorder stopped, frames are no longer recorded");
                self.stats.dropped += 1;
                self.tx = None;
                false
            }
        }
    }

    pub fn dropped(&self) -> usize {
        self.stats.dropped
    }

    /// Drains the queue, finalizes the file and joins the encoder thread.
    /// Later calls return the same counts without doing any work.
    pub fn close(&mut self) -> Result<RecordingStats, WriterError> {
        self.tx = None;
        let Some(handle) = self.handle.take() else {
            return Ok(self.stats);
        };
        let written = handle
            .join()
            .map_err(|_| WriterError::from("recorder thread panicked"))??;
        self.stats.written = written;
        if self.stats.dropped > 0 {
            log::warn!(
                "Recorder dropped {} frames ({} written)",
                self.stats.dropped,
                written
            );
        }
        Ok(self.stats)
    }
}

impl Drop for BackgroundRecorder {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("Recording failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::camera_info::CameraBackend;
    use crossbeam_channel::{Receiver, Sender};
    use std::sync::{Arc, Mutex};

    fn info() -> CameraInfo {
        CameraInfo {
            width: 2,
            height: 2,
            fps: 30.0,
            backend: CameraBackend::Generic,
            device: "stub".into(),
        }
    }

    fn frame(index: usize) -> Frame {
        Frame::new(vec![0; 12], 2, 2, 3, index)
    }

    #[derive(Default)]
    struct Log {
        opened: bool,
        written: Vec<usize>,
        closed: usize,
    }

    /// Records calls; optionally signals on entering `write` and waits for
    /// the test to release it.
    struct StubWriter {
        log: Arc<Mutex<Log>>,
        fail_open: bool,
        fail_write_at: Option<usize>,
        gate: Option<(Sender<()>, Receiver<()>)>,
    }

    impl StubWriter {
        fn new(log: Arc<Mutex<Log>>) -> Self {
            Self {
                log,
                fail_open: false,
                fail_write_at: None,
                gate: None,
            }
        }
    }

    impl VideoWriter for StubWriter {
        fn open(&mut self, _path: &Path, _info: &CameraInfo) -> Result<(), WriterError> {
            if self.fail_open {
                return Err("cannot create file".into());
            }
            self.log.lock().unwrap().opened = true;
            Ok(())
        }

        fn write(&mut self, frame: &Frame) -> Result<(), WriterError> {
            if let Some((entered, release)) = self.gate.take() {
                entered.send(()).unwrap();
                let _ = release.recv();
            }
            if self.fail_write_at == Some(frame.index()) {
                return Err("encoder rejected frame".into());
            }
            self.log.lock().unwrap().written.push(frame.index());
            Ok(())
        }

        fn close(&mut self) -> Result<(), WriterError> {
            self.log.lock().unwrap().closed += 1;
            Ok(())
        }
    }

    #[test]
    fn test_frames_written_in_order_and_closed_once() {
        let log = Arc::new(Mutex::new(Log::default()));
        let writer = Box::new(StubWriter::new(Arc::clone(&log)));
        let mut recorder = BackgroundRecorder::start(writer, Path::new("out.mp4"), &info(), 16).unwrap();
        for i in 0..5 {
            assert!(recorder.submit(&frame(i)));
        }
        let stats = recorder.close().unwrap();
        assert_eq!(stats, RecordingStats { written: 5, dropped: 0 });

        let log = log.lock().unwrap();
        assert!(log.opened);
        assert_eq!(log.written, vec![0, 1, 2, 3, 4]);
        assert_eq!(log.closed, 1);
    }

    #[test]
    fn test_full_queue_drops_instead_of_blocking() {
        let log = Arc::new(Mutex::new(Log::default()));
        let (entered_tx, entered_rx) = crossbeam_channel::bounded(1);
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
        let mut writer = StubWriter::new(Arc::clone(&log));
        writer.gate = Some((entered_tx, release_rx));

        let mut recorder =
            BackgroundRecorder::start(Box::new(writer), Path::new("out.mp4"), &info(), 1).unwrap();
        assert!(recorder.submit(&frame(0)));
        entered_rx.recv().unwrap();
        // writer is busy with frame 0; one slot left in the queue
        assert!(recorder.submit(&frame(1)));
        assert!(!recorder.submit(&frame(2)));
        assert_eq!(recorder.dropped(), 1);

        drop(release_tx);
        let stats = recorder.close().unwrap();
        assert_eq!(stats, RecordingStats { written: 2, dropped: 1 });
        assert_eq!(log.lock().unwrap().written, vec![0, 1]);
    }

    #[test]
    fn test_open_failure_is_returned() {
        let log = Arc::new(Mutex::new(Log::default()));
        let mut writer = StubWriter::new(Arc::clone(&log));
        writer.fail_open = true;
        let result = BackgroundRecorder::start(Box::new(writer), Path::new("out.mp4"), &info(), 4);
        assert!(result.is_err());
        assert!(!log.lock().unwrap().opened);
    }

    #[test]
    fn test_write_failure_surfaces_at_close_and_writer_is_closed() {
        let log = Arc::new(Mutex::new(Log::default()));
        let mut writer = StubWriter::new(Arc::clone(&log));
        writer.fail_write_at = Some(1);
        let mut recorder =
            BackgroundRecorder::start(Box::new(writer), Path::new("out.mp4"), &info(), 4).unwrap();
        recorder.submit(&frame(0));
        recorder.submit(&frame(1));

        let err = recorder.close().unwrap_err();
        assert!(err.to_string().contains("encoder rejected frame"));
        assert_eq!(log.lock().unwrap().closed, 1);
        assert_eq!(log.lock().unwrap().written, vec![0]);
    }

    #[test]
    fn test_close_is_idempotent_and_submit_after_close_drops() {
        let log = Arc::new(Mutex::new(Log::default()));
        let writer = Box::new(StubWriter::new(Arc::clone(&log)));
        let mut recorder = BackgroundRecorder::start(writer, Path::new("out.mp4"), &info(), 4).unwrap();
        recorder.submit(&frame(0));
        recorder.close().unwrap();
        assert!(!recorder.submit(&frame(1)));
        let stats = recorder.close().unwrap();
        assert_eq!(stats, RecordingStats { written: 1, dropped: 1 });
        drop(recorder);
        assert_eq!(log.lock().unwrap().closed, 1);
    }
}

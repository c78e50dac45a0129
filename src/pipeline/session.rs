use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
};

use super::camera::{CameraDevice, FrameOutputs, VideoSource, select_device};
use crate::error::AppError;

/// Shared run flag of one capture session. Any thread may stop the session;
/// only the first of several concurrent stops takes effect.
#[derive(Clone, Debug, Default)]
pub struct SessionStopper {
    running: Arc<AtomicBool>,
    stops: Arc<AtomicU64>,
}

impl SessionStopper {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns `true` if this call stopped a running session.
    pub fn stop(&self) -> bool {
        let stopped = self
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if stopped {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
        stopped
    }

    /// Number of times a running session was actually stopped.
    pub fn stop_count(&self) -> u64 {
        self.stops.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_running(&self) {
        self.running.store(true, Ordering::SeqCst);
    }
}

/// One input device wired to one output sink.
pub struct CaptureSession<S: VideoSource> {
    source: S,
    device: CameraDevice,
    outputs: FrameOutputs,
    stopper: SessionStopper,
    capture_thread: Option<thread::JoinHandle<()>>,
    threads_spawned: u64,
}

impl<S: VideoSource> CaptureSession<S> {
    /// Selects a device and validates it. The session is not started.
    pub fn configure(
        source: S,
        preferred_label: &str,
        outputs: FrameOutputs,
    ) -> Result<Self, AppError> {
        let devices = source.devices()?;
        log::debug!(
            "found {} video devices: {:?}",
            devices.len(),
            devices.iter().map(|d| d.label.as_str()).collect::<Vec<_>>()
        );
        let device = select_device(&devices, preferred_label)?.clone();
        source.probe(&device)?;
        log::info!("capture session configured for {}", device.label);

        Ok(Self {
            source,
            device,
            outputs,
            stopper: SessionStopper::default(),
            capture_thread: None,
            threads_spawned: 0,
        })
    }

    pub fn device(&self) -> &CameraDevice {
        &self.device
    }

    pub fn stopper(&self) -> SessionStopper {
        self.stopper.clone()
    }

    pub fn is_running(&self) -> bool {
        self.stopper.is_running()
    }

    pub fn threads_spawned(&self) -> u64 {
        self.threads_spawned
    }

    /// Starts delivering frames. A running session is left untouched.
    pub fn start(&mut self) -> bool {
        if self.stopper.is_running() {
            return false;
        }
        self.join_capture_thread();

        self.stopper.mark_running();
        let source = self.source.clone();
        let device = self.device.clone();
        let outputs = self.outputs.clone();
        let stopper = self.stopper.clone();
        let spawned = thread::Builder::new()
            .name("camera-feed".into())
            .spawn(move || {
                if let Err(err) = source.run_capture(&device, &stopper.running, &outputs) {
                    // Not reported when a pause raced the failure.
                    if stopper.stop() {
                        log::error!("capture session stopped: {err}");
                        let _ = outputs.errors.send(err);
                    }
                }
            });

        match spawned {
            Ok(handle) => {
                self.capture_thread = Some(handle);
                self.threads_spawned += 1;
                log::info!("capture session started on {}", self.device.label);
                true
            }
            Err(err) => {
                log::error!("failed to spawn capture thread: {err}");
                self.stopper.stop();
                false
            }
        }
    }

    pub fn stop(&mut self) {
        if self.stopper.stop() {
            log::info!("capture session stopped");
        }
        self.join_capture_thread();
    }

    fn join_capture_thread(&mut self) {
        if let Some(handle) = self.capture_thread.take() {
            if handle.join().is_err() {
                log::error!("capture thread panicked");
            }
        }
    }
}

impl<S: VideoSource> Drop for CaptureSession<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Ties the capture session to the preview's visibility: the session is
/// built lazily on first appearance and started/stopped as the view comes and
/// goes.
pub struct CaptureController<S: VideoSource> {
    source: S,
    preferred_label: String,
    outputs: FrameOutputs,
    session: Option<CaptureSession<S>>,
}

impl<S: VideoSource> CaptureController<S> {
    pub fn new(source: S, preferred_label: impl Into<String>, outputs: FrameOutputs) -> Self {
        Self {
            source,
            preferred_label: preferred_label.into(),
            outputs,
            session: None,
        }
    }

    pub fn appear(&mut self) -> Result<&CaptureSession<S>, AppError> {
        let session = match self.session.take() {
            Some(session) => session,
            None => CaptureSession::configure(
                self.source.clone(),
                &self.preferred_label,
                self.outputs.clone(),
            )?,
        };
        let session = self.session.insert(session);
        session.start();
        Ok(&*session)
    }

    pub fn disappear(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.stop();
        }
    }

    pub fn session(&self) -> Option<&CaptureSession<S>> {
        self.session.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        thread,
        time::Duration,
    };

    use crossbeam_channel::{Receiver, bounded, unbounded};
    use nokhwa::utils::CameraIndex;

    use super::*;
    use crate::{
        pipeline::camera::ReadFailures,
        types::{Frame, SampleBuffer},
    };

    #[derive(Clone, Default)]
    struct FakeSource {
        labels: Vec<&'static str>,
        fail_probe: bool,
        fail_open: Arc<AtomicBool>,
        unplugged: bool,
        probes: Arc<Mutex<u32>>,
        captures: Arc<Mutex<u32>>,
    }

    impl FakeSource {
        fn with(labels: &[&'static str]) -> Self {
            Self {
                labels: labels.to_vec(),
                ..Default::default()
            }
        }
    }

    impl VideoSource for FakeSource {
        fn devices(&self) -> Result<Vec<CameraDevice>, AppError> {
            Ok(self
                .labels
                .iter()
                .enumerate()
                .map(|(i, l)| CameraDevice::new(CameraIndex::Index(i as u32), *l))
                .collect())
        }

        fn probe(&self, _device: &CameraDevice) -> Result<(), AppError> {
            *self.probes.lock().unwrap() += 1;
            if self.fail_probe {
                Err(AppError::capture_setup("Could not create video device input."))
            } else {
                Ok(())
            }
        }

        fn run_capture(
            &self,
            _device: &CameraDevice,
            running: &AtomicBool,
            outputs: &FrameOutputs,
        ) -> Result<(), AppError> {
            *self.captures.lock().unwrap() += 1;
            if self.fail_open.load(Ordering::SeqCst) {
                return Err(AppError::capture_setup(
                    "Could not add video device input to the session",
                ));
            }
            let mut failures = ReadFailures::default();
            while running.load(Ordering::Relaxed) {
                if self.unplugged {
                    failures.failed("device disconnected")?;
                } else {
                    outputs.deliver(SampleBuffer::with_image(Frame::new(vec![0; 4], 1, 1)));
                }
                thread::sleep(Duration::from_millis(1));
            }
            Ok(())
        }
    }

    fn outputs() -> FrameOutputs {
        outputs_with_errors().0
    }

    fn outputs_with_errors() -> (FrameOutputs, Receiver<AppError>) {
        let (preview, _) = bounded(1);
        let (samples, _) = bounded(1);
        let (errors, errors_rx) = unbounded();
        (
            FrameOutputs {
                preview,
                samples,
                errors,
            },
            errors_rx,
        )
    }

    #[test]
    fn appearing_twice_keeps_a_single_session() {
        let source = FakeSource::with(&["FaceTime HD Camera"]);
        let mut controller = CaptureController::new(source.clone(), "Razer Kiyo Pro", outputs());

        controller.appear().unwrap();
        controller.appear().unwrap();

        let session = controller.session().unwrap();
        assert!(session.is_running());
        assert_eq!(session.threads_spawned(), 1);
        assert_eq!(*source.probes.lock().unwrap(), 1);

        controller.disappear();
        assert!(!controller.session().unwrap().is_running());
        assert_eq!(*source.captures.lock().unwrap(), 1);
    }

    #[test]
    fn restart_after_disappear_reuses_the_session() {
        let source = FakeSource::with(&["Razer Kiyo Pro"]);
        let mut controller = CaptureController::new(source.clone(), "Razer Kiyo Pro", outputs());

        controller.appear().unwrap();
        controller.disappear();
        let session = controller.appear().unwrap();
        assert_eq!(session.device().label, "Razer Kiyo Pro");
        assert_eq!(session.threads_spawned(), 2);
        assert_eq!(*source.probes.lock().unwrap(), 1);
    }

    #[test]
    fn missing_camera_never_starts_a_session() {
        let source = FakeSource::with(&["Back Camera"]);
        let mut controller = CaptureController::new(source.clone(), "Razer Kiyo Pro", outputs());

        let err = controller.appear().err().unwrap();
        assert!(matches!(err, AppError::CaptureSessionSetup { .. }));
        assert!(controller.session().is_none());
        assert_eq!(*source.captures.lock().unwrap(), 0);
    }

    #[test]
    fn probe_failure_is_reported() {
        let source = FakeSource {
            fail_probe: true,
            ..FakeSource::with(&["Razer Kiyo Pro"])
        };
        let mut controller = CaptureController::new(source, "Razer Kiyo Pro", outputs());
        let err = controller.appear().err().unwrap();
        assert_eq!(err.detail(), "Could not create video device input.");
        assert!(controller.session().is_none());
    }

    #[test]
    fn concurrent_stops_count_once() {
        let stopper = SessionStopper::default();
        stopper.mark_running();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stopper = stopper.clone();
                thread::spawn(move || stopper.stop())
            })
            .collect();
        let stopped: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();

        assert_eq!(stopped, 1);
        assert_eq!(stopper.stop_count(), 1);
        assert!(!stopper.is_running());
    }

    #[test]
    fn reopen_failure_on_restart_reaches_the_error_channel() {
        let source = FakeSource::with(&["Razer Kiyo Pro"]);
        let (outputs, errors) = outputs_with_errors();
        let mut controller = CaptureController::new(source.clone(), "Razer Kiyo Pro", outputs);

        controller.appear().unwrap();
        controller.disappear();
        assert!(errors.try_recv().is_err());

        // The device is taken by another process before the view comes back.
        source.fail_open.store(true, Ordering::SeqCst);
        controller.appear().unwrap();

        let err = errors.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(
            err,
            AppError::capture_setup("Could not add video device input to the session")
        );
        let session = controller.session().unwrap();
        assert!(!session.is_running());
        assert_eq!(session.stopper().stop_count(), 2);
    }

    #[test]
    fn unplugged_device_stops_the_session_and_reports_once() {
        let source = FakeSource {
            unplugged: true,
            ..FakeSource::with(&["Razer Kiyo Pro"])
        };
        let (outputs, errors) = outputs_with_errors();
        let mut controller = CaptureController::new(source, "Razer Kiyo Pro", outputs);

        let stopper = controller.appear().unwrap().stopper();
        let err = errors.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(err, AppError::CaptureInterrupted { .. }), "{err:?}");
        assert!(!stopper.is_running());

        controller.disappear();
        assert_eq!(stopper.stop_count(), 1);
        assert!(errors.try_recv().is_err());
    }
}

use std::{
    fmt,
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::Duration,
};

use crossbeam_channel::Sender;
use nokhwa::{
    Camera, NokhwaError,
    pixel_format::RgbFormat,
    query,
    utils::{ApiBackend, CameraIndex, CameraInfo, FrameFormat, RequestedFormat, RequestedFormatType},
};

use super::rgba_converter;
use crate::{
    error::AppError,
    types::{Frame, SampleBuffer},
};

// NV12 first: full-range bi-planar 4:2:0 is what the analysis path is tuned
// for. The rest are what macOS and V4L2 drivers commonly report.
const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
    FrameFormat::NV12,
    FrameFormat::YUYV,
    FrameFormat::RAWRGB,
    FrameFormat::RAWBGR,
    FrameFormat::MJPEG,
    FrameFormat::GRAY,
];

// About one second of frames at 30fps.
const MAX_CONSECUTIVE_READ_FAILURES: u32 = 30;
const READ_RETRY_DELAY: Duration = Duration::from_millis(30);

fn requested_formats() -> [RequestedFormat<'static>; 3] {
    [
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestResolution,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestFrameRate,
            PREFERRED_PIXEL_FORMATS,
        ),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
    ]
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DevicePosition {
    Front,
    Back,
    /// Desktop webcams usually report no facing at all.
    Unspecified,
}

impl DevicePosition {
    pub fn from_label(label: &str) -> Self {
        let label = label.to_ascii_lowercase();
        const FRONT_HINTS: &[&str] = &["front", "facetime", "integrated", "built-in", "internal"];
        const BACK_HINTS: &[&str] = &["back", "rear"];

        if FRONT_HINTS.iter().any(|hint| label.contains(hint)) {
            DevicePosition::Front
        } else if BACK_HINTS.iter().any(|hint| label.contains(hint)) {
            DevicePosition::Back
        } else {
            DevicePosition::Unspecified
        }
    }
}

#[derive(Clone, Debug)]
pub struct CameraDevice {
    pub index: CameraIndex,
    pub label: String,
    pub position: DevicePosition,
}

impl CameraDevice {
    pub fn new(index: CameraIndex, label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            index,
            position: DevicePosition::from_label(&label),
            label,
        }
    }
}

/// Picks the named external camera when present, otherwise the default
/// front-facing camera.
pub fn select_device<'a>(
    devices: &'a [CameraDevice],
    preferred_label: &str,
) -> Result<&'a CameraDevice, AppError> {
    if let Some(external) = devices.iter().find(|d| d.label == preferred_label) {
        return Ok(external);
    }

    devices
        .iter()
        .find(|d| d.position == DevicePosition::Front)
        .or_else(|| {
            devices
                .iter()
                .find(|d| d.position == DevicePosition::Unspecified)
        })
        .ok_or_else(|| AppError::capture_setup("Could not find a front facing camera."))
}

/// Where captured frames go: the live preview and the analysis worker. Both
/// are single-slot channels; a full slot means the frame arrived late and is
/// dropped. Failures of the capture thread go to `errors`.
#[derive(Clone, Debug)]
pub struct FrameOutputs {
    pub preview: Sender<Frame>,
    pub samples: Sender<SampleBuffer>,
    pub errors: Sender<AppError>,
}

impl FrameOutputs {
    pub fn deliver(&self, sample: SampleBuffer) {
        if let Some(frame) = &sample.image {
            let _ = self.preview.try_send(frame.clone());
        }
        let _ = self.samples.try_send(sample);
    }
}

/// Camera service consumed by the capture session.
pub trait VideoSource: Clone + Send + 'static {
    fn devices(&self) -> Result<Vec<CameraDevice>, AppError>;

    /// Opens `device` once so configuration errors surface before any thread
    /// is spawned.
    fn probe(&self, device: &CameraDevice) -> Result<(), AppError>;

    /// Runs on the capture thread, delivering frames until `running` clears.
    /// An error ends the session and is shown to the user.
    fn run_capture(
        &self,
        device: &CameraDevice,
        running: &AtomicBool,
        outputs: &FrameOutputs,
    ) -> Result<(), AppError>;
}

/// Tracks frame reads failing back to back. A device that keeps failing has
/// been unplugged or taken by another process.
#[derive(Debug, Default)]
pub(crate) struct ReadFailures {
    consecutive: u32,
}

impl ReadFailures {
    pub(crate) fn succeeded(&mut self) {
        self.consecutive = 0;
    }

    pub(crate) fn failed(&mut self, err: impl fmt::Display) -> Result<(), AppError> {
        self.consecutive += 1;
        if self.consecutive >= MAX_CONSECUTIVE_READ_FAILURES {
            return Err(AppError::capture_interrupted(format!(
                "Lost connection to the video device: {err}"
            )));
        }
        log::warn!(
            "camera frame read failed ({}/{MAX_CONSECUTIVE_READ_FAILURES}): {err}",
            self.consecutive
        );
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NokhwaSource;

impl VideoSource for NokhwaSource {
    fn devices(&self) -> Result<Vec<CameraDevice>, AppError> {
        let cameras = query(ApiBackend::Auto).map_err(|err| {
            AppError::capture_setup(format!("Could not enumerate video devices: {err}"))
        })?;
        Ok(cameras.iter().map(device_from_info).collect())
    }

    fn probe(&self, device: &CameraDevice) -> Result<(), AppError> {
        let mut camera = open_camera(&device.index)?;
        let format = camera.camera_format();
        log::info!(
            "camera {} negotiated {} {}x{} @ {}fps",
            device.label,
            format.format(),
            format.resolution().width_x,
            format.resolution().height_y,
            format.frame_rate()
        );
        if let Err(err) = camera.stop_stream() {
            log::warn!("failed to release camera after probe: {err:?}");
        }
        Ok(())
    }

    fn run_capture(
        &self,
        device: &CameraDevice,
        running: &AtomicBool,
        outputs: &FrameOutputs,
    ) -> Result<(), AppError> {
        let mut camera = open_camera(&device.index).inspect_err(|err| {
            log::error!("failed to open camera {}: {err}", device.label);
        })?;

        let mut failures = ReadFailures::default();
        let result = loop {
            if !running.load(Ordering::Relaxed) {
                break Ok(());
            }
            let buffer = match camera.frame() {
                Ok(buffer) => {
                    failures.succeeded();
                    buffer
                }
                Err(err) => {
                    if let Err(lost) = failures.failed(err) {
                        break Err(lost);
                    }
                    thread::sleep(READ_RETRY_DELAY);
                    continue;
                }
            };

            let sample = match rgba_converter::decode_pixel_buffer(&buffer) {
                Ok(Some(frame)) => SampleBuffer::with_image(frame),
                Ok(None) => SampleBuffer::empty(),
                Err(err) => {
                    log::warn!("failed to decode camera frame: {err:?}");
                    SampleBuffer::empty()
                }
            };
            outputs.deliver(sample);
        };

        if let Err(err) = camera.stop_stream() {
            log::warn!("failed to stop camera stream: {err:?}");
        }
        result
    }
}

fn device_from_info(info: &CameraInfo) -> CameraDevice {
    CameraDevice::new(info.index().clone(), info.human_name())
}

fn open_camera(index: &CameraIndex) -> Result<Camera, AppError> {
    let mut input_built = false;
    let mut last_err: Option<NokhwaError> = None;

    for requested in requested_formats() {
        match Camera::new(index.clone(), requested) {
            Ok(mut camera) => {
                input_built = true;
                match camera.open_stream() {
                    Ok(()) => return Ok(camera),
                    Err(err) => last_err = Some(err),
                }
            }
            Err(err) => last_err = Some(err),
        }
    }

    if let Some(err) = &last_err {
        log::warn!("camera {index} rejected every requested format: {err:?}");
    }
    if input_built {
        Err(AppError::capture_setup(
            "Could not add video device input to the session",
        ))
    } else {
        Err(AppError::capture_setup("Could not create video device input."))
    }
}

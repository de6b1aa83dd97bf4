use std::path::Path;
use std::sync::Arc;

use mpo3d_camera::{CalibrationError, CalibrationReport, StereoCamera, MIN_CALIBRATION_PAIRS};
use mpo3d_container::decode_file;
use mpo3d_core::Real;
use mpo3d_image::{ImageBuffer, PatternKind};
use mpo3d_surface::{Mesh, SurfaceBuilder};

use crate::{NotificationBus, Observer, PipelineError, ReconstructionConfig, StateView};

/// Owner of the current image, stereo camera and mesh.
///
/// Mutating calls take `&mut self`, so at most one pipeline run is in
/// flight per orchestrator.
#[derive(Debug)]
pub struct Reconstructor {
    camera: StereoCamera,
    surface: SurfaceBuilder,
    image: Option<ImageBuffer>,
    mesh: Option<Mesh>,
    bus: NotificationBus,
}

impl Reconstructor {
    /// Orchestrator whose camera is loaded from the configured parameter
    /// store, if one can be read.
    pub fn new(config: ReconstructionConfig) -> Self {
        let camera = StereoCamera::open(config.camera, config.sgbm);
        Self::with_camera(camera, SurfaceBuilder::new(config.surface))
    }

    pub fn with_camera(camera: StereoCamera, surface: SurfaceBuilder) -> Self {
        Self {
            camera,
            surface,
            image: None,
            mesh: None,
            bus: NotificationBus::new(),
        }
    }

    /// The image last produced by [`open`](Self::open) or
    /// [`calibrate`](Self::calibrate).
    pub fn image(&self) -> Option<&ImageBuffer> {
        self.image.as_ref()
    }

    /// The mesh of the last container opened with a calibrated camera.
    pub fn mesh(&self) -> Option<&Mesh> {
        self.mesh.as_ref()
    }

    pub fn camera(&self) -> &StereoCamera {
        &self.camera
    }

    pub fn state(&self) -> StateView<'_> {
        StateView {
            image: self.image.as_ref(),
            mesh: self.mesh.as_ref(),
            camera: &self.camera,
        }
    }

    pub fn attach(&mut self, observer: Arc<dyn Observer>) -> bool {
        self.bus.attach(observer)
    }

    pub fn detach(&mut self, observer: &Arc<dyn Observer>) -> bool {
        self.bus.detach(observer)
    }

    fn notify(&self) {
        self.bus.notify(&self.state());
    }

    /// Open a stereo container.
    ///
    /// With a calibrated camera the pair is reconstructed and triangulated,
    /// and the display image becomes the rectified pair followed by the
    /// disparity rendering. Otherwise the display image is the raw pair and
    /// the mesh is cleared.
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<(), PipelineError> {
        let path = path.as_ref();
        let (left, right) = decode_file(path)?;
        log::info!("opened {}", path.display());

        if !self.camera.is_valid() {
            log::info!("camera is not calibrated; showing the raw pair");
            let image = ImageBuffer::concatenate_horizontally(&[left, right])?;
            self.image = Some(image);
            self.mesh = None;
            self.notify();
            return Ok(());
        }

        let mut camera = self.camera.clone();
        let rec = camera.reconstruct(&left, &right)?;
        let disparity = rec.disparity.visualize().convert(rec.left_rectified.format())?;
        let mesh = self.surface.build(rec.cloud)?;
        let image = ImageBuffer::concatenate_horizontally(&[
            rec.left_rectified,
            rec.right_rectified,
            disparity,
        ])?;

        self.camera = camera;
        self.image = Some(image);
        self.mesh = Some(mesh);
        self.notify();
        Ok(())
    }

    /// Calibrate the stereo camera from containers showing a planar target.
    ///
    /// At least [`MIN_CALIBRATION_PAIRS`] containers are required. On
    /// success the display image becomes the left samples with the detected
    /// points drawn on them; the mesh is kept.
    pub fn calibrate<P: AsRef<Path>>(
        &mut self,
        paths: &[P],
        pattern: PatternKind,
        rows: usize,
        cols: usize,
        spacing: Real,
    ) -> Result<CalibrationReport, PipelineError> {
        if paths.len() < MIN_CALIBRATION_PAIRS {
            return Err(CalibrationError::InsufficientSamples {
                required: MIN_CALIBRATION_PAIRS,
                got: paths.len(),
            }
            .into());
        }

        let mut left = Vec::with_capacity(paths.len());
        let mut right = Vec::with_capacity(paths.len());
        for path in paths {
            let (l, r) = decode_file(path)?;
            left.push(l);
            right.push(r);
        }

        let mut camera = self.camera.clone();
        let report = camera.calibrate(&left, &right, pattern, rows, cols, spacing)?;
        let annotated = left
            .iter()
            .zip(&report.left_points)
            .map(|(img, points)| img.draw_pattern(points, cols))
            .collect::<Result<Vec<_>, _>>()?;
        let image = ImageBuffer::concatenate_horizontally(&annotated)?;

        self.camera = camera;
        self.image = Some(image);
        self.notify();
        Ok(report)
    }
}

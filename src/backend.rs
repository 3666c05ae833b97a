//! Delegation seam to the DIALS data-reduction toolkit.
//!
//! All scientific computation (spot detection, reciprocal-space mapping,
//! pixel rendering) happens outside this crate. The [`AnalysisBackend`]
//! trait is the boundary; [`SubprocessBackend`] is the production
//! implementation, which invokes the toolkit's helper executables.
//!
//! # Helper Contract
//!
//! Each helper reads the request parameters as JSON on stdin and writes the
//! result as JSON on stdout. Exit codes:
//!
//! - `0` - success, result on stdout
//! - `2` - the input image file does not exist
//! - `3` - the parameters were rejected by the toolkit
//! - anything else - failure, diagnostics on stderr
//!
//! The bitmap helper returns raw RGB pixels (base64-encoded) rather than an
//! encoded image; this service performs the final encoding so that the
//! response format is controlled in one place.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::BackendError;

// =============================================================================
// Spot-Finding Parameters
// =============================================================================

/// Spot-finding threshold algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdAlgorithm {
    #[default]
    Dispersion,
}

/// Parameters for per-image spot-finding analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindSpotsParams {
    /// Image file path, or a template like `image_#####.cbf`
    pub filename: PathBuf,

    /// High-resolution cutoff in ångströms
    #[serde(default)]
    pub d_min: Option<f64>,

    /// Low-resolution cutoff in ångströms
    #[serde(default = "default_d_max")]
    pub d_max: Option<f64>,

    #[serde(default)]
    pub threshold_algorithm: ThresholdAlgorithm,

    #[serde(default = "default_true")]
    pub disable_parallax_correction: bool,

    /// 1-based inclusive image range, accepted as `[i, j]` or `"i,j"`
    #[serde(default, deserialize_with = "deserialize_scan_range")]
    pub scan_range: Option<(u32, u32)>,

    /// Exclude spots at ice-ring resolutions from the statistics
    #[serde(default = "default_true")]
    pub filter_ice: bool,

    /// Half-width of the ice-ring resolution bands, in 1/d² units
    #[serde(default = "default_ice_rings_width")]
    pub ice_rings_width: f64,
}

fn default_d_max() -> Option<f64> {
    Some(40.0)
}

fn default_true() -> bool {
    true
}

fn default_ice_rings_width() -> f64 {
    0.004
}

fn deserialize_scan_range<'de, D>(deserializer: D) -> Result<Option<(u32, u32)>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Pair((u32, u32)),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Pair(pair)) => Ok(Some(pair)),
        Some(Raw::Text(text)) => {
            let mut parts = text.split(',').map(|part| part.trim().parse::<u32>());
            match (parts.next(), parts.next(), parts.next()) {
                (Some(Ok(start)), Some(Ok(end)), None) => Ok(Some((start, end))),
                _ => Err(serde::de::Error::custom(format!(
                    "invalid scan_range: {text:?} (expected \"start,end\")"
                ))),
            }
        }
    }
}

impl FindSpotsParams {
    /// Shallow validation of numeric bounds; the toolkit does the rest.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(d_min) = self.d_min {
            if d_min <= 0.0 {
                return Err(format!("d_min must be positive, got {d_min}"));
            }
        }
        if let Some(d_max) = self.d_max {
            if d_max <= 0.0 {
                return Err(format!("d_max must be positive, got {d_max}"));
            }
        }
        if self.ice_rings_width < 0.0 {
            return Err(format!(
                "ice_rings_width must be non-negative, got {}",
                self.ice_rings_width
            ));
        }
        if let Some((start, end)) = self.scan_range {
            if start < 1 || start > end {
                return Err(format!(
                    "scan_range must satisfy 1 <= start <= end, got ({start}, {end})"
                ));
            }
        }
        Ok(())
    }
}

/// Per-image spot-finding statistics, as computed by the toolkit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotfindingStats {
    /// Number of spots at resolution 4 Å or better
    #[serde(rename = "n_spots_4A")]
    pub n_spots_4a: u64,

    /// Number of spots excluding ice-ring resolutions
    pub n_spots_no_ice: u64,

    /// Total number of spots found
    pub n_spots_total: u64,

    /// Summed intensity of all spots
    pub total_intensity: f64,

    #[serde(default)]
    pub d_min_distl_method_1: Option<f64>,

    #[serde(default)]
    pub d_min_distl_method_2: Option<f64>,

    #[serde(default)]
    pub estimated_d_min: Option<f64>,

    #[serde(default)]
    pub noisiness_method_1: Option<f64>,

    #[serde(default)]
    pub noisiness_method_2: Option<f64>,
}

// =============================================================================
// Bitmap Export Parameters
// =============================================================================

/// Output image format for bitmap export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BitmapFormat {
    #[default]
    Png,
    Jpeg,
    Tiff,
}

impl BitmapFormat {
    /// The MIME type for HTTP responses.
    pub fn media_type(&self) -> &'static str {
        match self {
            BitmapFormat::Png => "image/png",
            BitmapFormat::Jpeg => "image/jpeg",
            BitmapFormat::Tiff => "image/tiff",
        }
    }

    /// The corresponding `image` crate format for encoding.
    pub fn image_format(&self) -> image::ImageFormat {
        match self {
            BitmapFormat::Png => image::ImageFormat::Png,
            BitmapFormat::Jpeg => image::ImageFormat::Jpeg,
            BitmapFormat::Tiff => image::ImageFormat::Tiff,
        }
    }
}

/// Pixel colour mapping for rendered images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColourScheme {
    #[default]
    Greyscale,
    Rainbow,
    Heatmap,
    InverseGreyscale,
}

/// Which derived image to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    #[default]
    Image,
    Mean,
    Variance,
    Dispersion,
    SigmaB,
    SigmaS,
    Threshold,
    GlobalThreshold,
}

/// Resolution-ring overlay options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionRingsParams {
    #[serde(default)]
    pub show: bool,

    #[serde(default = "default_ring_number")]
    pub number: u32,

    #[serde(default = "default_fontsize")]
    pub fontsize: u32,

    #[serde(default = "default_resolution_fill")]
    pub fill: String,
}

impl Default for ResolutionRingsParams {
    fn default() -> Self {
        Self {
            show: false,
            number: default_ring_number(),
            fontsize: default_fontsize(),
            fill: default_resolution_fill(),
        }
    }
}

fn default_ring_number() -> u32 {
    5
}

fn default_fontsize() -> u32 {
    30
}

fn default_resolution_fill() -> String {
    "red".to_string()
}

/// A space group, given either by number or by Hermann-Mauguin symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpaceGroup {
    Number(u32),
    Symbol(String),
}

/// Ice-ring overlay options.
///
/// Defaults describe hexagonal ice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceRingsParams {
    #[serde(default)]
    pub show: bool,

    #[serde(default = "default_fontsize")]
    pub fontsize: u32,

    #[serde(default = "default_ice_fill")]
    pub fill: String,

    /// Unit cell parameters (a, b, c, alpha, beta, gamma)
    #[serde(default = "default_ice_unit_cell")]
    pub unit_cell: [f64; 6],

    #[serde(default = "default_ice_space_group")]
    pub space_group: SpaceGroup,
}

impl Default for IceRingsParams {
    fn default() -> Self {
        Self {
            show: false,
            fontsize: default_fontsize(),
            fill: default_ice_fill(),
            unit_cell: default_ice_unit_cell(),
            space_group: default_ice_space_group(),
        }
    }
}

fn default_ice_fill() -> String {
    "blue".to_string()
}

/// Hexagonal ice unit cell (a, b, c, alpha, beta, gamma).
fn default_ice_unit_cell() -> [f64; 6] {
    [4.498, 4.498, 7.338, 90.0, 90.0, 120.0]
}

/// Hexagonal ice space group (number 194).
fn default_ice_space_group() -> SpaceGroup {
    SpaceGroup::Symbol("P 63/m m c".to_string())
}

/// Parameters for rendering a diffraction image as a bitmap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportBitmapParams {
    /// Image file path, or a template like `image_#####.cbf`
    pub filename: PathBuf,

    /// 1-based image index within a multi-image file
    #[serde(default = "default_image_index")]
    pub image_index: u32,

    #[serde(default)]
    pub format: BitmapFormat,

    /// Pixel binning factor to reduce output size
    #[serde(default = "default_binning")]
    pub binning: u32,

    #[serde(default)]
    pub display: DisplayMode,

    #[serde(default)]
    pub colour_scheme: ColourScheme,

    #[serde(default = "default_brightness")]
    pub brightness: f64,

    #[serde(default)]
    pub resolution_rings: ResolutionRingsParams,

    #[serde(default)]
    pub ice_rings: IceRingsParams,
}

fn default_image_index() -> u32 {
    1
}

fn default_binning() -> u32 {
    1
}

fn default_brightness() -> f64 {
    10.0
}

impl ExportBitmapParams {
    /// Shallow validation of numeric bounds; the toolkit does the rest.
    pub fn validate(&self) -> Result<(), String> {
        if self.image_index < 1 {
            return Err("image_index must be >= 1".to_string());
        }
        if self.binning < 1 {
            return Err("binning must be >= 1".to_string());
        }
        if self.brightness < 0.0 {
            return Err(format!(
                "brightness must be non-negative, got {}",
                self.brightness
            ));
        }
        if self.resolution_rings.number < 1 {
            return Err("resolution_rings.number must be >= 1".to_string());
        }
        let [a, b, c, alpha, beta, gamma] = self.ice_rings.unit_cell;
        for length in [a, b, c] {
            if length <= 0.0 {
                return Err(format!(
                    "invalid unit_cell {:?}: lengths must be positive",
                    self.ice_rings.unit_cell
                ));
            }
        }
        for angle in [alpha, beta, gamma] {
            if angle <= 0.0 || angle >= 180.0 {
                return Err(format!(
                    "invalid unit_cell {:?}: angles must be in (0, 180)",
                    self.ice_rings.unit_cell
                ));
            }
        }
        Ok(())
    }
}

/// Raw rendered image returned by the toolkit: RGB8, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBitmap {
    pub width: u32,
    pub height: u32,

    /// RGB8 pixel data, base64-encoded on the wire
    #[serde(with = "base64_bytes")]
    pub pixels: Vec<u8>,
}

/// Serde adapter for base64-encoded byte fields.
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64.decode(encoded).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Backend Trait
// =============================================================================

/// The boundary to the external analysis toolkit.
///
/// Implementations must be safe to call from concurrent requests.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Run spot-finding on an image and return per-image statistics.
    async fn find_spots(&self, params: &FindSpotsParams)
        -> Result<SpotfindingStats, BackendError>;

    /// Render an image as a raw RGB bitmap.
    async fn export_bitmap(&self, params: &ExportBitmapParams)
        -> Result<RawBitmap, BackendError>;
}

// =============================================================================
// Subprocess Backend
// =============================================================================

/// Exit code the helpers use when the input file does not exist.
const EXIT_FILE_NOT_FOUND: i32 = 2;

/// Exit code the helpers use when the toolkit rejects the parameters.
const EXIT_INVALID_INPUT: i32 = 3;

/// Production backend invoking the toolkit's helper executables.
#[derive(Debug, Clone)]
pub struct SubprocessBackend {
    find_spots_cmd: String,
    export_bitmap_cmd: String,
}

impl SubprocessBackend {
    /// Create a backend with the given helper program names.
    pub fn new(find_spots_cmd: impl Into<String>, export_bitmap_cmd: impl Into<String>) -> Self {
        Self {
            find_spots_cmd: find_spots_cmd.into(),
            export_bitmap_cmd: export_bitmap_cmd.into(),
        }
    }

    /// Run a helper, feeding it `input` on stdin and returning its stdout.
    async fn run(&self, program: &str, input: &[u8], path: &str) -> Result<Vec<u8>, BackendError> {
        debug!(program = program, "invoking analysis helper");

        let mut child = Command::new(program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input).await?;
        }

        let output = child.wait_with_output().await?;

        if output.status.success() {
            return Ok(output.stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        match output.status.code() {
            Some(EXIT_FILE_NOT_FOUND) => Err(BackendError::FileNotFound {
                path: path.to_string(),
            }),
            Some(EXIT_INVALID_INPUT) => Err(BackendError::InvalidInput { message: stderr }),
            _ => Err(BackendError::Failed { message: stderr }),
        }
    }
}

#[async_trait]
impl AnalysisBackend for SubprocessBackend {
    async fn find_spots(
        &self,
        params: &FindSpotsParams,
    ) -> Result<SpotfindingStats, BackendError> {
        let input = serde_json::to_vec(params).map_err(|e| BackendError::Decode {
            message: e.to_string(),
        })?;
        let stdout = self
            .run(
                &self.find_spots_cmd,
                &input,
                &params.filename.display().to_string(),
            )
            .await?;
        serde_json::from_slice(&stdout).map_err(|e| BackendError::Decode {
            message: e.to_string(),
        })
    }

    async fn export_bitmap(
        &self,
        params: &ExportBitmapParams,
    ) -> Result<RawBitmap, BackendError> {
        let input = serde_json::to_vec(params).map_err(|e| BackendError::Decode {
            message: e.to_string(),
        })?;
        let stdout = self
            .run(
                &self.export_bitmap_cmd,
                &input,
                &params.filename.display().to_string(),
            )
            .await?;
        serde_json::from_slice(&stdout).map_err(|e| BackendError::Decode {
            message: e.to_string(),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

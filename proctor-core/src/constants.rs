//! Central Configuration Constants
//!
//! Single source of truth for detection defaults.
//! `DetectionConfig::default()` is built from these values.

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "Exam Proctor";

// ============================================
// Audio
// ============================================

/// Volume level (0.0 - 1.0) above which a chunk counts as loud
pub const DEFAULT_VOLUME_THRESHOLD: f32 = 0.5;

/// Population std-dev of frequency magnitudes above which a chunk counts as
/// multi-voice / spiky
pub const DEFAULT_FREQUENCY_STD_THRESHOLD: f32 = 0.1;

// ============================================
// Head pose
// ============================================

/// Yaw within +/- this band (degrees) counts as centered
pub const DEFAULT_YAW_BAND_DEG: f32 = 15.0;

/// Pitch within +/- this band (degrees) counts as centered
pub const DEFAULT_PITCH_BAND_DEG: f32 = 12.0;

/// Hard bound for every reported angle
pub const MAX_ANGLE_DEG: f32 = 90.0;

// ============================================
// Face identity
// ============================================

/// Euclidean distance between L2-normalized embeddings below which two faces match
pub const DEFAULT_MAX_MATCH_DISTANCE: f32 = 0.6;

// ============================================
// Objects
// ============================================

/// Minimum detector confidence for a forbidden object to count
pub const DEFAULT_OBJECT_CONFIDENCE: f32 = 0.5;

/// Labels that are never allowed in frame
pub const DEFAULT_FORBIDDEN_LABELS: &[&str] = &["cell phone", "book", "laptop", "person"];

/// Label used for people in frame
pub const DEFAULT_PERSON_LABEL: &str = "person";

/// People allowed in frame (the candidate)
pub const DEFAULT_MAX_PERSON_COUNT: usize = 1;

// ============================================
// Input limits
// ============================================

/// Maximum accepted upload size (10 MB)
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Maximum decoded width
pub const DEFAULT_MAX_WIDTH: u32 = 4096;

/// Maximum decoded height
pub const DEFAULT_MAX_HEIGHT: u32 = 4096;

/// Maximum student identifier length
pub const MAX_STUDENT_ID_LEN: usize = 128;

// ============================================
// Storage
// ============================================

/// Data directory name under the platform local data dir
pub const DATA_DIR: &str = "proctor";

/// Default alert journal file name
pub const JOURNAL_FILE: &str = "alerts.jsonl";

/// Shards in the in-memory face reference store
pub const FACE_STORE_SHARDS: usize = 16;

/// Default data directory: `<local data dir>/proctor`
pub fn default_data_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(DATA_DIR)
}

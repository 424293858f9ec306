//! Configuration module

use std::env;
use std::path::PathBuf;

use proctor_core::DetectionConfig;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL URL; face references and alerts go to the database when set
    pub database_url: Option<String>,

    /// JSON-lines alert journal, used when no database is configured
    pub journal_path: Option<PathBuf>,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Detector thresholds, limits and model paths
    pub detection: DetectionConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> proctor_core::ProctorResult<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty()),

            journal_path: env::var("JOURNAL_PATH")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),

            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5000),

            environment: env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),

            detection: DetectionConfig::from_env()?,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Largest request body accepted: one image plus multipart framing
    pub fn body_limit(&self) -> usize {
        self.detection.limits.max_image_bytes + 64 * 1024
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            journal_path: None,
            port: 5000,
            environment: "development".to_string(),
            detection: DetectionConfig::default(),
        }
    }
}

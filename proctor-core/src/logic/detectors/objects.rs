//! Forbidden Object Detector
//!
//! Object detections filtered by label set and confidence. The person label
//! is special: one person (the candidate) is expected, so persons only count
//! once more than `max_person_count` are visible.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::logic::config::{AlertPolicy, ObjectConfig};
use crate::logic::error::ProctorResult;
use crate::logic::model::{Detection, ObjectLocator};
use crate::logic::signal::ImageFrame;
use super::verdict::{SignalKind, Verdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectStatus {
    Clear,
    ForbiddenObject,
}

impl ObjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectStatus::Clear => "clear",
            ObjectStatus::ForbiddenObject => "forbidden_object",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectVerdict {
    pub status: ObjectStatus,
    pub objects: Vec<Detection>,
}

impl Verdict for ObjectVerdict {
    fn signal_kind(&self) -> SignalKind {
        SignalKind::Object
    }

    fn status(&self) -> &'static str {
        self.status.as_str()
    }

    fn is_alert(&self, _policy: &AlertPolicy) -> bool {
        self.status == ObjectStatus::ForbiddenObject
    }

    fn label(&self) -> String {
        if self.objects.is_empty() {
            return "No forbidden objects".to_string();
        }
        let labels: BTreeSet<&str> = self.objects.iter().map(|d| d.label.as_str()).collect();
        format!("Forbidden object: {}", labels.into_iter().collect::<Vec<_>>().join(", "))
    }

    fn details(&self) -> serde_json::Value {
        json!({
            "status": self.status.as_str(),
            "objects": self.objects,
        })
    }
}

pub struct ForbiddenObjectDetector {
    locator: Arc<dyn ObjectLocator>,
    forbidden: HashSet<String>,
    person_label: String,
    confidence_threshold: f32,
    max_person_count: usize,
}

impl ForbiddenObjectDetector {
    pub fn new(locator: Arc<dyn ObjectLocator>, config: &ObjectConfig) -> Self {
        Self {
            locator,
            forbidden: config.forbidden_labels.iter().map(|l| l.trim().to_lowercase()).collect(),
            person_label: config.person_label.trim().to_lowercase(),
            confidence_threshold: config.confidence_threshold,
            max_person_count: config.max_person_count,
        }
    }

    pub fn detect(&self, frame: &ImageFrame) -> ProctorResult<ObjectVerdict> {
        let detections = self.locator.detect(frame)?;
        let confident: Vec<Detection> = detections
            .into_iter()
            .filter(|d| d.confidence >= self.confidence_threshold)
            .filter(|d| self.forbidden.contains(&d.label.trim().to_lowercase()))
            .collect();

        let (persons, others): (Vec<Detection>, Vec<Detection>) = confident
            .into_iter()
            .partition(|d| d.label.trim().eq_ignore_ascii_case(&self.person_label));

        let mut objects = others;
        if persons.len() > self.max_person_count {
            objects.extend(persons);
        }

        let status = if objects.is_empty() {
            ObjectStatus::Clear
        } else {
            ObjectStatus::ForbiddenObject
        };
        log::debug!("Object check via {}: {} forbidden", self.locator.name(), objects.len());

        Ok(ObjectVerdict { status, objects })
    }
}

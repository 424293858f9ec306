//! HTTP handlers

pub mod health;
pub mod alerts;
pub mod detection;
pub mod faces;


use std::collections::HashMap;

use axum::extract::Multipart;

use crate::{AppError, AppResult};

/// Multipart upload: one `image` file part plus plain text fields
#[derive(Debug, Default)]
pub struct UploadForm {
    image: Option<Vec<u8>>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            if name == "image" {
                form.image = Some(field.bytes().await?.to_vec());
            } else {
                form.fields.insert(name, field.text().await?);
            }
        }
        Ok(form)
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn take_image(&mut self) -> AppResult<Vec<u8>> {
        self.image
            .take()
            .filter(|bytes| !bytes.is_empty())
            .ok_or_else(|| AppError::ValidationError("image is required".to_string()))
    }
}

//! Database models and wire types

pub mod alert;
pub mod face;

pub use alert::{AlertQuery, AlertRecord, LogAlertRequest, PgAlertJournal};
pub use face::{PgFaceStore, RegisteredFacesResponse};

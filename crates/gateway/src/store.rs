use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use apptshare_contracts::Appointment;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for StoreError {}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StoreFile {
    appointments: Vec<Appointment>,
}

/// Read-only appointment graphs keyed by share link, loaded once at startup.
///
/// Each entry is already joined with creator, administrators, files and
/// enrollments; handlers borrow it and never write back.
#[derive(Debug, Default)]
pub struct AppointmentStore {
    by_link: HashMap<String, Arc<Appointment>>,
}

impl AppointmentStore {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|_| StoreError {
            code: "ERR_STORE_READ",
            message: format!("failed to read appointment store at {}", path.display()),
        })?;

        let file = serde_json::from_slice::<StoreFile>(&bytes).map_err(|err| StoreError {
            code: "ERR_STORE_PARSE",
            message: format!("invalid appointment store {}: {}", path.display(), err),
        })?;

        Self::from_appointments(file.appointments)
    }

    pub fn from_appointments(
        appointments: impl IntoIterator<Item = Appointment>,
    ) -> Result<Self, StoreError> {
        let mut by_link = HashMap::new();

        for mut appointment in appointments {
            let link = appointment.link.trim().to_string();
            appointment.link = link.clone();
            if link.is_empty() {
                return Err(StoreError {
                    code: "ERR_STORE_PARSE",
                    message: format!("appointment {} has an empty link", appointment.id),
                });
            }

            if by_link.insert(link.clone(), Arc::new(appointment)).is_some() {
                return Err(StoreError {
                    code: "ERR_STORE_PARSE",
                    message: format!("duplicate appointment link {}", link),
                });
            }
        }

        Ok(Self { by_link })
    }

    pub fn load_by_link(&self, link: &str) -> Option<Arc<Appointment>> {
        self.by_link.get(link).cloned()
    }

    pub fn is_hidden(&self, link: &str) -> Option<bool> {
        self.by_link.get(link).map(|appointment| appointment.hidden)
    }

    pub fn len(&self) -> usize {
        self.by_link.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_link.is_empty()
    }
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail: Option<String>,
}

impl UserRef {
    pub fn has_id(&self, user_id: &str) -> bool {
        self.id.as_deref() == Some(user_id)
    }

    /// Public face of a user: only `name` and `username` survive.
    pub fn basic(&self) -> UserRef {
        UserRef {
            id: None,
            name: self.name.clone(),
            username: self.username.clone(),
            mail: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Addition {
    pub id: String,
    pub name: String,
    pub order: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportService {
    Departure,
    Return,
    Both,
}

impl TransportService {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportService::Departure => "departure",
            TransportService::Return => "return",
            TransportService::Both => "both",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    pub seats: u32,
    pub service: TransportService,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Passenger {
    pub requirement: TransportService,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Base64 payload. Stripped from every projection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<Driver>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passenger: Option<Passenger>,
    #[serde(default)]
    pub additions: Vec<Addition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<UserRef>,
    /// Output-only; computed per viewer during projection.
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub created_by_viewer: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    pub link: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_enrollments: Option<u32>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub driver_addition: bool,
    pub creator: UserRef,
    #[serde(default)]
    pub administrators: Vec<UserRef>,
    #[serde(default)]
    pub additions: Vec<Addition>,
    #[serde(default)]
    pub files: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrollments: Option<Vec<Enrollment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

impl Appointment {
    pub fn enrollments(&self) -> &[Enrollment] {
        self.enrollments.as_deref().unwrap_or_default()
    }

    pub fn enrollment(&self, enrollment_id: &str) -> Option<&Enrollment> {
        self.enrollments().iter().find(|e| e.id == enrollment_id)
    }
}

/// Projected output shares the stored shape; projection only removes or
/// annotates, so any projection is itself a valid projection input.
pub type ProjectedAppointment = Appointment;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Viewer {
    Authenticated(String),
    Anonymous,
}

impl Viewer {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Viewer::Authenticated(user_id) => Some(user_id.as_str()),
            Viewer::Anonymous => None,
        }
    }

    pub fn is_creator_of(&self, appointment: &Appointment) -> bool {
        self.user_id()
            .is_some_and(|user_id| appointment.creator.has_id(user_id))
    }

    pub fn is_administrator_of(&self, appointment: &Appointment) -> bool {
        self.user_id().is_some_and(|user_id| {
            appointment
                .administrators
                .iter()
                .any(|admin| admin.has_id(user_id))
        })
    }

    pub fn created(&self, enrollment: &Enrollment) -> bool {
        match (self.user_id(), enrollment.creator.as_ref()) {
            (Some(user_id), Some(creator)) => creator.has_id(user_id),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Viewer::Authenticated(_) => "authenticated",
            Viewer::Anonymous => "anonymous",
        }
    }
}

//! Capability-token access control for shared appointments.
//!
//! Hidden appointments only reveal the enrollments a viewer can prove a
//! claim to. Proof is either a role on the appointment (creator or
//! administrator) or possession of a per-enrollment capability token derived
//! from a server secret. Everything here is pure: no I/O, no logging, no
//! shared mutable state.

use apptshare_contracts::{Appointment, ProjectedAppointment, Viewer};

pub mod permission;
pub mod projection;
pub mod token;
pub mod visibility;

pub use permission::{PermissionEntry, PermissionSet, parse_query_pairs, permission_query};
pub use projection::{ProjectionOptions, project};
pub use token::{TokenEncoding, TokenGenerator, TokenSecret, TokenSecretError};
pub use visibility::{DisclosureDecision, DisclosureReason, decide, may_manage_enrollment};

/// A projection together with the inputs that shaped it.
#[derive(Debug, Clone)]
pub struct Projection {
    pub appointment: ProjectedAppointment,
    pub decision: DisclosureDecision,
    pub permissions: PermissionSet,
}

pub fn evaluate(
    appointment: &Appointment,
    viewer: &Viewer,
    raw_permissions: &[(String, String)],
    tokens: &TokenGenerator,
    options: ProjectionOptions,
) -> Projection {
    let permissions = PermissionSet::parse(raw_permissions, tokens);
    let decision = decide(appointment, viewer, &permissions.permitted_ids());
    let appointment = project(appointment, &decision, viewer, options);

    Projection {
        appointment,
        decision,
        permissions,
    }
}

pub fn project_for_viewer(
    appointment: &Appointment,
    viewer: &Viewer,
    raw_permissions: &[(String, String)],
    tokens: &TokenGenerator,
    options: ProjectionOptions,
) -> ProjectedAppointment {
    evaluate(appointment, viewer, raw_permissions, tokens, options).appointment
}

use apptshare_contracts::{
    Addition, Appointment, Attachment, Enrollment, ProjectedAppointment, Viewer,
};

use crate::visibility::DisclosureDecision;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionOptions {
    /// List/summary shape: the enrollment collection is omitted.
    pub slim: bool,
    /// Keep enrollment creator references (reduced to name and username).
    pub keep_enrollment_creators: bool,
}

/// Reshapes an appointment for one viewer. Total; never fails.
///
/// Steps run in a fixed order: enrollment filtering, creator metadata,
/// slim flattening, field redaction, then ordering of additions.
pub fn project(
    appointment: &Appointment,
    decision: &DisclosureDecision,
    viewer: &Viewer,
    options: ProjectionOptions,
) -> ProjectedAppointment {
    let mut out = appointment.clone();

    if let Some(enrollments) = out.enrollments.as_mut() {
        enrollments.retain(|enrollment| decision.discloses(&enrollment.id));
    }

    if !decision.disclose_creator_metadata {
        out.created = None;
        out.last_updated = None;
    }

    if options.slim {
        out.enrollments = None;
    }

    out.creator = out.creator.basic();
    out.administrators = out.administrators.iter().map(|admin| admin.basic()).collect();
    out.files = out.files.iter().map(basic_attachment).collect();
    if let Some(enrollments) = out.enrollments.as_mut() {
        for enrollment in enrollments.iter_mut() {
            redact_enrollment(enrollment, viewer, options.keep_enrollment_creators);
        }
    }

    sort_additions(&mut out.additions);
    if let Some(enrollments) = out.enrollments.as_mut() {
        for enrollment in enrollments.iter_mut() {
            sort_additions(&mut enrollment.additions);
        }
    }

    out
}

fn basic_attachment(file: &Attachment) -> Attachment {
    Attachment {
        id: file.id.clone(),
        name: file.name.clone(),
        url: file.url.clone(),
        mime_type: None,
        data: None,
    }
}

fn redact_enrollment(enrollment: &mut Enrollment, viewer: &Viewer, keep_creator: bool) {
    // Derived from the creator reference alone; an incoming flag is never trusted.
    enrollment.created_by_viewer = Some(viewer.created(enrollment));

    enrollment.creator = if keep_creator {
        enrollment.creator.as_ref().map(|creator| creator.basic())
    } else {
        None
    };
}

fn sort_additions(additions: &mut [Addition]) {
    additions.sort_by_key(|addition| addition.order);
}

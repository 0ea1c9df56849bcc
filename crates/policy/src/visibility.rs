use std::collections::BTreeSet;

use apptshare_contracts::{Appointment, Viewer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisclosureReason {
    NotHidden,
    Creator,
    Administrator,
    Permissions,
}

impl DisclosureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DisclosureReason::NotHidden => "not_hidden",
            DisclosureReason::Creator => "creator",
            DisclosureReason::Administrator => "administrator",
            DisclosureReason::Permissions => "permissions",
        }
    }
}

/// What a viewer may see of one appointment.
///
/// Denial is a value, not an error: a stranger without permissions gets
/// `disclose_all_children = false` and an empty permitted set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisclosureDecision {
    pub disclose_all_children: bool,
    pub disclose_creator_metadata: bool,
    pub permitted_child_ids: BTreeSet<String>,
    pub reason: DisclosureReason,
}

impl DisclosureDecision {
    pub fn discloses(&self, child_id: &str) -> bool {
        self.disclose_all_children || self.permitted_child_ids.contains(child_id)
    }

    pub fn scope(&self) -> &'static str {
        if self.disclose_all_children {
            "all"
        } else {
            "scoped"
        }
    }
}

/// First matching rule wins: not hidden, creator, administrator, then
/// validated permissions intersected with the enrollments that exist.
pub fn decide(
    appointment: &Appointment,
    viewer: &Viewer,
    permitted_ids: &BTreeSet<String>,
) -> DisclosureDecision {
    let is_creator = viewer.is_creator_of(appointment);

    let reason = if !appointment.hidden {
        Some(DisclosureReason::NotHidden)
    } else if is_creator {
        Some(DisclosureReason::Creator)
    } else if viewer.is_administrator_of(appointment) {
        Some(DisclosureReason::Administrator)
    } else {
        None
    };

    match reason {
        Some(reason) => DisclosureDecision {
            disclose_all_children: true,
            disclose_creator_metadata: is_creator,
            permitted_child_ids: BTreeSet::new(),
            reason,
        },
        None => DisclosureDecision {
            disclose_all_children: false,
            disclose_creator_metadata: is_creator,
            permitted_child_ids: appointment
                .enrollments()
                .iter()
                .filter(|enrollment| permitted_ids.contains(&enrollment.id))
                .map(|enrollment| enrollment.id.clone())
                .collect(),
            reason: DisclosureReason::Permissions,
        },
    }
}

/// Whether the viewer may act on one enrollment, e.g. to be handed its
/// capability token again.
pub fn may_manage_enrollment(
    appointment: &Appointment,
    enrollment_id: &str,
    viewer: &Viewer,
    permitted_ids: &BTreeSet<String>,
) -> bool {
    let Some(enrollment) = appointment.enrollment(enrollment_id) else {
        return false;
    };

    viewer.is_creator_of(appointment)
        || viewer.is_administrator_of(appointment)
        || viewer.created(enrollment)
        || permitted_ids.contains(&enrollment.id)
}

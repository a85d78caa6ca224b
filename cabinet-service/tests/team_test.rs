mod common;

use cabinet_service::models::{Action, InvitationRole, MemberRole, Module, ModulePermission};
use cabinet_service::services::{CabinetStore, ServiceError, SetOverridesRequest};
use common::*;
use std::collections::BTreeMap;

fn write_agenda() -> SetOverridesRequest {
    let mut modules = BTreeMap::new();
    modules.insert(
        Module::Agenda,
        ModulePermission {
            can_read: true,
            can_write: true,
            can_delete: false,
        },
    );
    SetOverridesRequest { modules }
}

#[tokio::test]
async fn members_are_listed_with_effective_permissions() {
    let app = TestApp::new();
    let (cabinet, owner) = app.seed_cabinet_with_owner().await;
    let staff = app
        .seed_member(&cabinet, "staff@example.com", "Staff Member", MemberRole::Staff)
        .await;

    let members = app
        .state
        .team
        .list_members(&staff, cabinet.cabinet_id)
        .await
        .unwrap();
    assert_eq!(members.len(), 2);

    let owner_view = members
        .iter()
        .find(|m| m.actor_id == owner.actor_id)
        .unwrap();
    assert_eq!(owner_view.member_role, MemberRole::Owner);
    assert_eq!(owner_view.email.as_deref(), Some("ana.souza@example.com"));
    assert!(owner_view
        .permissions
        .has_permission(Module::Demands, Action::Delete));

    let outsider = new_identity("outsider@example.com", "Outsider");
    let result = app.state.team.list_members(&outsider, cabinet.cabinet_id).await;
    assert!(matches!(result, Err(ServiceError::PermissionDenied(_))));

    let admin = app.seed_admin().await;
    assert!(app
        .state
        .team
        .list_members(&admin, cabinet.cabinet_id)
        .await
        .is_ok());
}

#[tokio::test]
async fn only_managers_override_and_only_staff_are_targets() {
    let app = TestApp::new();
    let (cabinet, owner) = app.seed_cabinet_with_owner().await;
    let lead = app
        .seed_member(&cabinet, "lead@example.com", "Lead", MemberRole::Lead)
        .await;
    let staff = app
        .seed_member(&cabinet, "staff@example.com", "Staff", MemberRole::Staff)
        .await;
    let other_staff = app
        .seed_member(&cabinet, "other@example.com", "Other", MemberRole::Staff)
        .await;

    let by_staff = app
        .state
        .team
        .set_permission_overrides(&other_staff, cabinet.cabinet_id, staff.actor_id, write_agenda())
        .await;
    assert!(matches!(by_staff, Err(ServiceError::PermissionDenied(_))));

    let on_lead = app
        .state
        .team
        .set_permission_overrides(&owner, cabinet.cabinet_id, lead.actor_id, write_agenda())
        .await;
    assert!(matches!(on_lead, Err(ServiceError::Validation(_))));

    let set = app
        .state
        .team
        .set_permission_overrides(&lead, cabinet.cabinet_id, staff.actor_id, write_agenda())
        .await
        .unwrap();
    assert!(set.has_permission(Module::Agenda, Action::Write));

    // Replacing with an empty set restores the staff row.
    let set = app
        .state
        .team
        .set_permission_overrides(
            &lead,
            cabinet.cabinet_id,
            staff.actor_id,
            SetOverridesRequest {
                modules: BTreeMap::new(),
            },
        )
        .await
        .unwrap();
    assert!(!set.has_permission(Module::Agenda, Action::Write));
    assert!(set.has_permission(Module::Agenda, Action::Read));
}

#[tokio::test]
async fn removing_a_member_clears_their_access_and_invitations() {
    let app = TestApp::new();
    let (cabinet, owner) = app.seed_cabinet_with_owner().await;
    let staff = app
        .seed_member(&cabinet, "staff@example.com", "Staff", MemberRole::Staff)
        .await;
    app.state
        .team
        .set_permission_overrides(&owner, cabinet.cabinet_id, staff.actor_id, write_agenda())
        .await
        .unwrap();
    let pending = app
        .state
        .invitations
        .issue_invitation(
            &owner,
            team_request(cabinet.cabinet_id, "staff@example.com", InvitationRole::CabinetLead),
        )
        .await
        .unwrap();

    app.state
        .team
        .remove_member(&owner, cabinet.cabinet_id, staff.actor_id)
        .await
        .unwrap();

    assert!(app
        .store
        .find_membership(staff.actor_id, cabinet.cabinet_id)
        .await
        .unwrap()
        .is_none());
    assert!(app
        .store
        .list_permission_overrides(cabinet.cabinet_id, staff.actor_id)
        .await
        .unwrap()
        .is_empty());
    assert!(app
        .state
        .invitations
        .validate_invitation(&pending.token)
        .await
        .is_err());
    assert!(app
        .state
        .permissions
        .load_permissions(staff.actor_id, cabinet.cabinet_id)
        .await
        .is_denied());
}

#[tokio::test]
async fn owner_cannot_be_removed_and_only_owner_deletes_cabinet() {
    let app = TestApp::new();
    let (cabinet, owner) = app.seed_cabinet_with_owner().await;
    let lead = app
        .seed_member(&cabinet, "lead@example.com", "Lead", MemberRole::Lead)
        .await;

    let result = app
        .state
        .team
        .remove_member(&lead, cabinet.cabinet_id, owner.actor_id)
        .await;
    assert!(matches!(result, Err(ServiceError::Conflict(_))));

    let result = app
        .state
        .team
        .soft_delete_cabinet(&lead, cabinet.cabinet_id)
        .await;
    assert!(matches!(result, Err(ServiceError::PermissionDenied(_))));

    assert!(app
        .state
        .team
        .soft_delete_cabinet(&owner, cabinet.cabinet_id)
        .await
        .unwrap());
    assert!(!app
        .state
        .team
        .soft_delete_cabinet(&owner, cabinet.cabinet_id)
        .await
        .unwrap());

    let stored = app
        .store
        .find_cabinet(cabinet.cabinet_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.is_active());
    assert!(stored.deleted_utc.is_some());
}

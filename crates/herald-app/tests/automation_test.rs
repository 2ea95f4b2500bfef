//! Group membership automation against a recording client.

use std::sync::Arc;

use herald_app::{
    AutomationError, AutomationReport, ChaoticStore, GroupAutomationEngine, GroupConfigStore,
    MemberOutcome, MemoryStore, StoreOp, config::DEFAULT_AVATAR_URL,
};
use herald_core::{
    AntiFraudPolicy, GroupConfigUpdate, Jid, MembershipAction, MembershipEvent, OutboundContent,
};
use herald_harness::{SimClient, fixtures::group_metadata};

const GROUP: &str = "120363@g.us";

fn group() -> Jid {
    Jid::new(GROUP)
}

fn event(action: MembershipAction, members: &[&str]) -> MembershipEvent {
    MembershipEvent { group: group(), action, members: members.iter().map(Jid::new).collect() }
}

async fn configured(store: &MemoryStore, update: GroupConfigUpdate) {
    store.upsert(&group(), update).await.unwrap();
}

fn enabled() -> GroupConfigUpdate {
    GroupConfigUpdate { automation_enabled: Some(true), ..Default::default() }
}

fn engine(store: &MemoryStore, denylist: &[u16]) -> GroupAutomationEngine {
    GroupAutomationEngine::new(
        AntiFraudPolicy::new(denylist.iter().copied()),
        Arc::new(store.clone()),
        DEFAULT_AVATAR_URL,
    )
}

async fn apply(
    engine: &GroupAutomationEngine,
    client: &SimClient,
    action: MembershipAction,
    members: &[&str],
) -> AutomationReport {
    engine.on_membership_event(client, &event(action, members)).await
}

#[tokio::test]
async fn welcome_renders_placeholders_and_mentions_member() {
    let store = MemoryStore::new();
    configured(&store, GroupConfigUpdate {
        automation_enabled: Some(true),
        welcome_template: Some("Welcome @user to @gname (@count members)".to_string()),
        ..Default::default()
    })
    .await;
    let client = SimClient::new().with_group(group_metadata(GROUP, "Test", 5));

    let report = engine(&store, &[])
        .on_membership_event(&client, &event(MembershipAction::Add, &["123@s.whatsapp.net"]))
        .await;

    assert_eq!(report.outcomes[0].1, MemberOutcome::Welcomed);
    let sent = client.sent_to(&group());
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].content, OutboundContent::Text {
        text: "Welcome @123 to Test (5 members)".to_string(),
        mentions: vec![Jid::new("123@s.whatsapp.net")],
    });
}

#[tokio::test]
async fn denylisted_joiner_is_removed_even_with_automation_enabled() {
    let store = MemoryStore::new();
    configured(&store, enabled()).await;
    let client = SimClient::new().with_group(group_metadata(GROUP, "Test", 5));
    let member = "212600000000@s.whatsapp.net";

    let report = engine(&store, &[212])
        .on_membership_event(&client, &event(MembershipAction::Add, &[member]))
        .await;

    assert_eq!(report.outcomes[0].1, MemberOutcome::Rejected { code: 212 });
    assert_eq!(client.removed(), vec![(group(), Jid::new(member))]);
    let bodies: Vec<String> = client.sent().iter().map(|m| m.body().to_string()).collect();
    assert_eq!(bodies, vec!["212 number is not allowed"]);
}

#[tokio::test]
async fn denylisted_joiner_is_removed_from_unconfigured_group() {
    let store = MemoryStore::new();
    let client = SimClient::new();

    let member = "923001234567@s.whatsapp.net";

    let report = apply(&engine(&store, &[92]), &client, MembershipAction::Add, &[member]).await;

    assert_eq!(report.outcomes[0].1, MemberOutcome::Rejected { code: 92 });
    assert_eq!(client.removed().len(), 1);
}

#[tokio::test]
async fn group_denylist_applies_on_top_of_global() {
    let store = MemoryStore::new();
    configured(&store, GroupConfigUpdate {
        automation_enabled: Some(true),
        blocked_country_codes: Some(vec![44]),
        ..Default::default()
    })
    .await;
    let client = SimClient::new().with_group(group_metadata(GROUP, "Test", 3));

    let members = ["447700900000@s.whatsapp.net", "15550001@s.whatsapp.net"];

    let report = apply(&engine(&store, &[]), &client, MembershipAction::Add, &members).await;

    assert_eq!(report.outcomes[0].1, MemberOutcome::Rejected { code: 44 });
    assert_eq!(report.outcomes[1].1, MemberOutcome::Welcomed);
    assert_eq!(client.removed().len(), 1);
}

#[tokio::test]
async fn disabled_group_gets_no_goodbye() {
    let store = MemoryStore::new();
    configured(&store, GroupConfigUpdate::default()).await;
    let client = SimClient::new().with_group(group_metadata(GROUP, "Test", 3));

    let engine = engine(&store, &[]);
    let report = apply(&engine, &client, MembershipAction::Remove, &["123@s.whatsapp.net"]).await;

    assert_eq!(report.outcomes[0].1, MemberOutcome::Disabled);
    assert!(client.sent().is_empty());
}

#[tokio::test]
async fn unconfigured_group_gets_nothing() {
    let store = MemoryStore::new();
    let client = SimClient::new().with_group(group_metadata(GROUP, "Test", 3));

    for action in [MembershipAction::Add, MembershipAction::Remove, MembershipAction::Promote] {
        let report = apply(&engine(&store, &[]), &client, action, &["123@s.whatsapp.net"]).await;
        assert_eq!(report.outcomes[0].1, MemberOutcome::Unconfigured);
    }
    assert!(client.sent().is_empty());
    assert_eq!(client.metadata_requests(), 0);
}

#[tokio::test]
async fn goodbye_sent_when_enabled() {
    let store = MemoryStore::new();
    configured(&store, enabled()).await;
    let client = SimClient::new().with_group(group_metadata(GROUP, "Test", 3));

    let engine = engine(&store, &[]);
    let report = apply(&engine, &client, MembershipAction::Remove, &["123@s.whatsapp.net"]).await;

    assert_eq!(report.outcomes[0].1, MemberOutcome::FarewellSent);
    assert_eq!(client.sent()[0].body(), "Goodbye @123");
}

#[tokio::test]
async fn role_notices_ignore_the_enabled_flag() {
    let store = MemoryStore::new();
    configured(&store, GroupConfigUpdate::default()).await;
    let client = SimClient::new().with_group(group_metadata(GROUP, "Test", 3));

    let engine = engine(&store, &[]);
    let report = apply(&engine, &client, MembershipAction::Promote, &["5@s.whatsapp.net"]).await;

    assert_eq!(report.outcomes[0].1, MemberOutcome::RoleNoticeSent);
    assert_eq!(client.sent()[0].content, OutboundContent::Image {
        url: DEFAULT_AVATAR_URL.to_string(),
        caption: "[ PROMOTE - DETECTED ]\n\nName : @5\nStatus : Member -> Admin\nGroup : Test"
            .to_string(),
        mentions: vec![Jid::new("5@s.whatsapp.net")],
    });
}

#[tokio::test]
async fn picture_placeholder_sends_member_picture() {
    let store = MemoryStore::new();
    configured(&store, GroupConfigUpdate {
        automation_enabled: Some(true),
        welcome_template: Some("@pp Hi @user".to_string()),
        ..Default::default()
    })
    .await;
    let member = Jid::new("123@s.whatsapp.net");
    let client = SimClient::new()
        .with_group(group_metadata(GROUP, "Test", 3))
        .with_picture(&member, "https://pics.example/123.jpg");

    apply(&engine(&store, &[]), &client, MembershipAction::Add, &["123@s.whatsapp.net"]).await;

    match &client.sent()[0].content {
        OutboundContent::Image { url, caption, mentions } => {
            assert_eq!(url, "https://pics.example/123.jpg");
            assert_eq!(caption.trim(), "Hi @123");
            assert_eq!(mentions, &vec![member]);
        },
        other => panic!("expected image, got {other:?}"),
    }
}

#[tokio::test]
async fn metadata_failure_skips_only_that_member() {
    let store = MemoryStore::new();
    configured(&store, enabled()).await;
    let client = SimClient::new().with_group(group_metadata(GROUP, "Test", 3));
    client.fail_metadata(1);

    let members = ["1@s.whatsapp.net", "2@s.whatsapp.net", "3@s.whatsapp.net"];

    let report = apply(&engine(&store, &[]), &client, MembershipAction::Add, &members).await;

    assert!(matches!(report.outcomes[0].1, MemberOutcome::Failed(_)));
    assert_eq!(report.outcomes[1].1, MemberOutcome::Welcomed);
    assert_eq!(report.outcomes[2].1, MemberOutcome::Welcomed);
    assert_eq!(client.metadata_requests(), 2);
    assert_eq!(client.sent().len(), 2);
}

#[tokio::test]
async fn members_processed_in_order() {
    let store = MemoryStore::new();
    configured(&store, enabled()).await;
    let client = SimClient::new().with_group(group_metadata(GROUP, "Test", 3));

    let members = ["1@s.whatsapp.net", "2@s.whatsapp.net"];

    apply(&engine(&store, &[]), &client, MembershipAction::Add, &members).await;

    let mentioned: Vec<Jid> =
        client.sent().iter().flat_map(|m| m.content.mentions().to_vec()).collect();
    assert_eq!(mentioned, vec![Jid::new("1@s.whatsapp.net"), Jid::new("2@s.whatsapp.net")]);
}

#[tokio::test]
async fn send_failure_is_reported_per_member() {
    let store = MemoryStore::new();
    configured(&store, enabled()).await;
    let client = SimClient::new().with_group(group_metadata(GROUP, "Test", 3));
    client.fail_sends(true);

    let members = ["1@s.whatsapp.net", "2@s.whatsapp.net"];

    let report = apply(&engine(&store, &[]), &client, MembershipAction::Add, &members).await;

    assert!(report.outcomes.iter().all(|(_, o)| matches!(o, MemberOutcome::Failed(_))));
}

#[tokio::test]
async fn demote_notice_sent_with_picture() {
    let store = MemoryStore::new();
    configured(&store, GroupConfigUpdate::default()).await;
    let member = Jid::new("5@s.whatsapp.net");
    let client = SimClient::new()
        .with_group(group_metadata(GROUP, "Test", 3))
        .with_picture(&member, "https://pics.example/5.jpg");

    let report =
        apply(&engine(&store, &[]), &client, MembershipAction::Demote, &["5@s.whatsapp.net"]).await;

    assert_eq!(report.outcome(&member), Some(&MemberOutcome::RoleNoticeSent));
    assert_eq!(client.sent()[0].content, OutboundContent::Image {
        url: "https://pics.example/5.jpg".to_string(),
        caption: "[ DEMOTE - DETECTED ]\n\nName : @5\nStatus : Admin -> Member\nGroup : Test"
            .to_string(),
        mentions: vec![member],
    });
}

#[tokio::test]
async fn picture_placeholder_falls_back_to_default_avatar() {
    let store = MemoryStore::new();
    configured(&store, GroupConfigUpdate {
        automation_enabled: Some(true),
        goodbye_template: Some("@pp Bye @user".to_string()),
        ..Default::default()
    })
    .await;
    let client = SimClient::new().with_group(group_metadata(GROUP, "Test", 3));

    let report =
        apply(&engine(&store, &[]), &client, MembershipAction::Remove, &["7@s.whatsapp.net"]).await;

    assert_eq!(report.outcomes[0].1, MemberOutcome::FarewellSent);
    match &client.sent()[0].content {
        OutboundContent::Image { url, caption, .. } => {
            assert_eq!(url, DEFAULT_AVATAR_URL);
            assert_eq!(caption.trim(), "Bye @7");
        },
        other => panic!("expected image, got {other:?}"),
    }
}

fn chaotic_engine(store: &ChaoticStore<MemoryStore>, denylist: &[u16]) -> GroupAutomationEngine {
    GroupAutomationEngine::new(
        AntiFraudPolicy::new(denylist.iter().copied()),
        Arc::new(store.clone()),
        DEFAULT_AVATAR_URL,
    )
}

#[tokio::test]
async fn store_failure_skips_only_that_member() {
    let inner = MemoryStore::new();
    configured(&inner, enabled()).await;
    let store = ChaoticStore::new(inner, 0.0).only([StoreOp::FindGroup]);
    store.fail_next(1);
    let client = SimClient::new().with_group(group_metadata(GROUP, "Test", 3));
    let members = ["1@s.whatsapp.net", "2@s.whatsapp.net"];

    let engine = chaotic_engine(&store, &[]);
    let report = apply(&engine, &client, MembershipAction::Add, &members).await;

    assert!(matches!(report.outcomes[0].1, MemberOutcome::Failed(AutomationError::Store(_))));
    assert_eq!(report.outcomes[1].1, MemberOutcome::Welcomed);
    assert_eq!(client.sent().len(), 1);
    assert_eq!(store.injected(), 1);
}

#[tokio::test]
async fn global_denylist_holds_when_store_is_down() {
    let store = ChaoticStore::new(MemoryStore::new(), 1.0);
    let client = SimClient::new().with_group(group_metadata(GROUP, "Test", 3));
    let members = ["212600000000@s.whatsapp.net", "1@s.whatsapp.net"];

    let report =
        apply(&chaotic_engine(&store, &[212]), &client, MembershipAction::Add, &members).await;

    assert_eq!(report.outcomes[0].1, MemberOutcome::Rejected { code: 212 });
    assert!(matches!(report.outcomes[1].1, MemberOutcome::Failed(AutomationError::Store(_))));
    assert_eq!(client.removed(), vec![(group(), Jid::new("212600000000@s.whatsapp.net"))]);
}

#![cfg(test)]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use mirk::{
    base::{
        config::{Config, ConfigInner},
        templates::PACKAGE_BUILD_SUCCESS,
        types::{ExitStatus, Res, Void},
    },
    runtime::Runtime,
    service::{
        bus::{BusClient, BusError, GenericBusClient},
        chat::{ChatClient, ChatError, GenericChatClient, Room},
    },
};
use mockall::mock;
use serde_json::json;

// Mocks.

// Mock chat client for testing.

mock! {
    pub Chat {}

    #[async_trait]
    impl GenericChatClient for Chat {
        async fn login(&self, username: &str, password: &str) -> Void;
        async fn join_room(&self, room: &str) -> Res<Room>;
        async fn send_html(&self, room: &Room, html: &str) -> Void;
        async fn listen(&self) -> Void;
    }
}

// Mock bus client for testing.

mock! {
    pub Bus {}

    #[async_trait]
    impl GenericBusClient for Bus {
        async fn recv(&mut self) -> Res<Vec<Vec<u8>>>;
    }
}

/// Messages sent through the mock chat client, as `(room id, html)`.
type Sent = Arc<Mutex<Vec<(String, String)>>>;

fn room_id(alias: &str) -> String {
    format!("!{}:example.org", alias.trim_start_matches('#').split(':').next().unwrap_or_default())
}

/// A chat client that logs in, joins every room, and records every send.
///
/// Sends to any room whose ID is in `failing` return an error.
fn get_mock_chat(sent: Sent, failing: &'static [&'static str]) -> MockChat {
    let mut mock = MockChat::new();

    mock.expect_login().returning(|username, password| {
        assert_eq!(username, "mirk");
        assert_eq!(password, "secret");
        Ok(())
    });
    mock.expect_join_room().returning(|room| {
        Ok(Room {
            alias: room.to_string(),
            id: room_id(room),
        })
    });
    mock.expect_send_html().returning(move |room, html| {
        if failing.contains(&room.id.as_str()) {
            return Err(ChatError::SendFailed {
                room: room.alias.clone(),
                message: "M_FORBIDDEN".to_string(),
            }
            .into());
        }

        sent.lock().unwrap().push((room.id.clone(), html.to_string()));
        Ok(())
    });
    mock.expect_listen().returning(|| Ok(()));

    mock
}

/// A bus that yields `frames` in order, then fails.
fn get_mock_bus(frames: Vec<Vec<Vec<u8>>>) -> MockBus {
    let mut frames = VecDeque::from(frames);
    let mut mock = MockBus::new();

    mock.expect_recv().returning(move || {
        frames.pop_front().ok_or_else(|| {
            BusError::Receive {
                message: "socket closed".to_string(),
            }
            .into()
        })
    });

    mock
}

fn frame(tag: &str, data: serde_json::Value) -> Vec<Vec<u8>> {
    let payload = json!({ "tag": tag, "uuid": "8a4c1d0e", "data": data });
    vec![tag.as_bytes().to_vec(), payload.to_string().into_bytes()]
}

fn test_config(rooms: &[&str]) -> Config {
    Config {
        inner: Arc::new(ConfigInner {
            host: "https://matrix.example.org".to_string(),
            username: "mirk".to_string(),
            password: "secret".to_string(),
            rooms: rooms.iter().map(|r| r.to_string()).collect(),
            webview_url: "https://lk.example.org/".to_string(),
            webswview_url: "https://sw.example.org".to_string(),
            sync_timeout_secs: 30,
            ..Default::default()
        }),
    }
}

/// Helper function to set up a started runtime.
async fn setup_test_runtime(rooms: &[&str], frames: Vec<Vec<Vec<u8>>>, sent: Sent, failing: &'static [&'static str]) -> Runtime {
    let config = test_config(rooms);
    let bus = BusClient::new(Box::new(get_mock_bus(frames)));
    let chat = ChatClient::new(Arc::new(get_mock_chat(sent, failing)));

    Runtime::new(&config, bus, chat).await.map_err(|e| e.to_string()).expect("runtime should start")
}

#[tokio::test]
async fn test_relays_events_in_bus_order_to_every_room() {
    let sent = Sent::default();
    let frames = vec![
        frame("_lk.job.package-build-success", json!({ "pkgname": "foo", "version": "1.0", "architecture": "amd64" })),
        frame(
            "_lk.synchrotron.autosync-issue",
            json!({
                "name": "bar",
                "src_os": "debian",
                "src_suite": "sid",
                "dest_suite": "unstable",
                "src_version": "2.0",
                "dest_version": "1.9",
                "kind": "conflict"
            }),
        ),
        frame("_lk.unknown.thing", json!({ "x": 1 })),
        frame("_lk.jobs.job-finished", json!({ "job_id": "42", "result": "success" })),
    ];

    let mut runtime = setup_test_runtime(&["#archive:example.org", "#builds:example.org"], frames, sent.clone(), &[]).await;

    // The loop only ends when the bus fails.
    let err = runtime.start().await.unwrap_err();
    assert_eq!(ExitStatus::of(&err), ExitStatus::Bus);

    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 8);

    // Each event goes to every room, in room order, before the next event.
    let rooms: Vec<&str> = sent.iter().map(|(room, _)| room.as_str()).collect();
    assert_eq!(rooms, vec!["!archive:example.org", "!builds:example.org"].repeat(4));

    let success = PACKAGE_BUILD_SUCCESS.replace("{pkgname}", "foo").replace("{version}", "1.0").replace("{architecture}", "amd64");
    assert_eq!(sent[0].1, success);
    assert_eq!(sent[1].1, success);

    for field in ["bar", "debian", "sid", "unstable", "2.0", "1.9", "conflict"] {
        assert!(sent[2].1.contains(field), "missing {field} in {}", sent[2].1);
    }

    assert_eq!(sent[4].1, "Received event type <code>_lk.unknown.thing</code> with data <code>{&quot;x&quot;:1}</code>");

    // The trailing slash on the web view URL is not doubled.
    assert_eq!(sent[6].1, r#"Job <a href="https://lk.example.org/jobs/job/42">42</a> finished with result success"#);
}

#[tokio::test]
async fn test_undecodable_messages_are_skipped() {
    let sent = Sent::default();
    let frames = vec![
        vec![b"_lk.bad".to_vec(), vec![0xff, 0xfe]],
        vec![b"_lk.bad".to_vec(), b"{not json".to_vec()],
        vec![b"_lk.bad".to_vec(), br#"{"tag": "_lk.bad"}"#.to_vec()],
        vec![b"only-one-part".to_vec()],
        frame("_lk.rubicon.upload-rejected", json!({ "dud_filename": "foo.dud", "reason": "bad signature" })),
    ];

    let mut runtime = setup_test_runtime(&["#archive:example.org"], frames, sent.clone(), &[]).await;

    let err = runtime.start().await.unwrap_err();
    assert!(err.downcast_ref::<BusError>().is_some());

    let sent = sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, "<b>Rejected</b> upload <code>foo.dud</code>. Reason: bad signature");
}

#[tokio::test]
async fn test_failing_room_does_not_block_the_others() {
    let sent = Sent::default();
    let runtime = setup_test_runtime(
        &["#one:example.org", "#two:example.org", "#three:example.org"],
        vec![],
        sent.clone(),
        &["!two:example.org"],
    )
    .await;

    let delivered = runtime.relay(&frame("_lk.jobs.job-accepted", json!({ "job_id": "7", "client_name": "builder-1" }))).await;

    assert_eq!(delivered, 2);

    let sent = sent.lock().unwrap();
    let rooms: Vec<&str> = sent.iter().map(|(room, _)| room.as_str()).collect();
    assert_eq!(rooms, vec!["!one:example.org", "!three:example.org"]);
}

#[tokio::test]
async fn test_forced_variant_is_relayed() {
    let sent = Sent::default();
    let runtime = setup_test_runtime(&["#archive:example.org"], vec![], sent.clone(), &[]).await;

    let event = frame(
        "_lk.synchrotron.src-package-synced",
        json!({
            "name": "pkg",
            "src_os": "debian",
            "src_suite": "sid",
            "dest_suite": "unstable",
            "version": "3.0",
            "forced": true,
            "job_failed": true
        }),
    );
    runtime.relay(&event).await;

    let sent = sent.lock().unwrap();
    assert!(sent[0].1.starts_with("Enforced synchronization of package <em>pkg</em>"), "{}", sent[0].1);
}

#[tokio::test]
async fn test_rooms_are_joined_in_configuration_order() {
    let joined = Arc::new(Mutex::new(Vec::new()));
    let mut chat = MockChat::new();

    chat.expect_login().returning(|_, _| Ok(()));
    chat.expect_join_room().times(3).returning({
        let joined = joined.clone();
        move |room| {
            joined.lock().unwrap().push(room.to_string());
            Ok(Room {
                alias: room.to_string(),
                id: room_id(room),
            })
        }
    });
    chat.expect_listen().returning(|| Ok(()));

    let rooms = ["#c:example.org", "#a:example.org", "#b:example.org"];
    let bus = BusClient::new(Box::new(MockBus::new()));
    let runtime = Runtime::new(&test_config(&rooms), bus, ChatClient::new(Arc::new(chat))).await.map_err(|e| e.to_string()).unwrap();

    assert_eq!(*joined.lock().unwrap(), rooms);
    assert_eq!(runtime.session.rooms().iter().map(|r| r.alias.as_str()).collect::<Vec<_>>(), rooms);
}

#[tokio::test]
async fn test_bad_credentials_fail_before_reading_the_bus() {
    let mut chat = MockChat::new();
    chat.expect_login().returning(|_, _| {
        Err(ChatError::BadCredentials {
            message: "M_FORBIDDEN (403 Forbidden): Invalid password".to_string(),
        }
        .into())
    });
    chat.expect_join_room().never();
    chat.expect_send_html().never();
    chat.expect_listen().never();

    let mut bus = MockBus::new();
    bus.expect_recv().never();

    let result = Runtime::new(&test_config(&["#archive:example.org"]), BusClient::new(Box::new(bus)), ChatClient::new(Arc::new(chat))).await;

    let Err(err) = result else {
        panic!("startup should fail with bad credentials");
    };
    assert_eq!(ExitStatus::of(&err), ExitStatus::Auth);
    assert_eq!(ExitStatus::of(&err).code(), 2);
}

#[tokio::test]
async fn test_room_failures_are_fatal_with_distinct_statuses() {
    for (bad_room, expected) in [("not a room", ExitStatus::RoomMalformed), ("#gone:example.org", ExitStatus::RoomUnavailable)] {
        let mut chat = MockChat::new();
        chat.expect_login().returning(|_, _| Ok(()));
        chat.expect_join_room().returning(move |room| {
            if room == bad_room {
                let message = "join failed".to_string();
                let room = room.to_string();
                return Err(match expected {
                    ExitStatus::RoomMalformed => ChatError::MalformedRoom { room, message },
                    _ => ChatError::RoomUnavailable { room, message },
                }
                .into());
            }

            Ok(Room {
                alias: room.to_string(),
                id: room_id(room),
            })
        });
        chat.expect_listen().never();

        let config = test_config(&["#archive:example.org", bad_room]);
        let result = Runtime::new(&config, BusClient::new(Box::new(MockBus::new())), ChatClient::new(Arc::new(chat))).await;

        let Err(err) = result else {
            panic!("startup should fail for {bad_room}");
        };
        assert_eq!(ExitStatus::of(&err), expected);
    }
}

#[tokio::test]
async fn test_malformed_configured_template_fails_startup() {
    let mut config = test_config(&["#archive:example.org"]);
    Arc::make_mut(&mut config.inner).templates.push(mirk::base::config::TemplateOverride {
        tag: "_lk.custom.broken".to_string(),
        body: "Broken {name".to_string(),
    });

    let mut chat = MockChat::new();
    chat.expect_login().never();

    let result = Runtime::new(&config, BusClient::new(Box::new(MockBus::new())), ChatClient::new(Arc::new(chat))).await;

    let Err(err) = result else {
        panic!("startup should fail with a malformed template");
    };
    assert_eq!(ExitStatus::of(&err), ExitStatus::Config);
}

use std::time::Duration;

use netrep_client::{ClientConfig, ConnectionState};
use netrep_server::{Server, ServerError};
use netrep_shared::{
    ConfigError, ConnectEvent, ConnectionRequestEvent, DenyReason, DespawnEvent, DisconnectEvent,
    ErrorEvent, Expiry, ExpiryEvent, Frame, FrameCodec, MessageType, OwnershipChangeEvent,
    PeerId, Prefab, Protocol, RejectEvent, ReplicationConfig, ReplicationError, SpawnOptions,
    DECODE_ERROR_FLAG_THRESHOLD,
};
use netrep_test::{
    local_transport::LocalTransportHub,
    test_protocol::{protocol, AVATAR, CRATE, HEALTH},
    TestSession,
};

fn approval_config() -> ReplicationConfig {
    ReplicationConfig {
        connection_approval: true,
        client_connection_buffer_timeout: Duration::from_millis(200),
        ..Default::default()
    }
}

#[test]
fn approved_connection_completes_the_handshake() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut session = TestSession::new(approval_config());
    let peer = session.add_client(b"token".to_vec());

    let mut events = session.step();
    assert_eq!(
        events.server.read::<ConnectionRequestEvent>().collect::<Vec<_>>(),
        vec![(peer, b"token".to_vec())]
    );
    assert!(!session.client(peer).is_connected());
    assert_eq!(
        session
            .server()
            .pending_connection(&peer)
            .and_then(|pending| pending.request_payload()),
        Some(&b"token"[..])
    );

    session.server_mut().accept_connection(peer).unwrap();
    let mut events = session.step();
    assert_eq!(events.server.read::<ConnectEvent>().collect::<Vec<_>>(), vec![peer]);
    assert_eq!(events.client(peer).read::<ConnectEvent>().collect::<Vec<_>>(), vec![peer]);
    assert!(session.client(peer).is_connected());
    assert_eq!(session.client(peer).peer_id(), Some(peer));
    assert_eq!(session.server().connected_peers(), vec![peer]);

    assert_eq!(
        session.server_mut().accept_connection(peer),
        Err(ServerError::AlreadyConnected { peer })
    );
}

#[test]
fn rejected_connection_closes_the_link() {
    let mut session = TestSession::new(approval_config());
    let peer = session.add_client(Vec::new());
    session.step();

    session.server_mut().reject_connection(peer).unwrap();
    let mut events = session.step();

    assert_eq!(events.client(peer).read::<RejectEvent>().collect::<Vec<_>>(), vec![PeerId::SERVER]);
    assert_eq!(session.client(peer).connection_state(), ConnectionState::Rejected);
    assert!(!session.server().is_connected(&peer));
    assert!(session.server().pending_connection(&peer).is_none());
    assert!(!session.hub().is_open(PeerId::SERVER, peer));
    assert_eq!(
        session.server_mut().reject_connection(peer),
        Err(ServerError::NoPendingConnection { peer })
    );
}

#[test]
fn unanswered_connection_times_out() {
    let mut session = TestSession::new(approval_config());
    let peer = session.add_client(Vec::new());

    let mut steps = session.run(6);
    let expiries: Vec<Expiry> = steps
        .iter_mut()
        .flat_map(|step| step.server.read::<ExpiryEvent>())
        .collect();

    assert_eq!(expiries, vec![Expiry::PendingConnection { peer }]);
    assert!(session.server().pending_connection(&peer).is_none());
    assert!(!session.hub().is_open(PeerId::SERVER, peer));
    assert_eq!(session.client(peer).connection_state(), ConnectionState::Disconnected);
}

#[test]
fn replication_frames_before_approval_are_refused() {
    let config = approval_config();
    let mut session = TestSession::new(config.clone());
    let peer = session.add_client(Vec::new());
    session.step();

    let codec = FrameCodec::from_config(&config);
    let delta = codec.encode(
        0,
        &Frame::VariableDelta {
            network_id: 1,
            variable_index: HEALTH,
            value: 1u32.into(),
        },
    );
    session.server_mut().receive(peer, delta);
    session
        .client_mut(peer)
        .receive(codec.encode(0, &Frame::Despawn { network_id: 1 }));
    let mut events = session.step();

    let errors: Vec<ReplicationError> = events.server.read::<ErrorEvent>().collect();
    assert_eq!(
        errors,
        vec![ReplicationError::UnexpectedFrame {
            peer,
            message_type: MessageType::VariableDelta,
        }]
    );
    let errors: Vec<ReplicationError> = events.client(peer).read::<ErrorEvent>().collect();
    assert_eq!(
        errors,
        vec![ReplicationError::UnexpectedFrame {
            peer: PeerId::SERVER,
            message_type: MessageType::Despawn,
        }]
    );
}

#[test]
fn disconnect_despawns_player_objects_and_returns_the_rest() {
    let mut session = TestSession::new(ReplicationConfig::default());
    let leaving = session.connect_client();
    let staying = session.connect_client();

    let player = session.spawn(AVATAR, SpawnOptions::default().owned_by(leaving).player_object());
    let owned = session.spawn(CRATE, SpawnOptions::default().owned_by(leaving));
    session.step();
    assert!(session.client(staying).object(&player).is_some());

    let mut gone = session
        .disconnect_client(leaving)
        .expect("client was connected");
    assert!(session.server().object(&player).is_none());
    assert_eq!(session.server().owner(&owned), Some(PeerId::SERVER));

    let mut events = session.step();
    assert_eq!(events.server.read::<DespawnEvent>().collect::<Vec<_>>(), vec![player]);
    assert_eq!(
        events.server.read::<OwnershipChangeEvent>().collect::<Vec<_>>(),
        vec![(owned, PeerId::SERVER)]
    );
    assert_eq!(events.server.read::<DisconnectEvent>().collect::<Vec<_>>(), vec![leaving]);

    assert_eq!(events.client(staying).read::<DespawnEvent>().collect::<Vec<_>>(), vec![player]);
    assert_eq!(
        events
            .client(staying)
            .read::<OwnershipChangeEvent>()
            .collect::<Vec<_>>(),
        vec![(owned, PeerId::SERVER)]
    );

    let mut events = gone.advance(session.now());
    assert_eq!(
        events.read::<DisconnectEvent>().collect::<Vec<_>>(),
        vec![PeerId::SERVER]
    );
    assert!(gone.network_ids().is_empty());
    assert_eq!(gone.connection_state(), ConnectionState::Disconnected);
}

#[test]
fn repeated_garbage_flags_the_sender() {
    let mut session = TestSession::new(ReplicationConfig::default());
    let peer = session.connect_client();

    for _ in 0..DECODE_ERROR_FLAG_THRESHOLD {
        session.server_mut().receive(peer, vec![0xff, 0xff]);
    }
    let mut events = session.step();

    let errors: Vec<ReplicationError> = events.server.read::<ErrorEvent>().collect();
    let decode_errors = errors
        .iter()
        .filter(|error| matches!(error, ReplicationError::Decode { .. }))
        .count();
    assert_eq!(decode_errors as u32, DECODE_ERROR_FLAG_THRESHOLD);
    assert!(matches!(
        errors.last(),
        Some(ReplicationError::MisbehavingPeer { peer: flagged, .. }) if *flagged == peer
    ));
    assert!(session.server().is_connected(&peer));
}

fn protocol_with_extra_prefab() -> Protocol {
    let mut protocol = protocol();
    protocol.add_prefab(Prefab::new("extra"));
    protocol
}

fn client_config(replication: ReplicationConfig) -> ClientConfig {
    ClientConfig {
        replication,
        connection_payload: Vec::new(),
    }
}

#[test]
fn mismatched_prefabs_are_denied() {
    let mut session = TestSession::new(ReplicationConfig::default());
    let peer = session.add_client_with(
        client_config(ReplicationConfig::default()),
        protocol_with_extra_prefab(),
    );
    let mut events = session.step();

    let errors: Vec<ReplicationError> = events.server.read::<ErrorEvent>().collect();
    assert_eq!(
        errors,
        vec![ReplicationError::IncompatiblePeer {
            peer,
            reason: DenyReason::PrefabMismatch,
        }]
    );
    assert!(!events.server.has::<ConnectEvent>());
    assert_eq!(events.client(peer).read::<RejectEvent>().collect::<Vec<_>>(), vec![PeerId::SERVER]);
    assert_eq!(session.client(peer).connection_state(), ConnectionState::Rejected);
    assert_eq!(session.client(peer).rejection_reason(), Some(DenyReason::PrefabMismatch));
    assert!(session.server().pending_connection(&peer).is_none());
    assert!(!session.hub().is_open(PeerId::SERVER, peer));
}

#[test]
fn prefab_check_can_be_turned_off() {
    let config = ReplicationConfig {
        force_same_prefabs: false,
        ..Default::default()
    };
    let mut session = TestSession::new(config.clone());
    let peer = session.add_client_with(client_config(config), protocol_with_extra_prefab());
    session.run(2);

    assert!(session.client(peer).is_connected());
    assert!(session.server().is_connected(&peer));
}

#[test]
fn mismatched_protocol_version_is_denied() {
    let mut session = TestSession::new(ReplicationConfig::default());
    let newer = ReplicationConfig {
        protocol_version: 2,
        ..Default::default()
    };
    let peer = session.add_client_with(client_config(newer), protocol());
    session.run(2);

    assert_eq!(session.client(peer).connection_state(), ConnectionState::Rejected);
    assert_eq!(session.client(peer).rejection_reason(), Some(DenyReason::ProtocolVersion));
    assert!(session.server().connected_peers().is_empty());
}

#[test]
fn player_prefab_is_spawned_for_each_approved_client() {
    let config = ReplicationConfig {
        player_prefab: Some(AVATAR.to_string()),
        ..Default::default()
    };
    let mut session = TestSession::new(config);
    let peer = session.connect_client();
    session.step();

    let ids = session.server().network_ids();
    assert_eq!(ids.len(), 1);
    let player = ids[0];
    let object = session.server().object(&player).expect("player object exists");
    assert!(object.is_player_object());
    assert_eq!(session.server().owner(&player), Some(peer));
    assert!(session.client(peer).owns(&player));

    session.disconnect_client(peer);
    assert!(session.server().object(&player).is_none());
}

#[test]
fn unknown_player_prefab_fails_server_creation() {
    let config = ReplicationConfig {
        player_prefab: Some("ghost".to_string()),
        ..Default::default()
    };
    let hub = LocalTransportHub::new();
    let result = Server::new(config, protocol(), Box::new(hub.transport(PeerId::SERVER)));

    assert!(matches!(
        result,
        Err(ReplicationError::Config(ConfigError::UnknownPlayerPrefab { name })) if name == "ghost"
    ));
}

#[test]
fn time_resync_corrects_a_drifted_client() {
    for enable_time_resync in [false, true] {
        let config = ReplicationConfig {
            enable_time_resync,
            time_resync_interval: Duration::from_millis(50),
            ..Default::default()
        };
        let mut session = TestSession::new(config.clone());
        let peer = session.connect_client();

        let drift = FrameCodec::from_config(&config).encode(500, &Frame::TimeSync);
        session.client_mut(peer).receive(drift);
        session.run(4);

        let resyncs = session.hub().count_sent(PeerId::SERVER, MessageType::TimeSync);
        if enable_time_resync {
            assert_eq!(session.client(peer).current_tick(), session.server().current_tick());
            assert!(resyncs > 0);
        } else {
            assert_ne!(session.client(peer).current_tick(), session.server().current_tick());
            assert_eq!(resyncs, 0);
        }
    }
}

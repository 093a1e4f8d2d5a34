use std::{cell::RefCell, rc::Rc, time::Duration};

use netrep_shared::{
    method_hash, ErrorEvent, Expiry, ExpiryEvent, Frame, FrameCodec, PeerId, ReplicationConfig,
    ReplicationError, RpcCall, RpcClass, RpcError, RpcEvent, RpcMessage, RpcTarget, SpawnEvent,
    SpawnOptions,
};
use netrep_test::{
    test_protocol::{AVATAR, HEALTH},
    StepEvents, TestSession,
};

fn server_calls(steps: &mut [StepEvents]) -> Vec<RpcCall> {
    steps
        .iter_mut()
        .flat_map(|step| step.server.read::<RpcEvent>())
        .collect()
}

fn client_calls(steps: &mut [StepEvents], peer: PeerId) -> Vec<RpcCall> {
    steps
        .iter_mut()
        .flat_map(|step| step.client(peer).read::<RpcEvent>())
        .collect()
}

#[test]
fn server_rpc_from_owner_runs_the_bound_handler() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut session = TestSession::new(ReplicationConfig::default());
    let owner = session.connect_client();
    let network_id = session.spawn(AVATAR, SpawnOptions::default().owned_by(owner));
    session.step();

    let received = Rc::new(RefCell::new(Vec::new()));
    let inner = received.clone();
    session
        .server_mut()
        .bind_rpc(network_id, "jump", move |call| {
            inner.borrow_mut().push(call.payload.clone());
            Ok(())
        })
        .unwrap();

    session
        .client_mut(owner)
        .call_server_rpc(network_id, "jump", vec![9])
        .unwrap();
    let mut steps = session.run(2);

    assert_eq!(*received.borrow(), vec![vec![9]]);
    let calls = server_calls(&mut steps);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].sender, owner);
    assert_eq!(calls[0].method, "jump");
}

#[test]
fn owner_only_methods_reject_other_callers() {
    let config = ReplicationConfig::default();
    let mut session = TestSession::new(config.clone());
    let owner = session.connect_client();
    let other = session.connect_client();
    let network_id = session.spawn(AVATAR, SpawnOptions::default().owned_by(owner));
    session.step();

    let result = session
        .client_mut(other)
        .call_server_rpc(network_id, "jump", Vec::new());
    assert!(matches!(result, Err(RpcError::PermissionViolation { .. })));

    // the Server checks ownership again for calls that skip the Client API
    let forged = Frame::RpcBatch {
        class: RpcClass::ServerRpc,
        messages: vec![RpcMessage {
            target: network_id,
            method_hash: method_hash("jump", config.rpc_hash_width),
            sender: other,
            payload: Vec::new(),
            class: RpcClass::ServerRpc,
            tick: 0,
        }],
    };
    let bytes = FrameCodec::from_config(&config).encode(0, &forged);
    session.server_mut().receive(other, bytes);
    let mut events = session.step();

    assert!(!events.server.has::<RpcEvent>());
    let errors: Vec<ReplicationError> = events.server.read::<ErrorEvent>().collect();
    assert!(matches!(
        errors.as_slice(),
        [ReplicationError::Rpc(RpcError::PermissionViolation { peer, .. })] if *peer == other
    ));

    // methods open to any caller still go through
    session
        .client_mut(other)
        .call_server_rpc(network_id, "ping", vec![1])
        .unwrap();
    let mut steps = session.run(2);
    let calls = server_calls(&mut steps);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].sender, other);
}

#[test]
fn client_rpcs_reach_only_their_targets() {
    let mut session = TestSession::new(ReplicationConfig::default());
    let first = session.connect_client();
    let second = session.connect_client();
    let network_id = session.spawn(AVATAR, SpawnOptions::default());
    session.step();

    let hits = Rc::new(RefCell::new(Vec::new()));
    for peer in [first, second] {
        let inner = hits.clone();
        session
            .client_mut(peer)
            .bind_rpc(network_id, "hit", move |call| {
                inner.borrow_mut().push((peer, call.payload.clone()));
                Ok(())
            })
            .unwrap();
    }

    session
        .server_mut()
        .call_client_rpc(network_id, "hit", vec![1], RpcTarget::Peer(first))
        .unwrap();
    let mut steps = session.run(1);
    assert_eq!(client_calls(&mut steps, first).len(), 1);
    assert!(client_calls(&mut steps, second).is_empty());

    session
        .server_mut()
        .call_client_rpc(network_id, "hit", vec![2], RpcTarget::All)
        .unwrap();
    session.run(1);

    assert_eq!(
        *hits.borrow(),
        vec![(first, vec![1]), (first, vec![2]), (second, vec![2])]
    );
}

#[test]
fn rpc_sent_with_the_spawn_is_delivered_after_it() {
    let mut session = TestSession::new(ReplicationConfig::default());
    let client = session.connect_client();

    let network_id = session.spawn(AVATAR, SpawnOptions::default());
    session
        .server_mut()
        .call_client_rpc(network_id, "hit", vec![3], RpcTarget::All)
        .unwrap();
    let mut events = session.step();

    assert_eq!(
        events.client(client).read::<SpawnEvent>().collect::<Vec<_>>(),
        vec![network_id]
    );
    let calls: Vec<RpcCall> = events.client(client).read::<RpcEvent>().collect();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].payload, vec![3]);
    assert_eq!(session.client(client).engine().buffered_len(), 0);
}

#[test]
fn buffered_message_for_a_missing_object_expires() {
    let config = ReplicationConfig {
        message_buffer_timeout: Duration::from_millis(200),
        ..Default::default()
    };
    let mut session = TestSession::new(config.clone());
    let client = session.connect_client();

    let bytes = FrameCodec::from_config(&config).encode(
        session.server().current_tick(),
        &Frame::VariableDelta {
            network_id: 999,
            variable_index: HEALTH,
            value: 1u32.into(),
        },
    );
    session.client_mut(client).receive(bytes);
    session.step();
    assert_eq!(session.client(client).engine().buffered_len(), 1);

    let mut steps = session.run(6);
    let expiries: Vec<Expiry> = steps
        .iter_mut()
        .flat_map(|step| step.client(client).read::<ExpiryEvent>())
        .collect();
    assert_eq!(expiries, vec![Expiry::BufferedMessage { network_id: 999 }]);
    assert_eq!(session.client(client).engine().buffered_len(), 0);
}

#[test]
fn calls_are_refused_before_approval_and_over_the_cap() {
    let config = ReplicationConfig {
        ensure_variable_length_safety: true,
        max_variable_length: 4,
        ..Default::default()
    };
    let mut session = TestSession::new(config);
    let pending = session.add_client(Vec::new());
    assert_eq!(
        session.client_mut(pending).call_server_rpc(1, "jump", Vec::new()),
        Err(RpcError::NotConnected)
    );

    session.run(2);
    assert!(session.client(pending).is_connected());
    let network_id = session.spawn(AVATAR, SpawnOptions::default().owned_by(pending));
    session.step();

    assert_eq!(
        session
            .client_mut(pending)
            .call_server_rpc(network_id, "jump", vec![0; 8]),
        Err(RpcError::PayloadTooLarge { length: 8, cap: 4 })
    );
    assert_eq!(
        session
            .client_mut(pending)
            .call_server_rpc(network_id, "dance", Vec::new()),
        Err(RpcError::UnknownMethod {
            network_id,
            method_hash: method_hash("dance", session.server().engine().protocol().hash_width()),
        })
    );
}

use std::{cell::Cell, rc::Rc};

use netrep_shared::{
    ChangeObserver, ErrorEvent, Frame, FrameCodec, MessageType, PeerId, ReplicatedValue,
    ReplicationConfig, ReplicationError, SpawnEvent, SpawnOptions, VariableError,
};
use netrep_test::{
    test_protocol::{AVATAR, CRATE, CRATE_SLOTS, FLAG, HEALTH, POSITION},
    TestSession,
};

fn counter() -> (Rc<Cell<u32>>, ChangeObserver) {
    let calls = Rc::new(Cell::new(0));
    let inner = calls.clone();
    (calls, Box::new(move |_, _| inner.set(inner.get() + 1)))
}

fn deltas_sent(session: &TestSession, from: PeerId, to: PeerId) -> usize {
    session
        .hub()
        .sent_frames(from, to)
        .iter()
        .filter(|message_type| **message_type == MessageType::VariableDelta)
        .count()
}

#[test]
fn owner_write_reaches_every_peer_once() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut session = TestSession::new(ReplicationConfig::default());
    let owner = session.connect_client();
    let other = session.connect_client();

    let network_id = session.spawn(AVATAR, SpawnOptions::default().owned_by(owner));
    let mut events = session.step();
    assert!(events.client(owner).read::<SpawnEvent>().any(|id| id == network_id));
    assert!(session.client(other).object(&network_id).is_some());
    assert!(session.client(owner).owns(&network_id));

    let (owner_calls, observer) = counter();
    session
        .client_mut(owner)
        .observe_variable(network_id, POSITION, observer)
        .unwrap();
    let (other_calls, observer) = counter();
    session
        .client_mut(other)
        .observe_variable(network_id, POSITION, observer)
        .unwrap();

    let five = ReplicatedValue::Vec3([5.0, 0.0, 0.0]);
    assert_eq!(
        session
            .client_mut(owner)
            .set_variable(network_id, POSITION, five.clone()),
        Ok(true)
    );
    assert_eq!(owner_calls.get(), 1);

    // one tick to reach the Server, which relays it on its next tick
    session.run(2);
    assert_eq!(session.values(network_id, POSITION), vec![Some(five); 3]);

    session.run(4);
    assert_eq!(owner_calls.get(), 1);
    assert_eq!(other_calls.get(), 1);
    assert_eq!(deltas_sent(&session, PeerId::SERVER, owner), 0);
}

#[test]
fn writes_without_permission_never_leave_the_peer() {
    let mut session = TestSession::new(ReplicationConfig::default());
    let owner = session.connect_client();
    let other = session.connect_client();
    let network_id = session.spawn(AVATAR, SpawnOptions::default().owned_by(owner));
    session.step();

    let result = session
        .client_mut(other)
        .set_variable(network_id, POSITION, [1.0f32, 1.0, 1.0]);
    assert!(matches!(result, Err(VariableError::PermissionViolation { .. })));
    let result = session.client_mut(owner).set_variable(network_id, HEALTH, 1u32);
    assert!(matches!(result, Err(VariableError::PermissionViolation { .. })));

    session.run(3);
    assert_eq!(session.hub().count_sent(owner, MessageType::VariableDelta), 0);
    assert_eq!(session.hub().count_sent(other, MessageType::VariableDelta), 0);
    assert_eq!(
        session.values(network_id, POSITION),
        vec![Some(ReplicatedValue::Vec3([0.0; 3])); 3]
    );
    assert_eq!(
        session.values(network_id, HEALTH),
        vec![Some(ReplicatedValue::U32(100)); 3]
    );
}

#[test]
fn forged_deltas_are_rejected_by_the_server() {
    let config = ReplicationConfig::default();
    let mut session = TestSession::new(config.clone());
    let owner = session.connect_client();
    let other = session.connect_client();
    let network_id = session.spawn(AVATAR, SpawnOptions::default().owned_by(owner));
    session.step();

    let codec = FrameCodec::from_config(&config);
    let bytes = codec.encode(
        session.client(other).current_tick(),
        &Frame::VariableDelta {
            network_id,
            variable_index: HEALTH,
            value: 1u32.into(),
        },
    );
    session.server_mut().receive(other, bytes);

    let mut events = session.step();
    let errors: Vec<ReplicationError> = events.server.read::<ErrorEvent>().collect();
    assert!(matches!(
        errors.as_slice(),
        [ReplicationError::Variable(VariableError::PermissionViolation { peer: Some(peer), .. })]
            if *peer == other
    ));

    session.run(2);
    assert_eq!(
        session.values(network_id, HEALTH),
        vec![Some(ReplicatedValue::U32(100)); 3]
    );
    assert_eq!(deltas_sent(&session, PeerId::SERVER, owner), 0);
}

#[test]
fn duplicated_delta_fires_observers_once() {
    let config = ReplicationConfig::default();
    let mut session = TestSession::new(config.clone());
    let client = session.connect_client();
    let network_id = session.spawn(AVATAR, SpawnOptions::default());
    session.step();

    let (calls, observer) = counter();
    session
        .client_mut(client)
        .observe_variable(network_id, HEALTH, observer)
        .unwrap();

    session.server_mut().set_variable(network_id, HEALTH, 50u32).unwrap();
    session.step();
    assert_eq!(calls.get(), 1);

    // replay the delta, as a duplicating link would
    let bytes = FrameCodec::from_config(&config).encode(
        session.server().current_tick(),
        &Frame::VariableDelta {
            network_id,
            variable_index: HEALTH,
            value: 50u32.into(),
        },
    );
    session.client_mut(client).receive(bytes.clone());
    session.client_mut(client).receive(bytes);
    session.run(2);

    assert_eq!(calls.get(), 1);
    assert_eq!(
        session.client(client).variable(&network_id, HEALTH),
        Some(&ReplicatedValue::U32(50))
    );
}

#[test]
fn shared_variable_written_by_a_non_owner_reaches_everyone() {
    let mut session = TestSession::new(ReplicationConfig::default());
    let owner = session.connect_client();
    let other = session.connect_client();
    let network_id = session.spawn(AVATAR, SpawnOptions::default().owned_by(owner));
    session.step();

    assert_eq!(
        session.client_mut(other).set_variable(network_id, FLAG, true),
        Ok(true)
    );
    session.run(2);

    assert_eq!(
        session.values(network_id, FLAG),
        vec![Some(ReplicatedValue::Bool(true)); 3]
    );
    assert_eq!(deltas_sent(&session, PeerId::SERVER, other), 0);
    assert_eq!(deltas_sent(&session, PeerId::SERVER, owner), 1);
}

#[test]
fn send_budget_defers_excess_deltas() {
    let config = ReplicationConfig {
        max_send_events_per_tick: 3,
        ..Default::default()
    };
    let mut session = TestSession::new(config);
    let client = session.connect_client();
    let network_id = session.spawn(CRATE, SpawnOptions::default());
    session.step();
    assert!(session.client(client).object(&network_id).is_some());

    for slot in 0..CRATE_SLOTS {
        session
            .server_mut()
            .set_variable(network_id, slot, u32::from(slot) + 1)
            .unwrap();
    }
    session.hub().clear_sent_log();

    let updated = |session: &TestSession| {
        (0..CRATE_SLOTS)
            .filter(|slot| {
                session.client(client).variable(&network_id, *slot)
                    != Some(&ReplicatedValue::U32(0))
            })
            .count()
    };

    session.step();
    assert_eq!(session.hub().count_sent(PeerId::SERVER, MessageType::VariableDelta), 3);
    assert_eq!(updated(&session), 3);

    for expected in [6, 9, 10] {
        session.step();
        assert_eq!(
            session.hub().count_sent(PeerId::SERVER, MessageType::VariableDelta),
            expected
        );
    }
    for slot in 0..CRATE_SLOTS {
        assert_eq!(
            session.client(client).variable(&network_id, slot),
            Some(&ReplicatedValue::U32(u32::from(slot) + 1))
        );
    }
}

use proptest::prelude::*;

use netrep_shared::{ReplicatedValue, ReplicationConfig, SpawnOptions};
use netrep_test::{
    test_protocol::{AVATAR, HEALTH, POSITION, SPEED},
    LinkConditionerConfig, LocalTransportHub, TestSession,
};

#[derive(Clone, Debug)]
enum Op {
    OwnerPosition(u16),
    OwnerSpeed(u16),
    ServerHealth(u32),
    Wait(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u16..64).prop_map(Op::OwnerPosition),
        (0u16..64).prop_map(Op::OwnerSpeed),
        (0u32..64).prop_map(Op::ServerHealth),
        (0usize..3).prop_map(Op::Wait),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Once writes stop and the links drain, every peer holds the last
    /// written value of every variable, however frames were delayed.
    #[test]
    fn peers_converge_on_last_write(
        ops in prop::collection::vec(op_strategy(), 1..24),
        seed in any::<u64>(),
    ) {
        let hub = LocalTransportHub::with_conditioner(LinkConditionerConfig::jitter(3, seed));
        let mut session = TestSession::with_hub(ReplicationConfig::default(), hub);
        let owner = session.connect_client();
        session.connect_client();
        session.connect_client();

        let network_id = session.spawn(AVATAR, SpawnOptions::default().owned_by(owner));
        session.step();

        let mut position = ReplicatedValue::Vec3([0.0; 3]);
        let mut speed = ReplicatedValue::F32(0.0);
        let mut health = ReplicatedValue::U32(100);

        for op in ops {
            match op {
                Op::OwnerPosition(x) => {
                    position = ReplicatedValue::Vec3([f32::from(x), 0.0, 0.0]);
                    session
                        .client_mut(owner)
                        .set_variable(network_id, POSITION, position.clone())
                        .unwrap();
                }
                Op::OwnerSpeed(value) => {
                    speed = ReplicatedValue::F32(f32::from(value));
                    session
                        .client_mut(owner)
                        .set_variable(network_id, SPEED, speed.clone())
                        .unwrap();
                }
                Op::ServerHealth(value) => {
                    health = ReplicatedValue::U32(value);
                    session
                        .server_mut()
                        .set_variable(network_id, HEALTH, health.clone())
                        .unwrap();
                }
                Op::Wait(steps) => {
                    session.run(steps);
                }
            }
        }

        session.settle(4);
        prop_assert_eq!(session.values(network_id, POSITION), vec![Some(position); 4]);
        prop_assert_eq!(session.values(network_id, SPEED), vec![Some(speed); 4]);
        prop_assert_eq!(session.values(network_id, HEALTH), vec![Some(health); 4]);
    }
}

//! Property-based tests for the channel and window primitives using proptest.

use std::collections::VecDeque;

use cellvisor::{BoundedChannel, Delivery, OverflowPolicy, RollingWindow};
use proptest::prelude::*;

/// One step against a channel: `Some(v)` puts `v`, `None` takes.
fn ops() -> impl Strategy<Value = Vec<Option<u32>>> {
    prop::collection::vec(prop::option::weighted(0.6, 0u32..1000), 0..200)
}

fn policy() -> impl Strategy<Value = OverflowPolicy> {
    prop_oneof![
        Just(OverflowPolicy::Block),
        Just(OverflowPolicy::DropOldest),
        Just(OverflowPolicy::DropNewest),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

proptest! {
    /// The channel never exceeds its capacity and hands items out in FIFO order,
    /// with overflow resolved as the policy says.
    #[test]
    fn channel_is_bounded_fifo(capacity in 1usize..8, policy in policy(), ops in ops()) {
        let rt = runtime();
        let ch = BoundedChannel::with_policy(capacity, policy).unwrap();
        let mut model: VecDeque<u32> = VecDeque::new();

        for op in ops {
            match op {
                Some(v) => {
                    if policy == OverflowPolicy::Block && model.len() == capacity {
                        // A blocking put would wait forever here; the consumer goes first.
                        prop_assert_eq!(ch.try_take(), model.pop_front());
                    }
                    let delivery = rt.block_on(ch.put(v));
                    match delivery {
                        Delivery::Enqueued => model.push_back(v),
                        Delivery::DisplacedOldest(old) => {
                            prop_assert_eq!(policy, OverflowPolicy::DropOldest);
                            prop_assert_eq!(Some(old), model.pop_front());
                            model.push_back(v);
                        }
                        Delivery::Rejected(rejected) => {
                            prop_assert_eq!(policy, OverflowPolicy::DropNewest);
                            prop_assert_eq!(rejected, v);
                            prop_assert_eq!(model.len(), capacity);
                        }
                    }
                }
                None => prop_assert_eq!(ch.try_take(), model.pop_front()),
            }
            prop_assert!(ch.len() <= capacity);
            prop_assert_eq!(ch.len(), model.len());
        }

        while let Some(expected) = model.pop_front() {
            prop_assert_eq!(rt.block_on(ch.take()), expected);
        }
        prop_assert!(ch.is_empty());
    }

    /// After `k` appends to a seeded window of capacity `n`, it holds the last
    /// `min(n, 1 + k)` values, oldest first.
    #[test]
    fn window_keeps_latest_values(
        capacity in 1usize..32,
        seed in -100i64..100,
        values in prop::collection::vec(-100i64..100, 0..100),
    ) {
        let mut window = RollingWindow::with_seed(capacity, seed).unwrap();
        for &v in &values {
            window.append(v);
        }

        let mut all = vec![seed];
        all.extend(&values);
        let expected_len = capacity.min(1 + values.len());
        prop_assert_eq!(window.len(), expected_len);
        prop_assert_eq!(window.snapshot(), all[all.len() - expected_len..].to_vec());
    }

    /// An unseeded window behaves the same minus the seed.
    #[test]
    fn unseeded_window_evicts_oldest(
        capacity in 1usize..16,
        values in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let mut window = RollingWindow::new(capacity).unwrap();
        let mut evicted = Vec::new();
        for &v in &values {
            evicted.extend(window.append(v));
        }
        let keep = capacity.min(values.len());
        prop_assert_eq!(window.snapshot(), values[values.len() - keep..].to_vec());
        prop_assert_eq!(evicted, values[..values.len() - keep].to_vec());
    }
}

#[tokio::test]
async fn channel_capacity_two_preserves_order() {
    let ch = std::sync::Arc::new(BoundedChannel::new(2).unwrap());
    let producer = {
        let ch = std::sync::Arc::clone(&ch);
        tokio::spawn(async move {
            for x in [1.0, 2.0, 3.0] {
                ch.put(x).await;
            }
        })
    };

    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.push(ch.take().await);
        assert!(ch.len() <= 2);
    }
    producer.await.unwrap();
    assert_eq!(seen, vec![1.0, 2.0, 3.0]);
}

#[test]
fn seeded_window_of_three_keeps_latest_values() {
    let mut window = RollingWindow::with_seed(3, 0.0).unwrap();
    for x in [0.5, -0.2, 1.1, 0.3] {
        window.append(x);
    }
    assert_eq!(window.snapshot(), vec![-0.2, 1.1, 0.3]);
}

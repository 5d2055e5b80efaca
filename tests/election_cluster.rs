use std::time::Duration;

use bully::bully::{ElectionOutcome, ElectionStrategy};
use bully::cluster::{ClusterOptions, LocalCluster};

const SETTLE: Duration = Duration::from_secs(5);

fn quick() -> ClusterOptions {
    ClusterOptions {
        stepdown_grace: 200,
        ..ClusterOptions::default()
    }
}

#[tokio::test]
async fn all_nodes_converge_on_highest_id() {
    let cluster = LocalCluster::start(5, quick()).await.unwrap();

    assert!(cluster.wait_for_leader(5, SETTLE).await, "{:?}", cluster.leaders().await);

    let leader = cluster.node(5).unwrap();
    assert!(leader.is_ready());
    for id in 1..=4 {
        assert!(!cluster.node(id).unwrap().is_ready(), "node {id} should not be ready");
    }
}

#[tokio::test]
async fn concurrent_elections_on_one_node_send_one_round() {
    let cluster = LocalCluster::start(3, quick()).await.unwrap();
    assert!(cluster.wait_for_leader(3, SETTLE).await);
    cluster.reset_message_counts();

    let node = cluster.node(3).unwrap();
    let (a, b) = tokio::join!(node.start_election(), node.start_election());

    let mut outcomes = [a, b];
    outcomes.sort_by_key(|o| matches!(o, ElectionOutcome::Skipped));
    assert_eq!(outcomes[0], ElectionOutcome::SelfLeader);
    assert_eq!(outcomes[1], ElectionOutcome::Skipped);

    // One COORDINATOR per peer, not two.
    assert_eq!(node.counters().snapshot().coordinator, 2);
    assert!(!node.election_in_flight());
}

#[tokio::test]
async fn lower_node_defers_to_acknowledging_candidate() {
    let cluster = LocalCluster::with_ids(&[5, 9], quick()).await.unwrap();
    assert!(cluster.wait_for_leader(9, SETTLE).await);

    let five = cluster.node(5).unwrap();
    assert_eq!(five.start_election().await, ElectionOutcome::Deferred);
    assert_ne!(five.leader_id().await, Some(5));
    assert!(!five.is_ready());

    // 9 answers with its own election and re-announces itself.
    assert!(cluster.wait_for_leader(9, SETTLE).await);
}

#[tokio::test]
async fn killed_leader_is_replaced_by_next_highest() {
    let cluster = LocalCluster::start(3, quick()).await.unwrap();
    assert!(cluster.wait_for_leader(3, SETTLE).await);

    cluster.kill(3).unwrap();
    let outcome = cluster.ping_leader(1).await.unwrap();
    assert_eq!(outcome, Some(ElectionOutcome::Deferred));

    assert!(cluster.wait_for_leader(2, SETTLE).await, "{:?}", cluster.leaders().await);
    assert_eq!(cluster.node(1).unwrap().leader_id().await, Some(2));
    assert!(cluster.node(2).unwrap().is_ready());
}

#[tokio::test]
async fn revived_node_takes_leadership_back() {
    let cluster = LocalCluster::start(3, quick()).await.unwrap();
    assert!(cluster.wait_for_leader(3, SETTLE).await);

    cluster.kill(3).unwrap();
    cluster.ping_leader(1).await.unwrap();
    assert!(cluster.wait_for_leader(2, SETTLE).await);

    let outcome = cluster.revive(3).await.unwrap();
    assert_eq!(outcome, Some(ElectionOutcome::SelfLeader));
    assert!(cluster.wait_for_leader(3, SETTLE).await, "{:?}", cluster.leaders().await);

    assert!(cluster.node(3).unwrap().is_ready());
    assert!(!cluster.node(2).unwrap().is_ready());
}

#[tokio::test]
async fn ping_to_live_leader_changes_nothing() {
    let cluster = LocalCluster::start(3, quick()).await.unwrap();
    assert!(cluster.wait_for_leader(3, SETTLE).await);
    cluster.reset_message_counts();

    assert_eq!(cluster.ping_leader(1).await.unwrap(), None);
    assert_eq!(cluster.message_count(), 1);
    assert_eq!(cluster.node(1).unwrap().counters().snapshot().ping, 1);
}

#[tokio::test]
async fn improved_strategy_appoints_highest_acknowledger() {
    let options = ClusterOptions {
        strategy: ElectionStrategy::Improved,
        ..quick()
    };
    let cluster = LocalCluster::start(4, options).await.unwrap();
    assert!(cluster.wait_for_leader(4, SETTLE).await);

    cluster.kill(4).unwrap();
    cluster.reset_message_counts();
    let outcome = cluster.ping_leader(1).await.unwrap();
    assert_eq!(outcome, Some(ElectionOutcome::Appointed(3)));

    assert!(cluster.wait_for_leader(3, SETTLE).await);
    assert!(cluster.node(3).unwrap().is_ready());

    // No cascade: only node 1 sent ELECTION messages.
    for id in 2..=3 {
        assert_eq!(cluster.node(id).unwrap().counters().snapshot().election, 0);
    }
}

#[tokio::test]
async fn heartbeat_detects_dead_leader() {
    let options = ClusterOptions {
        run_detectors: true,
        heartbeat_interval: 100,
        heartbeat_jitter: 50,
        ..quick()
    };
    let cluster = LocalCluster::start(4, options).await.unwrap();
    assert!(cluster.wait_for_leader(4, SETTLE).await);

    cluster.kill(4).unwrap();
    assert!(cluster.wait_for_leader(3, SETTLE).await, "{:?}", cluster.leaders().await);
}

#[tokio::test]
async fn added_node_with_higher_id_takes_over() {
    let mut cluster = LocalCluster::start(2, quick()).await.unwrap();
    assert!(cluster.wait_for_leader(2, SETTLE).await);

    let id = cluster.add_node().await.unwrap();
    assert_eq!(id, 3);
    assert!(cluster.wait_for_leader(3, SETTLE).await);

    let summary = cluster.summary().await;
    assert_eq!(summary.len(), 3);
    assert!(summary.iter().all(|s| s.peers.len() == 2));
}

#[tokio::test]
async fn heartbeat_reelects_when_peer_outranks_believed_leader() {
    let cluster = LocalCluster::start(3, quick()).await.unwrap();
    assert!(cluster.wait_for_leader(3, SETTLE).await);

    let one = cluster.node(1).unwrap();
    one.on_coordinator(2).await;

    assert_eq!(one.heartbeat().await, Some(ElectionOutcome::Deferred));
    assert!(cluster.wait_for_leader(3, SETTLE).await, "{:?}", cluster.leaders().await);
}

#[tokio::test]
async fn heartbeat_reelects_when_own_id_outranks_believed_leader() {
    let cluster = LocalCluster::start(2, quick()).await.unwrap();
    assert!(cluster.wait_for_leader(2, SETTLE).await);

    // A stale announcement demotes the real leader locally.
    let two = cluster.node(2).unwrap();
    two.on_coordinator(1).await;
    assert!(!two.is_ready());

    assert_eq!(two.heartbeat().await, Some(ElectionOutcome::SelfLeader));
    assert!(cluster.wait_for_leader(2, SETTLE).await);
    assert!(two.is_ready());
}

#[tokio::test]
async fn heartbeat_on_outranked_leader_hands_over() {
    let cluster = LocalCluster::start(3, quick()).await.unwrap();
    assert!(cluster.wait_for_leader(3, SETTLE).await);

    let two = cluster.node(2).unwrap();
    two.on_coordinator(2).await;
    assert!(two.is_ready());

    assert_eq!(two.heartbeat().await, Some(ElectionOutcome::Deferred));
    assert!(cluster.wait_for_leader(3, SETTLE).await, "{:?}", cluster.leaders().await);
    assert!(!two.is_ready());
}

#[tokio::test]
async fn heartbeat_is_quiet_under_the_rightful_leader() {
    let cluster = LocalCluster::start(3, quick()).await.unwrap();
    assert!(cluster.wait_for_leader(3, SETTLE).await);

    for id in 1..=3 {
        assert_eq!(cluster.node(id).unwrap().heartbeat().await, None, "node {id}");
    }
}

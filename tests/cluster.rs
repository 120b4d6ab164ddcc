//! End-to-end scenarios over an in-process cluster.

use std::collections::HashMap;
use std::sync::Arc;

use replikv::{
    Clerk, CommandArgs, CommandOp, CommandReply, KvReplica, KvService,
    LocalNet, NodeId, ReplyErr,
};

use tokio::time::{sleep, Duration};

/// A cluster of replicas over a `LocalNet` consensus fabric.
struct Cluster {
    net: LocalNet,
    replicas: Vec<Arc<KvReplica>>,
}

impl Cluster {
    async fn start(population: u8, config: Option<&str>) -> Cluster {
        let _ = env_logger::builder().is_test(true).try_init();
        let net = LocalNet::new(population);
        let mut replicas = Vec::with_capacity(population as usize);
        for id in 0..population {
            let (log, apply_rx) = net.launch(id);
            let replica = KvReplica::new_and_setup(log, apply_rx, config)
                .await
                .unwrap();
            replicas.push(Arc::new(replica));
        }
        Cluster { net, replicas }
    }

    fn services(&self) -> Vec<Arc<dyn KvService>> {
        self.replicas
            .iter()
            .map(|r| Arc::clone(r) as Arc<dyn KvService>)
            .collect()
    }

    fn clerk(&self) -> Clerk {
        Clerk::new(self.services())
    }

    fn crash(&mut self, id: NodeId) {
        self.net.crash(id);
        self.replicas[id as usize].kill();
    }

    async fn restart(&mut self, id: NodeId, config: Option<&str>) {
        let (log, apply_rx) = self.net.launch(id);
        self.replicas[id as usize] = Arc::new(
            KvReplica::new_and_setup(log, apply_rx, config).await.unwrap(),
        );
    }
}

/// Sends fixed command args as-is, rotating through servers until an
/// OK-class reply arrives. Unlike `Clerk`, the identifiers never change,
/// which lets tests replay an exact command.
async fn send_until_ok(
    services: &[Arc<dyn KvService>],
    args: &CommandArgs,
) -> CommandReply {
    let mut server = 0;
    loop {
        if let Ok(reply) = services[server].command(args.clone()).await {
            if reply.err == ReplyErr::Ok || reply.err == ReplyErr::NoKey {
                return reply;
            }
        }
        server = (server + 1) % services.len();
        tokio::task::yield_now().await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn basic_put_get() {
    let cluster = Cluster::start(1, None).await;
    let mut clerk = cluster.clerk();
    clerk.put("a", "1").await;
    assert_eq!(clerk.get("a").await, "1");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn append_semantics() {
    let cluster = Cluster::start(3, None).await;
    let mut clerk = cluster.clerk();
    clerk.put("k", "hello").await;
    clerk.append("k", " world").await;
    assert_eq!(clerk.get("k").await, "hello world");
    // missing key reads as empty
    assert_eq!(clerk.get("missing").await, "");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn identical_resend_applies_once() {
    let cluster = Cluster::start(3, None).await;
    let services = cluster.services();
    let args = CommandArgs {
        op: CommandOp::Append,
        key: "k".into(),
        value: "x".into(),
        client_id: 1234,
        command_id: 7,
    };
    let first = send_until_ok(&services, &args).await;
    assert_eq!(first.err, ReplyErr::Ok);

    // the reply is lost; the client resends the identical request
    let second = send_until_ok(&services, &args).await;
    assert_eq!(second.err, ReplyErr::Ok);

    let mut clerk = cluster.clerk();
    assert_eq!(clerk.get("k").await, "x");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn leader_failover_mid_command() {
    let mut cluster =
        Cluster::start(3, Some("cmd_timeout_ms = 100\nwait_expiry_ms = 300")).await;
    let mut clerk = cluster.clerk();

    // the leader accepts but cannot commit; the client sees timeouts and
    // keeps rotating with the same command identifiers
    cluster.net.hold_commits();
    let writer = tokio::spawn(async move {
        clerk.put("k", "v").await;
        clerk
    });
    sleep(Duration::from_millis(250)).await;

    cluster.crash(0);
    cluster.net.elect(1);
    cluster.net.release_commits();

    let mut clerk = writer.await.unwrap();
    assert_eq!(clerk.get("k").await, "v");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn snapshot_and_full_restart() {
    let config = Some("snapshot_threshold = 1000");
    let mut cluster = Cluster::start(3, config).await;
    let mut clerk = cluster.clerk();
    for i in 0..200 {
        clerk.put(format!("key-{}", i), format!("val-{}", i)).await;
    }
    let tail = CommandArgs {
        op: CommandOp::Append,
        key: "tail".into(),
        value: "x".into(),
        client_id: 777,
        command_id: 42,
    };
    send_until_ok(&cluster.services(), &tail).await;

    // let follower appliers drain; well past 1000 bytes of entries, every
    // node must have snapshotted by now
    sleep(Duration::from_millis(100)).await;
    for id in 0..3 {
        assert!(cluster.net.snapshot_index(id) > 0);
    }

    for id in 0..3 {
        cluster.crash(id);
    }
    for id in 0..3 {
        cluster.restart(id, config).await;
    }
    cluster.net.elect(0);

    let mut clerk = cluster.clerk();
    for i in 0..200 {
        assert_eq!(
            clerk.get(format!("key-{}", i)).await,
            format!("val-{}", i)
        );
    }

    // the dedup entry survived the snapshot: the resend must not re-append
    let replay = send_until_ok(&cluster.services(), &tail).await;
    assert_eq!(replay.err, ReplyErr::Ok);
    assert_eq!(clerk.get("tail").await, "x");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_clients_interleave_exactly_once() {
    let cluster = Cluster::start(3, None).await;
    let mut writers = Vec::new();
    for name in ["a", "b"] {
        let mut clerk = cluster.clerk();
        writers.push(tokio::spawn(async move {
            for i in 0..100 {
                clerk.append("log", format!("<{}{}>", name, i)).await;
            }
        }));
    }
    for writer in writers {
        writer.await.unwrap();
    }

    let mut clerk = cluster.clerk();
    let log = clerk.get("log").await;

    let mut counts: HashMap<String, usize> = HashMap::new();
    for token in log.split('>').filter(|t| !t.is_empty()) {
        *counts.entry(format!("{}>", token)).or_default() += 1;
    }
    let mut expected_len = 0;
    for name in ["a", "b"] {
        for i in 0..100 {
            let token = format!("<{}{}>", name, i);
            expected_len += token.len();
            assert_eq!(counts.get(&token), Some(&1), "token {} count", token);
        }
    }
    assert_eq!(log.len(), expected_len);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wait_registry_drains_after_quiescence() {
    let cluster =
        Cluster::start(3, Some("cmd_timeout_ms = 100\nwait_expiry_ms = 200")).await;
    let mut clerk = cluster.clerk();
    clerk.put("a", "1").await;
    clerk.append("a", "2").await;
    assert_eq!(clerk.get("a").await, "12");

    sleep(Duration::from_millis(600)).await;
    for replica in &cluster.replicas {
        assert_eq!(replica.pending_waits(), 0);
    }
}

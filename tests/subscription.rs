//! End-to-end subscription tests against a real listener

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, MaybeTlsStream};
use tokio_tungstenite::tungstenite::protocol::Message;

use k8s_visualizer::api::ApiServer;
use k8s_visualizer::cluster::{ClientFactory, ClientHandle, ClusterClient};
use k8s_visualizer::models::{ConfigMap, Deployment, NamespaceMeta, Pod, Secret, Service};
use k8s_visualizer::{Config, MonitorContext, Result};

/// Cluster with fixed contents
#[derive(Clone, Default)]
struct StaticCluster {
    namespaces: Vec<&'static str>,
    pods: Vec<(&'static str, &'static str)>,
    /// Extra generated namespaces, to make frames large
    bulk: usize,
}

#[async_trait]
impl ClusterClient for StaticCluster {
    async fn probe(&self) -> Result<()> {
        Ok(())
    }

    async fn list_namespaces(&self) -> Result<Vec<NamespaceMeta>> {
        Ok(self
            .namespaces
            .iter()
            .map(|name| NamespaceMeta::new(*name))
            .chain((0..self.bulk).map(|i| NamespaceMeta::new(format!("bulk-{}", i))))
            .collect())
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>> {
        if namespace != "default" {
            return Ok(Vec::new());
        }
        Ok(self
            .pods
            .iter()
            .map(|(name, phase)| Pod {
                name: name.to_string(),
                status: phase.to_string(),
                ..Default::default()
            })
            .collect())
    }

    async fn list_deployments(&self, _namespace: &str) -> Result<Vec<Deployment>> {
        Ok(vec![Deployment {
            name: "web".to_string(),
            status: "True".to_string(),
            labels: BTreeMap::from([("app".to_string(), "web".to_string())]),
            ..Default::default()
        }])
    }

    async fn list_services(&self, _namespace: &str) -> Result<Vec<Service>> {
        Ok(Vec::new())
    }

    async fn list_secrets(&self, _namespace: &str) -> Result<Vec<Secret>> {
        Ok(Vec::new())
    }

    async fn list_config_maps(&self, _namespace: &str) -> Result<Vec<ConfigMap>> {
        Ok(vec![ConfigMap {
            name: "kube-root-ca.crt".to_string(),
        }])
    }

    fn source(&self) -> String {
        "static".to_string()
    }
}

#[async_trait]
impl ClientFactory for StaticCluster {
    async fn connect(&self) -> Result<Box<dyn ClusterClient>> {
        Ok(Box::new(self.clone()))
    }
}

struct Running {
    addr: std::net::SocketAddr,
    context: MonitorContext,
    shutdown: watch::Sender<bool>,
}

async fn start(cluster: StaticCluster) -> Running {
    let mut config = Config::default();
    config.collector.poll_interval = Duration::from_millis(200);
    start_with(cluster, config).await
}

async fn start_with(cluster: StaticCluster, config: Config) -> Running {
    let context = MonitorContext::new(config.clone(), ClientHandle::with_client(Box::new(cluster.clone())));
    let (shutdown, _) = watch::channel(false);
    let tasks = context.spawn(Arc::new(cluster), &shutdown);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = ApiServer::new(config.server.clone(), context.app_state(&tasks));
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move { server.serve(listener, server_shutdown).await.unwrap() });

    Running {
        addr,
        context,
        shutdown,
    }
}

async fn next_snapshot<S>(ws: &mut S) -> Value
where
    S: StreamExt<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("no snapshot within 5s")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_empty_cluster_streams_empty_array() {
    let running = start(StaticCluster::default()).await;

    let (mut ws, _) = connect_async(format!("ws://{}/ws", running.addr)).await.unwrap();

    assert_eq!(next_snapshot(&mut ws).await, Value::Array(Vec::new()));

    running.shutdown.send(true).unwrap();
}

#[tokio::test]
async fn test_subscriber_receives_cluster_snapshot() {
    let running = start(StaticCluster {
        namespaces: vec!["default", "kube-system"],
        pods: vec![("web-1", "Running"), ("web-2", "Pending")],
        ..Default::default()
    })
    .await;

    let (mut ws, _) = connect_async(format!("ws://{}/ws", running.addr)).await.unwrap();
    let snapshot = next_snapshot(&mut ws).await;

    let namespaces = snapshot.as_array().unwrap();
    assert_eq!(namespaces.len(), 2);

    let default = &namespaces[0];
    assert_eq!(default["name"], "default");
    assert_eq!(default["pods"][0]["name"], "web-1");
    assert_eq!(default["pods"][0]["status"], "Running");
    assert_eq!(default["pods"][1]["status"], "Pending");
    assert_eq!(default["deployments"][0]["labels"]["app"], "web");
    assert_eq!(default["config_maps"][0]["name"], "kube-root-ca.crt");
    assert_eq!(namespaces[1]["name"], "kube-system");
    assert_eq!(namespaces[1]["pods"], Value::Array(Vec::new()));

    running.shutdown.send(true).unwrap();
}

#[tokio::test]
async fn test_closed_subscriber_is_unregistered() {
    let running = start(StaticCluster {
        namespaces: vec!["default"],
        ..Default::default()
    })
    .await;

    let (mut ws, _) = connect_async(format!("ws://{}/ws", running.addr)).await.unwrap();
    next_snapshot(&mut ws).await;
    assert_eq!(running.context.registry.len(), 1);

    ws.close(None).await.unwrap();
    drop(ws);

    let mut waited = Duration::ZERO;
    while !running.context.registry.is_empty() {
        assert!(waited < Duration::from_secs(5), "subscriber still registered");
        sleep(Duration::from_millis(50)).await;
        waited += Duration::from_millis(50);
    }

    running.shutdown.send(true).unwrap();
}

/// State of the IPv4 TCP socket bound to `local_port` and connected to
/// `remote_port`, as listed in /proc/net/tcp
#[cfg(target_os = "linux")]
fn tcp_state(local_port: u16, remote_port: u16) -> Option<u8> {
    let port = |addr: &str| {
        addr.rsplit(':')
            .next()
            .and_then(|p| u16::from_str_radix(p, 16).ok())
    };

    let table = std::fs::read_to_string("/proc/net/tcp").ok()?;
    table.lines().skip(1).find_map(|line| {
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() < 4 {
            return None;
        }
        if port(cols[1])? == local_port && port(cols[2])? == remote_port {
            u8::from_str_radix(cols[3], 16).ok()
        } else {
            None
        }
    })
}

#[cfg(target_os = "linux")]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stalled_subscriber_socket_is_closed_after_eviction() {
    const TCP_ESTABLISHED: u8 = 0x01;

    let mut config = Config::default();
    config.collector.poll_interval = Duration::from_millis(100);
    config.broadcast.send_timeout = Duration::from_secs(1);

    let running = start_with(
        StaticCluster {
            namespaces: vec!["default"],
            bulk: 4000,
            ..Default::default()
        },
        config,
    )
    .await;

    // Never read from this socket
    let (ws, _) = connect_async(format!("ws://{}/ws", running.addr)).await.unwrap();
    let client_port = match ws.get_ref() {
        MaybeTlsStream::Plain(stream) => stream.local_addr().unwrap().port(),
        _ => unreachable!("plain ws:// connection"),
    };
    let server_port = running.addr.port();

    let mut waited = Duration::ZERO;
    while running.context.registry.is_empty() {
        assert!(waited < Duration::from_secs(5), "subscriber never registered");
        sleep(Duration::from_millis(50)).await;
        waited += Duration::from_millis(50);
    }

    let mut waited = Duration::ZERO;
    while !running.context.registry.is_empty() {
        assert!(waited < Duration::from_secs(30), "stalled subscriber never evicted");
        sleep(Duration::from_millis(100)).await;
        waited += Duration::from_millis(100);
    }

    let mut waited = Duration::ZERO;
    while tcp_state(server_port, client_port) == Some(TCP_ESTABLISHED) {
        assert!(
            waited < Duration::from_secs(10),
            "server kept the evicted subscriber's socket open"
        );
        sleep(Duration::from_millis(100)).await;
        waited += Duration::from_millis(100);
    }

    drop(ws);
    running.shutdown.send(true).unwrap();
}

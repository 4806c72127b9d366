//! Bootstrap, run, checkpoint and restore a single-node network end to end

use std::net::TcpListener;
use std::path::Path;
use std::time::Duration;

use devnet_express::chain::{create_network_file, create_wallet, get_account};
use devnet_express::storage::{SqliteStore, StorageBackend};
use devnet_express::{
    reset_node, run_node, ChainDescriptor, ChainError, CheckpointEngine, CheckpointMode,
    EngineConfig, ErrorKind, NodeRuntimeGuard, RpcNodeRuntime,
};
use tokio_util::sync::CancellationToken;

// Initialize logger for tests (only once)
static INIT: std::sync::Once = std::sync::Once::new();

fn init() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("error")),
            )
            .with_test_writer()
            .try_init();
    });
}

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn test_config(dir: &Path) -> EngineConfig {
    EngineConfig::default()
        .with_data_root(dir.join("nodes"))
        .with_lock_dir(dir.join("locks"))
        .with_rpc_timeout(Duration::from_secs(10))
}

fn entries(data_path: &Path) -> Vec<(Vec<u8>, Vec<u8>)> {
    let store = SqliteStore::open(data_path).unwrap();
    let entries = store.entries().unwrap();
    store.close().unwrap();
    entries
}

async fn wait_for(guard: &NodeRuntimeGuard, identity: &str, running: bool) {
    for _ in 0..300 {
        if guard.probe(identity).unwrap() == running {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("guard for {} never became running={}", identity, running);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_single_node_checkpoint_lifecycle() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let chain_file = dir.path().join("default.devnet.json");

    // bootstrap and persist; add an ad-hoc wallet like the CLI does
    let mut chain = create_network_file(&chain_file, 1, &config).unwrap();
    let alice = create_wallet(&chain, "alice").unwrap();
    chain.wallets.push(alice);
    chain.consensus_nodes[0].rpc_port = free_port();
    chain.save(&chain_file).unwrap();
    let chain = ChainDescriptor::load(&chain_file).unwrap();
    assert!(get_account(&chain, "alice").is_some());
    assert!(get_account(&chain, "genesis").unwrap().is_multi_sig());

    let data_path = chain.node_data_path(&config, 0).unwrap();
    let identity = chain.runtime_identity(0).unwrap();
    let guard = NodeRuntimeGuard::new(&config.lock_dir);

    let store = SqliteStore::open(&data_path).unwrap();
    store.put(b"height", b"10").unwrap();
    store.close().unwrap();

    // run the node and take an online checkpoint
    let token = CancellationToken::new();
    let node = {
        let (chain, config, token) = (chain.clone(), config.clone(), token.clone());
        tokio::spawn(async move {
            run_node(&RpcNodeRuntime::new(), &chain, 0, &config, false, token).await
        })
    };
    wait_for(&guard, &identity, true).await;

    let engine = CheckpointEngine::from_config(config.clone()).unwrap();
    let online = dir.path().join("online.devnet-checkpoint");
    let mut outcome = None;
    for _ in 0..50 {
        match engine.create(&chain, &online, &CancellationToken::new()).await {
            Ok(done) => {
                outcome = Some(done);
                break;
            }
            // the endpoint may still be binding
            Err(e) if e.kind() == ErrorKind::Rpc => {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            Err(e) => panic!("online checkpoint failed: {}", e),
        }
    }
    assert_eq!(outcome.unwrap().mode, CheckpointMode::Online);

    // a running node refuses reset and restore
    assert!(matches!(
        reset_node(&chain, 0, &config),
        Err(ChainError::NodeRunning(_))
    ));
    assert!(matches!(
        engine.restore(&chain, &online, true),
        Err(ChainError::NodeRunning(_))
    ));

    token.cancel();
    node.await.unwrap().unwrap();
    wait_for(&guard, &identity, false).await;

    // offline checkpoint of the same state
    let offline = dir.path().join("offline.devnet-checkpoint");
    let outcome = engine
        .create(&chain, &offline, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.mode, CheckpointMode::Offline);

    // wipe the node, then bring it back from each checkpoint
    reset_node(&chain, 0, &config).unwrap();
    assert!(!data_path.exists());

    engine.restore(&chain, &online, false).unwrap();
    assert_eq!(entries(&data_path), vec![(b"height".to_vec(), b"10".to_vec())]);

    let store = SqliteStore::open(&data_path).unwrap();
    store.put(b"height", b"11").unwrap();
    store.close().unwrap();

    let refused = engine.restore(&chain, &offline, false).unwrap_err();
    assert_eq!(refused.kind(), ErrorKind::Precondition);
    engine.restore(&chain, &offline, true).unwrap();
    assert_eq!(entries(&data_path), vec![(b"height".to_vec(), b"10".to_vec())]);
}

#[tokio::test]
async fn test_checkpoint_cannot_cross_networks() {
    init();
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let first = create_network_file(&dir.path().join("first.json"), 1, &config).unwrap();
    let second = create_network_file(&dir.path().join("second.json"), 1, &config).unwrap();
    assert_ne!(first.magic, second.magic);

    SqliteStore::open(&first.node_data_path(&config, 0).unwrap())
        .unwrap()
        .close()
        .unwrap();

    let engine = CheckpointEngine::from_config(config.clone()).unwrap();
    let archive = dir.path().join("first.devnet-checkpoint");
    engine
        .create(&first, &archive, &CancellationToken::new())
        .await
        .unwrap();

    let error = engine.restore(&second, &archive, true).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::InvalidCheckpoint);
    assert_eq!(error.to_string(), "Invalid checkpoint");
    assert!(!second.node_data_path(&config, 0).unwrap().exists());
}

//! Black-box upload/download/remove roundtrip against the public API,
//! covering multi-peer replication and encrypted transfer end to end.

use shardnet_core::file::{download_file, remove_file, upload_file, FileLayerConfig};
use shardnet_core::membership::send_connect;
use shardnet_core::{AesGcmCipher, Node, PeerAddress};
use std::fs;
use std::time::Duration;

fn spin_up() -> (Node, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let node = Node::bind("127.0.0.1", 0, dir.path()).unwrap();
    (node, dir)
}

fn small_cfg() -> FileLayerConfig {
    FileLayerConfig {
        chunk_size: 20,
        replication: 2,
    }
}

#[test]
fn upload_replicates_and_download_reassembles() {
    let (uploader, _du) = spin_up();
    let (peer_a, _da) = spin_up();
    let (peer_b, _db) = spin_up();

    let a_addr = PeerAddress::new("127.0.0.1", peer_a.local_addr().port());
    let b_addr = PeerAddress::new("127.0.0.1", peer_b.local_addr().port());
    send_connect(uploader.registry(), &a_addr).unwrap();
    send_connect(uploader.registry(), &b_addr).unwrap();
    std::thread::sleep(Duration::from_millis(200));

    let src_dir = tempfile::tempdir().unwrap();
    let src_path = src_dir.path().join("report.csv");
    let content = vec![b'z'; 97]; // spans several 20-byte parts
    fs::write(&src_path, &content).unwrap();

    upload_file(&uploader, &src_path, &small_cfg(), None).unwrap();

    // at least one of the two replication targets should hold every part
    let held_anywhere = peer_a.chunk_store().size(&shardnet_core::chunkstore::hex_digest(&content[..20])).unwrap().is_some()
        || peer_b.chunk_store().size(&shardnet_core::chunkstore::hex_digest(&content[..20])).unwrap().is_some();
    assert!(held_anywhere);

    let out_path = src_dir.path().join("report.recv.csv");
    download_file(&uploader, "report.csv", &out_path, None).unwrap();
    assert_eq!(fs::read(&out_path).unwrap(), content);

    uploader.shutdown();
    peer_a.shutdown();
    peer_b.shutdown();
}

#[test]
fn encrypted_roundtrip_and_removal() {
    let (uploader, _du) = spin_up();
    let (peer_a, _da) = spin_up();
    let a_addr = PeerAddress::new("127.0.0.1", peer_a.local_addr().port());
    send_connect(uploader.registry(), &a_addr).unwrap();
    std::thread::sleep(Duration::from_millis(200));

    let src_dir = tempfile::tempdir().unwrap();
    let src_path = src_dir.path().join("ledger.dat");
    fs::write(&src_path, b"top secret ledger contents").unwrap();

    let cipher = AesGcmCipher;
    upload_file(&uploader, &src_path, &small_cfg(), Some(&cipher)).unwrap();

    let out_path = src_dir.path().join("ledger.recv.dat");
    download_file(&uploader, "ledger.dat", &out_path, Some(&cipher)).unwrap();
    assert_eq!(fs::read(&out_path).unwrap(), b"top secret ledger contents");

    remove_file(&uploader, "ledger.dat").unwrap();
    assert!(uploader.manifest().get("ledger.dat").is_none());

    uploader.shutdown();
    peer_a.shutdown();
}

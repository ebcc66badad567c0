use std::thread;
use std::time::Duration;

use kademlia::{Node, NodeId};
use sha3::{Digest, Sha3_256};

fn key_of(input: &str) -> NodeId {
    let digest = Sha3_256::digest(input.as_bytes());
    let mut id = [0u8; kademlia::KEY_LENGTH];
    id.copy_from_slice(&digest[..kademlia::KEY_LENGTH]);
    NodeId::new(id)
}

fn main() {
    let a = Node::new("127.0.0.1:0").expect("node should bind");
    let b = Node::new("127.0.0.1:0").expect("node should bind");

    let b_contact = b.self_contact();
    a.do_ping(&b_contact.host, b_contact.port).expect("ping should succeed");
    // routing-table updates land on a background thread; give it a beat so
    // the iterative lookup below has a seed contact to start from.
    thread::sleep(Duration::from_millis(50));

    let key = key_of("Hello");
    a.do_store(&b_contact, key, b"World".to_vec()).expect("store should succeed");

    assert_eq!(b.local_find_value(&key).unwrap(), b"World".to_vec());
    assert_eq!(a.do_iterative_find_value(&key).unwrap(), b"World".to_vec());
}

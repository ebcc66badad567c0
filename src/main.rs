#[macro_use]
extern crate log;

use std::collections::HashMap;
use std::io;

use kademlia::{Node, NodeId};
use sha3::{Digest, Sha3_256};
use simplelog::{ColorChoice, CombinedLogger, Config, LevelFilter, TermLogger, TerminalMode};

/// Hashes an arbitrary string into a 160-bit `NodeId` so the CLI can take
/// human-readable keys on the command line.
fn key_of(input: &str) -> NodeId {
    let digest = Sha3_256::digest(input.as_bytes());
    let mut id = [0u8; kademlia::KEY_LENGTH];
    id.copy_from_slice(&digest[..kademlia::KEY_LENGTH]);
    NodeId::new(id)
}

/// A small interactive harness: spins up a 50-node network bootstrapped
/// through node 0, then accepts `new`/`ping`/`insert`/`get` commands on
/// stdin. Exercises the Node façade end to end; not part of the core.
fn main() {
    CombinedLogger::init(vec![TermLogger::new(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )])
    .expect("logger should initialize exactly once");

    let mut nodes: HashMap<u32, Node> = HashMap::new();
    let mut next_id = 0u32;

    let seed = Node::new("127.0.0.1:0").expect("seed node should bind");
    nodes.insert(next_id, seed.clone());
    next_id += 1;

    for _ in 0..49 {
        let node = Node::new("127.0.0.1:0").expect("node should bind");
        let seed_contact = seed.self_contact();
        if let Err(err) = node.do_ping(&seed_contact.host, seed_contact.port) {
            warn!("node {} failed to bootstrap through seed: {}", next_id, err);
        }
        nodes.insert(next_id, node);
        next_id += 1;
    }

    info!("started {} nodes; seed is {:?}", nodes.len(), seed.self_contact());

    let stdin = io::stdin();
    loop {
        println!("ready (new | ping A B | insert A key value | get A key)");
        let mut line = String::new();
        if stdin.read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let args: Vec<&str> = line.trim().split(' ').filter(|s| !s.is_empty()).collect();
        if args.is_empty() {
            continue;
        }

        match args[0] {
            "new" => {
                let node = Node::new("127.0.0.1:0").expect("node should bind");
                let seed_contact = seed.self_contact();
                if let Err(err) = node.do_ping(&seed_contact.host, seed_contact.port) {
                    warn!("node {} failed to bootstrap through seed: {}", next_id, err);
                }
                println!("created node {} at {:?}", next_id, node.self_contact());
                nodes.insert(next_id, node);
                next_id += 1;
            },
            "ping" if args.len() == 3 => {
                let (a, b) = match (args[1].parse::<u32>(), args[2].parse::<u32>()) {
                    (Ok(a), Ok(b)) => (a, b),
                    _ => continue,
                };
                if let (Some(from), Some(to)) = (nodes.get(&a), nodes.get(&b)) {
                    let to_contact = to.self_contact();
                    match from.do_ping(&to_contact.host, to_contact.port) {
                        Ok(contact) => println!("{} -> {} pong: {:?}", a, b, contact),
                        Err(err) => println!("{} -> {} ping failed: {}", a, b, err),
                    }
                }
            },
            "insert" if args.len() >= 4 => {
                let index = match args[1].parse::<u32>() {
                    Ok(index) => index,
                    Err(_) => continue,
                };
                let key = key_of(args[2]);
                let value = args[3..].join(" ").into_bytes();
                if let Some(node) = nodes.get(&index) {
                    match node.do_iterative_store(key, value) {
                        Ok(accepted) => println!("stored on {} peers", accepted.len()),
                        Err(err) => println!("store failed: {}", err),
                    }
                }
            },
            "get" if args.len() == 3 => {
                let index = match args[1].parse::<u32>() {
                    Ok(index) => index,
                    Err(_) => continue,
                };
                let key = key_of(args[2]);
                if let Some(node) = nodes.get(&index) {
                    match node.do_iterative_find_value(&key) {
                        Ok(value) => println!("{}", String::from_utf8_lossy(&value)),
                        Err(err) => println!("get failed: {}", err),
                    }
                }
            },
            _ => println!("unrecognized command"),
        }
    }

    for node in nodes.values() {
        node.shutdown();
    }
}

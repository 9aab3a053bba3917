#[macro_use]
extern crate log;
extern crate chord_dht;
extern crate simplelog;

use simplelog::{ColorChoice, CombinedLogger, LevelFilter, TermLogger, TerminalMode};
use std::collections::HashMap;
use std::env;
use std::io;

use chord_dht::{Config, DhtNode, Node};

const USAGE: &str = "usage: chord-dht [ip|auto] [first-port] [node-count] [log-level]";

const HELP: &str = "commands:
  new <port>                  start a node and join it through node 0
  put <index> <key> <value>   store a pair through a node
  get <index> <key>           read a key through a node
  delete <index> <key>        remove a key through a node
  ping <index> <addr>         check whether an address is online
  info <index>                print a node's ring pointers
  quit <index>                leave the ring gracefully
  forcequit <index>           leave the ring without notifying peers
  exit";

fn parse_level(level: &str) -> LevelFilter {
    match level {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

fn node_config(ip: &str) -> Config {
    if ip == "auto" {
        Config::default()
    } else {
        Config::with_ip(ip)
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let ip = args.get(1).map(String::as_str).unwrap_or("127.0.0.1").to_string();
    let first_port: u16 = match args.get(2).map(|port| port.parse()) {
        None => 8900,
        Some(Ok(port)) => port,
        Some(Err(_)) => {
            eprintln!("{}", USAGE);
            return;
        },
    };
    let node_count: u16 = match args.get(3).map(|count| count.parse()) {
        None => 5,
        Some(Ok(count)) => count,
        Some(Err(_)) => {
            eprintln!("{}", USAGE);
            return;
        },
    };
    let level = parse_level(args.get(4).map(String::as_str).unwrap_or("info"));

    if let Err(err) = CombinedLogger::init(vec![TermLogger::new(
        level,
        simplelog::Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]) {
        eprintln!("Error: could not initialise logger: {}", err);
    }

    let mut node_map: HashMap<usize, Node> = HashMap::new();
    for i in 0..node_count {
        let node = Node::new(first_port + i, node_config(&ip));
        DhtNode::run(&node);
        if i == 0 {
            DhtNode::create(&node);
        } else if !DhtNode::join(&node, &node_map[&0].node_data().addr) {
            warn!("Node {} could not join", i);
        }
        node_map.insert(node_map.len(), node);
    }

    let input = io::stdin();
    println!("{}", HELP);

    loop {
        let mut buffer = String::new();
        println!("Ready for input!");
        match input.read_line(&mut buffer) {
            Ok(0) | Err(_) => break,
            Ok(_) => {},
        }
        let args: Vec<&str> = buffer.trim_end().split(' ').collect();
        let node = args
            .get(1)
            .and_then(|index| index.parse::<usize>().ok())
            .and_then(|index| node_map.get(&index))
            .cloned();

        match (args[0], node) {
            ("new", _) => match args.get(1).and_then(|port| port.parse::<u16>().ok()) {
                Some(port) => {
                    let node = Node::new(port, node_config(&ip));
                    DhtNode::run(&node);
                    let joined = match node_map.get(&0) {
                        Some(introducer) => DhtNode::join(&node, &introducer.node_data().addr),
                        None => {
                            DhtNode::create(&node);
                            true
                        },
                    };
                    info!("Node {} started, joined: {}", node_map.len(), joined);
                    node_map.insert(node_map.len(), node);
                },
                None => println!("{}", HELP),
            },
            ("put", Some(node)) if args.len() >= 4 => {
                info!("{}", DhtNode::put(&node, args[2], &args[3..].join(" ")));
            },
            ("get", Some(node)) if args.len() >= 3 => {
                info!("{:?}", DhtNode::get(&node, args[2]));
            },
            ("delete", Some(node)) if args.len() >= 3 => {
                info!("{}", DhtNode::delete(&node, args[2]));
            },
            ("ping", Some(node)) if args.len() >= 3 => {
                info!("{}", DhtNode::ping(&node, args[2]));
            },
            ("info", Some(node)) => {
                info!(
                    "{:?} successors {:?} predecessor {:?} primary {} backup {}",
                    node.node_data(),
                    node.successor_list(),
                    node.predecessor(),
                    node.primary_len(),
                    node.backup_len()
                );
            },
            ("quit", Some(node)) => DhtNode::quit(&node),
            ("forcequit", Some(node)) => DhtNode::force_quit(&node),
            ("exit", _) => break,
            _ => println!("{}", HELP),
        }
    }

    for node in node_map.values() {
        DhtNode::quit(node);
    }
}

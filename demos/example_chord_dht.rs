extern crate chord_dht;

use chord_dht::{Config, Node};
use std::thread;
use std::time::Duration;

fn main() {
    let first = Node::new(8080, Config::with_ip("127.0.0.1"));
    first.run().expect("Error: could not start first node.");
    first.create().expect("Error: could not create ring.");

    let second = Node::new(8081, Config::with_ip("127.0.0.1"));
    second.run().expect("Error: could not start second node.");
    second
        .join(&first.node_data().addr)
        .expect("Error: could not join ring.");

    // stabilization is asynchronous, so give the ring a second to close
    thread::sleep(Duration::from_millis(1000));

    second.put("Hello", "World").expect("Error: put failed.");
    assert_eq!(first.get("Hello").unwrap(), "World");

    second.quit();
    assert_eq!(first.get("Hello").unwrap(), "World");
    first.quit();
}

// Reuse smoke test: many request/response round trips through one pair of
// contexts must not grow memory or leave buffers behind.
//
// cargo test --test memory_reuse -- --nocapture

use dmxp_router::{MessageBuffer, RouteTable, Status, TransportContext};
use memory_stats::memory_stats;

const WARMUP: usize = 1_000;
const ROUNDS: usize = 20_000;

struct Working {
    out: MessageBuffer,
    request: MessageBuffer,
    inbox: MessageBuffer,
}

fn physical_mb() -> Option<f64> {
    memory_stats().map(|m| m.physical_mem as f64 / (1024.0 * 1024.0))
}

fn round(client: &TransportContext, server: &TransportContext, bufs: Working, i: usize) -> Working {
    let size = fastrand::usize(1..=4096);
    let body = vec![(i % 251) as u8; size];

    let mut out = bufs.out;
    out.set_message_type(1);
    let out = client.send(out.set_payload(&body));
    assert_eq!(out.status(), Status::Ok);

    let request = server.receive(bufs.request, 1000);
    assert_eq!(request.len(), size);
    let request = server.return_to_sender(request);
    assert_eq!(request.status(), Status::Ok);

    let inbox = client.receive(bufs.inbox, 1000);
    assert_eq!(inbox.payload(), &body[..]);

    Working { out, request, inbox }
}

#[test]
fn round_trips_reuse_buffers() {
    let server = TransportContext::builder().bind("47401").build().unwrap();
    let routes = RouteTable::new().route(1, None, [["localhost:47401"]]);
    let client = TransportContext::builder()
        .bind("47402")
        .routes(routes)
        .build()
        .unwrap();

    let mut bufs = Working {
        out: client.allocate(0).unwrap(),
        request: server.allocate(0).unwrap(),
        inbox: client.allocate(0).unwrap(),
    };

    for i in 0..WARMUP {
        bufs = round(&client, &server, bufs, i);
    }
    let before = physical_mb();
    for i in 0..ROUNDS {
        bufs = round(&client, &server, bufs, i);
    }
    let after = physical_mb();

    println!("physical memory: before {before:?} MB, after {after:?} MB");
    if let (Some(before), Some(after)) = (before, after) {
        assert!(after - before < 32.0, "grew {:.1} MB over {ROUNDS} rounds", after - before);
    }

    // only the three working buffers are alive
    assert_eq!(client.outstanding_buffers(), 2);
    assert_eq!(server.outstanding_buffers(), 1);
    drop(bufs);
    assert_eq!(client.outstanding_buffers(), 0);
    assert_eq!(server.outstanding_buffers(), 0);
}

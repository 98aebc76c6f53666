use dmxp_router::{ContextBuilder, InitFlags, RouteTable, RouterError, Status, TransportContext, TypeFilter};
use serial_test::serial;
use std::thread;
use std::time::{Duration, Instant};

const PING: i32 = 100;
const PONG: i32 = 101;

fn endpoint(port: u16) -> String {
    format!("localhost:{port}")
}

fn builder(port: u16) -> ContextBuilder {
    TransportContext::builder().bind(&port.to_string())
}

fn bound(port: u16) -> TransportContext {
    builder(port).build().expect("bind receiver")
}

/// Sender whose `mtype` routes to the given ports.
fn sender_to(port: u16, mtype: i32, targets: &[u16]) -> TransportContext {
    let routes = RouteTable::new().route(mtype, None, [targets.iter().map(|p| endpoint(*p)).collect::<Vec<_>>()]);
    builder(port).routes(routes).build().expect("bind sender")
}

#[test]
fn send_then_receive_delivers_header_and_payload() {
    let rx = bound(47101);
    let tx = sender_to(47102, PING, &[47101]);

    let mut msg = tx.allocate(64).unwrap();
    msg.set_message_type(PING);
    msg.set_subscription_id(Some(3));
    msg.set_transaction_id_str("round-trip");
    msg.set_meid_str("cell-7");
    let msg = tx.send(msg.set_payload(b"ping"));
    assert_eq!(msg.status(), Status::Ok, "send: {:?}", msg);

    let got = rx.receive(rx.allocate(0).unwrap(), 1000);
    assert_eq!(got.status(), Status::Ok);
    assert_eq!(got.message_type(), PING);
    assert_eq!(got.subscription_id(), Some(3));
    assert_eq!(got.payload(), b"ping");
    assert_eq!(&got.transaction_id()[..10], b"round-trip");
    assert_eq!(&got.get_meid()[..6], b"cell-7");
    assert_eq!(got.source(), endpoint(47102));
    assert!(!got.expects_reply());
}

#[test]
fn zero_timeout_receive_returns_promptly_when_empty() {
    let rx = bound(47103);

    let started = Instant::now();
    let msg = rx.receive(rx.allocate(0).unwrap(), 0);
    let elapsed = started.elapsed();

    println!("poll returned {:?} in {elapsed:?}", msg.status());
    assert_ne!(msg.status(), Status::Ok);
    assert_eq!(msg.status(), Status::Timeout);
    assert_eq!(msg.tp_state(), libc::EAGAIN);
    assert!(elapsed < Duration::from_millis(100));
}

#[test]
#[serial]
fn timed_receive_gives_up_after_bound() {
    let rx = bound(47104);

    let started = Instant::now();
    let msg = rx.receive(rx.allocate(0).unwrap(), 50);
    let elapsed = started.elapsed();

    assert_eq!(msg.status(), Status::Timeout);
    assert_eq!(msg.tp_state(), libc::ETIMEDOUT);
    assert!(elapsed >= Duration::from_millis(50), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "{elapsed:?}");
}

#[test]
#[serial]
fn blocking_receive_wakes_on_send() {
    let rx = bound(47105);
    let tx = sender_to(47106, PING, &[47105]);

    thread::scope(|s| {
        let waiter = s.spawn(|| rx.receive_blocking(rx.allocate(0).unwrap()));
        thread::sleep(Duration::from_millis(30));
        let mut msg = tx.allocate(0).unwrap();
        msg.set_message_type(PING);
        assert!(tx.send(msg.set_payload(b"wake")).is_ok());

        let got = waiter.join().unwrap();
        assert_eq!(got.status(), Status::Ok);
        assert_eq!(got.payload(), b"wake");
    });
}

#[test]
#[serial]
fn blocked_receive_wakes_on_close() {
    let rx = bound(47107);

    let buf = rx.allocate(0).unwrap();
    let rx_ref = &rx;
    thread::scope(|s| {
        let waiter = s.spawn(move || rx_ref.receive(buf, -1));
        thread::sleep(Duration::from_millis(30));
        rx.close();

        let got = waiter.join().unwrap();
        assert_eq!(got.status(), Status::BadArgument);
        assert_eq!(got.tp_state(), libc::EBADF);
    });
}

#[test]
fn unrouted_type_has_no_endpoint() {
    let tx = sender_to(47108, PING, &[47109]);
    let mut msg = tx.allocate(0).unwrap();
    msg.set_message_type(PING + 50);

    let msg = tx.send(msg);
    assert_eq!(msg.status(), Status::NoEndpoint);
}

#[test]
fn unbound_route_endpoint_fails_send() {
    let tx = sender_to(47110, PING, &[47111]);
    assert!(!tx.is_ready());

    let mut msg = tx.allocate(0).unwrap();
    msg.set_message_type(PING);
    let msg = tx.send(msg);
    assert_eq!(msg.status(), Status::SendFailed);
    assert_eq!(msg.tp_state(), libc::ECONNREFUSED);
}

#[test]
fn readiness_tracks_route_endpoints() {
    let tx = sender_to(47112, PING, &[47113]);
    assert!(!tx.is_ready());

    let rx = bound(47113);
    assert!(rx.is_ready(), "no routes: ready at once");
    assert!(tx.is_ready());

    rx.close();
    assert!(!rx.is_ready());
    assert!(!tx.is_ready());
}

#[test]
fn send_on_closed_context_is_bad_argument() {
    let _rx = bound(47114);
    let tx = sender_to(47115, PING, &[47114]);
    let mut msg = tx.allocate(0).unwrap();
    msg.set_message_type(PING);

    tx.close();
    tx.close(); // no-op

    let msg = tx.send(msg);
    assert_eq!(msg.status(), Status::BadArgument);
    assert_eq!(msg.tp_state(), libc::EBADF);

    let msg = tx.receive(msg, 0);
    assert_eq!(msg.status(), Status::BadArgument);
}

#[test]
fn foreign_buffer_is_refused() {
    let a = bound(47116);
    let b = sender_to(47117, PING, &[47116]);

    let mut msg = a.allocate(0).unwrap();
    msg.set_message_type(PING);
    let msg = b.send(msg);
    assert_eq!(msg.status(), Status::BadArgument);
    assert_eq!(msg.tp_state(), libc::EINVAL);
}

#[test]
fn duplicate_bind_fails_init() {
    let _first = bound(47118);
    match builder(47118).build() {
        Err(e @ RouterError::InitFailed { .. }) => {
            println!("second bind refused: {e}");
            assert_eq!(e.status(), Status::InitFailed);
        }
        other => panic!("expected InitFailed, got {other:?}"),
    }

    // released on close
    drop(_first);
    assert!(builder(47118).build().is_ok());
}

#[test]
fn bind_spec_forms() {
    let a = TransportContext::init(":47119", 0, InitFlags::NONE).unwrap();
    let b = TransportContext::init("tcp:47120", 0, InitFlags::NONE).unwrap();
    let c = TransportContext::init("127.0.0.1:47121", 0, InitFlags::NONE).unwrap();
    assert_eq!(a.endpoint(), "localhost:47119");
    assert_eq!(b.endpoint(), "localhost:47120");
    assert_eq!(c.endpoint(), "127.0.0.1:47121");

    assert!(matches!(
        TransportContext::init("not-a-port", 0, InitFlags::NONE),
        Err(RouterError::InitFailed { .. })
    ));
}

#[test]
fn return_to_sender_replies_to_source() {
    let server = bound(47122);
    let client = sender_to(47123, PING, &[47122]);

    let mut msg = client.allocate(0).unwrap();
    msg.set_message_type(PING);
    assert!(client.send(msg.set_payload(b"ping")).is_ok());

    let mut req = server.receive(server.allocate(0).unwrap(), 1000);
    assert!(req.is_ok());
    req.set_message_type(PONG);
    let reply = server.return_to_sender(req.set_payload(b"pong"));
    assert_eq!(reply.status(), Status::Ok);

    let got = client.receive(client.allocate(0).unwrap(), 1000);
    assert!(got.is_ok());
    assert!(got.is_reply());
    assert_eq!(got.message_type(), PONG);
    assert_eq!(got.payload(), b"pong");
    assert_eq!(got.source(), endpoint(47122));
}

#[test]
fn return_to_sender_without_source_is_missing_header() {
    let ctx = bound(47124);
    let msg = ctx.return_to_sender(ctx.allocate(0).unwrap());
    assert_eq!(msg.status(), Status::NoHeader);
}

#[test]
#[serial]
fn call_waits_for_matching_reply() {
    let server = bound(47125);
    let client = sender_to(47126, PING, &[47125]);

    thread::scope(|s| {
        s.spawn(|| {
            let mut req = server.receive(server.allocate(0).unwrap(), 2000);
            assert!(req.is_ok());
            assert!(req.expects_reply());
            req.set_message_type(PONG);
            let reply = server.return_to_sender(req.set_payload(b"pong"));
            assert!(reply.is_ok());
        });

        let mut msg = client.allocate(0).unwrap();
        msg.set_message_type(PING);
        let reply = client.call(msg.set_payload(b"ping"));

        assert_eq!(reply.status(), Status::Ok, "{reply:?}");
        assert_eq!(reply.message_type(), PONG);
        assert_eq!(reply.payload(), b"pong");
        // generated because it was unset
        assert!(reply.transaction_id().iter().all(|b| b.is_ascii_hexdigit()));
    });
}

#[test]
#[serial]
fn call_without_reply_times_out() {
    let _server = bound(47127);
    let routes = RouteTable::new().route(PING, None, [[endpoint(47127)]]);
    let client = builder(47128)
        .routes(routes)
        .call_timeout(Duration::from_millis(50))
        .build()
        .unwrap();

    let mut msg = client.allocate(0).unwrap();
    msg.set_message_type(PING);
    let reply = client.call(msg);
    assert_eq!(reply.status(), Status::Timeout);
}

#[test]
fn call_send_failure_is_call_failed() {
    let client = sender_to(47129, PING, &[47130]);
    let mut msg = client.allocate(0).unwrap();
    msg.set_message_type(PING);

    let reply = client.call(msg);
    assert_eq!(reply.status(), Status::CallFailed);
    assert_eq!(reply.tp_state(), libc::ECONNREFUSED);
}

#[test]
fn receive_specific_parks_others_in_order() {
    let rx = bound(47131);
    let tx = sender_to(47132, PING, &[47131]);

    for xid in ["first", "wanted", "third"] {
        let mut msg = tx.allocate(0).unwrap();
        msg.set_message_type(PING);
        msg.set_transaction_id_str(xid);
        assert!(tx.send(msg.set_payload(xid.as_bytes())).is_ok());
    }

    let got = rx.receive_specific(rx.allocate(0).unwrap(), b"wanted", 1000);
    assert!(got.is_ok());
    assert_eq!(got.payload(), b"wanted");

    let got = rx.receive(got, 0);
    assert_eq!(got.payload(), b"first");
    let got = rx.receive(got, 0);
    assert_eq!(got.payload(), b"third");
    let got = rx.receive(got, 0);
    assert_eq!(got.status(), Status::Timeout);
}

#[test]
fn park_overflow_is_receive_failed() {
    let rx = builder(47133).queue_depth(2).build().unwrap();
    let tx = sender_to(47134, PING, &[47133]);
    tx.set_send_timeout(0);

    let send = |n: u8| {
        let mut msg = tx.allocate(0).unwrap();
        msg.set_message_type(PING);
        msg.set_transaction_id(&[n]);
        tx.send(msg).status()
    };

    assert_eq!(send(1), Status::Ok);
    assert_eq!(send(2), Status::Ok);
    let probe = rx.receive_specific(rx.allocate(0).unwrap(), b"none", 0);
    assert_eq!(probe.status(), Status::Timeout, "both parked");

    assert_eq!(send(3), Status::Ok);
    let probe = rx.receive_specific(probe, b"none", 0);
    assert_eq!(probe.status(), Status::ReceiveFailed);
    assert_eq!(probe.tp_state(), libc::ENOBUFS);

    // the overflow left the third message queued; nothing was dropped
    let ids: Vec<u8> = rx
        .drain(TypeFilter::All)
        .messages
        .iter()
        .map(|s| s.transaction_id[0])
        .collect();
    println!("after overflow: {ids:?}");
    assert_eq!(ids, vec![1, 2, 3]);
}

#[test]
fn oversized_message_arrives_truncated() {
    let rx = builder(47135).max_receive_size(16).build().unwrap();
    let tx = sender_to(47136, PING, &[47135]);

    let mut msg = tx.allocate(0).unwrap();
    msg.set_message_type(PING);
    assert!(tx.send(msg.set_payload(&[7u8; 40])).is_ok());

    let got = rx.receive(rx.allocate(0).unwrap(), 1000);
    assert_eq!(got.status(), Status::Truncated);
    assert_eq!(got.tp_state(), libc::EMSGSIZE);
    assert_eq!(got.payload(), &[7u8; 16]);
}

#[test]
fn receive_grows_small_buffer() {
    let rx = bound(47137);
    let tx = sender_to(47138, PING, &[47137]);

    let payload: Vec<u8> = (0..300).map(|_| fastrand::u8(..)).collect();
    let mut msg = tx.allocate(0).unwrap();
    msg.set_message_type(PING);
    assert!(tx.send(msg.set_payload(&payload)).is_ok());

    let small = rx.allocate(8).unwrap();
    let small_id = small.id();
    let got = rx.receive(small, 1000);
    assert!(got.is_ok());
    assert_ne!(got.id(), small_id);
    assert_eq!(got.payload(), &payload[..]);
}

#[test]
fn auto_alloc_hands_back_fresh_buffer() {
    let _rx = bound(47139);
    let routes = RouteTable::new().route(PING, None, [[endpoint(47139)]]);
    let tx = builder(47140).routes(routes).flags(InitFlags::AUTO_ALLOC).build().unwrap();

    let mut msg = tx.allocate(128).unwrap();
    msg.set_message_type(PING);
    let msg = msg.set_payload(b"sent");
    let (id, capacity) = (msg.id(), msg.capacity());

    let fresh = tx.send(msg);
    assert!(fresh.is_ok());
    assert_ne!(fresh.id(), id);
    assert_eq!(fresh.capacity(), capacity);
    assert_eq!(fresh.len(), 0);
    assert_eq!(fresh.message_type(), 0);
    assert_eq!(tx.outstanding_buffers(), 1);
}

#[test]
fn fanout_and_round_robin() {
    let a1 = bound(47141);
    let a2 = bound(47142);
    let b = bound(47143);
    let routes = RouteTable::new().route(
        PING,
        None,
        vec![vec![endpoint(47141), endpoint(47142)], vec![endpoint(47143)]],
    );
    let tx = builder(47144).routes(routes).build().unwrap();

    for _ in 0..4 {
        let mut msg = tx.allocate(0).unwrap();
        msg.set_message_type(PING);
        assert!(tx.send(msg).is_ok());
    }

    assert_eq!(a1.drain(TypeFilter::All).len(), 2);
    assert_eq!(a2.drain(TypeFilter::All).len(), 2);
    assert_eq!(b.drain(TypeFilter::All).len(), 4);
}

#[test]
fn subscription_routes_take_precedence() {
    let generic = bound(47145);
    let special = bound(47146);
    let routes = RouteTable::new()
        .route(PING, None, [[endpoint(47145)]])
        .route(PING, Some(9), [[endpoint(47146)]]);
    let tx = builder(47147).routes(routes).build().unwrap();

    for sub_id in [Some(9), Some(1), None] {
        let mut msg = tx.allocate(0).unwrap();
        msg.set_message_type(PING);
        msg.set_subscription_id(sub_id);
        assert!(tx.send(msg).is_ok());
    }

    assert_eq!(special.drain(TypeFilter::All).len(), 1);
    assert_eq!(generic.drain(TypeFilter::All).len(), 2);
}

#[test]
fn channels_bypass_routes() {
    let rx = bound(47148);
    let other = bound(47149);
    let tx = bound(47150);

    let mut msg = tx.allocate(0).unwrap();
    msg.set_message_type(PING);
    let msg = tx.send_on_channel(dmxp_router::ChannelId::from_raw(0), msg);
    assert_eq!(msg.status(), Status::NoChannelOpen);

    let ch = tx.open_channel(&endpoint(47148)).unwrap();
    let ch2 = tx.open_channel("47149").unwrap();
    assert_ne!(ch, ch2);

    let msg = tx.send_on_channel(ch, msg.set_payload(b"direct"));
    assert_eq!(msg.status(), Status::Ok);
    let got = rx.receive(rx.allocate(0).unwrap(), 1000);
    assert_eq!(got.payload(), b"direct");

    assert!(tx.close_channel(ch));
    assert!(!tx.close_channel(ch));
    let msg = tx.send_on_channel(ch, msg);
    assert_eq!(msg.status(), Status::InvalidChannelId);

    assert!(tx.send_on_channel(ch2, msg).is_ok());
    assert_eq!(other.drain(TypeFilter::All).len(), 1);

    assert!(matches!(
        tx.open_channel("47151"),
        Err(RouterError::ChannelOpen { .. })
    ));
}

#[test]
#[serial]
fn full_queue_is_retryable_and_eventually_sends() {
    let rx = builder(47152).queue_depth(4).build().unwrap();
    let tx = sender_to(47153, PING, &[47152]);

    let make = || {
        let mut msg = tx.allocate(0).unwrap();
        msg.set_message_type(PING);
        msg
    };

    tx.set_send_timeout(0);
    for _ in 0..4 {
        assert!(tx.send(make()).is_ok());
    }
    let refused = tx.send(make());
    assert_eq!(refused.status(), Status::Retry);
    assert_eq!(refused.tp_state(), libc::EAGAIN);
    assert!(refused.status().is_retryable());

    // default spin policy gives up as well while nobody drains
    tx.set_send_timeout(1);
    assert_eq!(tx.send(make()).status(), Status::Retry);

    thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(20));
            let mut drained = 0;
            let mut probe = rx.allocate(0).unwrap();
            while drained < 5 {
                probe = rx.receive(probe, 1000);
                assert!(probe.is_ok());
                drained += 1;
            }
        });

        // caller-side retry with bounded attempts and backoff
        let mut msg = refused;
        let mut nap = Duration::from_millis(1);
        let mut attempts = 0;
        loop {
            attempts += 1;
            msg = tx.send(msg);
            if !msg.status().is_retryable() || attempts == 50 {
                break;
            }
            thread::sleep(nap);
            nap = (nap * 2).min(Duration::from_millis(50));
        }
        println!("sent after {attempts} attempts");
        assert_eq!(msg.status(), Status::Ok);
    });
}

#[test]
#[serial]
fn sleeping_send_policy_waits_for_room() {
    let rx = builder(47154).queue_depth(2).build().unwrap();
    let tx = sender_to(47155, PING, &[47154]);
    tx.set_send_timeout(0);

    for _ in 0..2 {
        let mut msg = tx.allocate(0).unwrap();
        msg.set_message_type(PING);
        assert!(tx.send(msg).is_ok());
    }

    tx.set_send_timeout(2000);
    assert_eq!(tx.send_timeout().value(), 2000);
    thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(30));
            assert!(rx.receive(rx.allocate(0).unwrap(), 1000).is_ok());
        });

        let mut msg = tx.allocate(0).unwrap();
        msg.set_message_type(PING);
        let started = Instant::now();
        let msg = tx.send(msg);
        assert_eq!(msg.status(), Status::Ok);
        assert!(started.elapsed() >= Duration::from_millis(20));
    });

    tx.set_send_timeout(-5);
    assert_eq!(tx.send_timeout().value(), 0);
}

#[test]
fn subscription_id_minus_one_survives_the_wire() {
    let rx = bound(47156);
    let tx = sender_to(47157, PING, &[47156]);

    for sub_id in [Some(-1), None, Some(0)] {
        let mut msg = tx.allocate(0).unwrap();
        msg.set_message_type(PING);
        msg.set_subscription_id(sub_id);
        assert!(tx.send(msg).is_ok());

        let got = rx.receive(rx.allocate(0).unwrap(), 1000);
        assert_eq!(got.status(), Status::Ok);
        assert_eq!(got.subscription_id(), sub_id);
    }
}

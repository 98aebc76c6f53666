use dmxp_router::{drain, RouteTable, Status, TransportContext, TypeFilter};

fn pair(rx_port: u16, tx_port: u16, types: &[i32]) -> (TransportContext, TransportContext) {
    let rx = TransportContext::builder()
        .bind(&rx_port.to_string())
        .build()
        .unwrap();
    let mut routes = RouteTable::new();
    for mtype in types {
        routes.add_route(*mtype, None, [[format!("localhost:{rx_port}")]]);
    }
    let tx = TransportContext::builder()
        .bind(&tx_port.to_string())
        .routes(routes)
        .build()
        .unwrap();
    (rx, tx)
}

fn send_all(tx: &TransportContext, messages: &[(i32, String)]) {
    for (mtype, body) in messages {
        let mut msg = tx.allocate(0).unwrap();
        msg.set_message_type(*mtype);
        let msg = tx.send(msg.set_payload(body.as_bytes()));
        assert!(msg.is_ok(), "{msg:?}");
    }
}

#[test]
fn drain_without_filter_returns_everything_in_order() {
    let (rx, tx) = pair(47201, 47202, &[1]);
    let sent: Vec<(i32, String)> = (0..25).map(|i| (1, format!("msg-{i}"))).collect();
    send_all(&tx, &sent);

    let drained = drain(&rx, TypeFilter::All);
    assert_eq!(drained.len(), sent.len());
    for (summary, (_, body)) in drained.messages.iter().zip(&sent) {
        assert_eq!(summary.payload, body.as_bytes());
        assert_eq!(summary.status, Status::Ok);
        assert_eq!(summary.source, "localhost:47202");
    }
    assert!(drained.ran_dry());
    assert_eq!(drained.terminal_status, Status::Timeout);
    assert_eq!(drained.terminal_tp_state, libc::EAGAIN);

    // probe released, queue empty
    assert_eq!(rx.outstanding_buffers(), 0);
    assert!(rx.drain(TypeFilter::All).is_empty());
}

#[test]
fn drain_with_single_type_keeps_relative_order() {
    let (rx, tx) = pair(47203, 47204, &[1, 2, 3]);
    let sent: Vec<(i32, String)> = (0..30)
        .map(|i| (fastrand::i32(1..=3), format!("body-{i}")))
        .collect();
    send_all(&tx, &sent);

    let drained = rx.drain(2);
    let expected: Vec<&str> = sent
        .iter()
        .filter(|(mtype, _)| *mtype == 2)
        .map(|(_, body)| body.as_str())
        .collect();
    let got: Vec<String> = drained
        .messages
        .iter()
        .map(|s| String::from_utf8(s.payload.clone()).unwrap())
        .collect();

    println!("kept {} of {}", got.len(), sent.len());
    assert_eq!(got, expected);
    assert!(drained.messages.iter().all(|s| s.message_type == 2));

    // everything else was consumed and discarded
    assert!(rx.drain(TypeFilter::All).is_empty());
}

#[test]
fn drain_with_type_set() {
    let (rx, tx) = pair(47205, 47206, &[1, 2, 3]);
    let sent: Vec<(i32, String)> = vec![
        (1, "a".into()),
        (2, "b".into()),
        (3, "c".into()),
        (1, "d".into()),
        (3, "e".into()),
    ];
    send_all(&tx, &sent);

    let drained = rx.drain([1, 3]);
    let bodies: Vec<&[u8]> = drained.messages.iter().map(|s| s.payload.as_slice()).collect();
    assert_eq!(bodies, vec![&b"a"[..], &b"c"[..], &b"d"[..], &b"e"[..]]);
}

#[test]
fn drain_empty_queue_returns_nothing() {
    let (rx, _tx) = pair(47207, 47208, &[1]);
    let drained = rx.drain(Some(1));
    assert!(drained.is_empty());
    assert!(drained.ran_dry());
}

#[test]
fn drain_stops_at_truncated_message() {
    let rx = TransportContext::builder()
        .bind("47209")
        .max_receive_size(8)
        .build()
        .unwrap();
    let routes = RouteTable::new().route(1, None, [["localhost:47209"]]);
    let tx = TransportContext::builder()
        .bind("47210")
        .routes(routes)
        .build()
        .unwrap();

    send_all(
        &tx,
        &[(1, "ok".into()), (1, "far too long for eight".into()), (1, "after".into())],
    );

    let drained = rx.drain(TypeFilter::All);
    assert_eq!(drained.len(), 1);
    assert_eq!(drained.terminal_status, Status::Truncated);
    assert!(!drained.ran_dry());

    // the rest is still queued
    let rest = rx.drain(TypeFilter::All);
    assert_eq!(rest.len(), 1);
    assert_eq!(rest.messages[0].payload, b"after");
}

#[test]
fn drain_on_closed_context_reports_bad_argument() {
    let (rx, _tx) = pair(47211, 47212, &[1]);
    rx.close();
    let drained = rx.drain(TypeFilter::All);
    assert!(drained.is_empty());
    assert_eq!(drained.terminal_status, Status::BadArgument);
}

#[test]
fn drain_with_empty_type_set_keeps_everything() {
    let (rx, tx) = pair(47213, 47214, &[1, 2]);
    send_all(&tx, &[(1, "x".into()), (2, "y".into()), (1, "z".into())]);

    let drained = rx.drain(Vec::<i32>::new());
    assert_eq!(drained.len(), 3);
    assert!(drained.ran_dry());
}

#[test]
fn type_filter_conversions() {
    assert_eq!(TypeFilter::from(None::<i32>), TypeFilter::All);
    assert_eq!(TypeFilter::from(Some(4)), TypeFilter::Only(vec![4]));
    assert_eq!(TypeFilter::from(vec![1, 2]), TypeFilter::Only(vec![1, 2]));
    assert_eq!(TypeFilter::from(&[5, 6][..]), TypeFilter::Only(vec![5, 6]));
    assert!(TypeFilter::All.accepts(99));
    assert!(!TypeFilter::from(3).accepts(4));

    // an empty set filters nothing
    assert_eq!(TypeFilter::from(Vec::<i32>::new()), TypeFilter::All);
    assert_eq!(TypeFilter::from(&[0i32; 0][..]), TypeFilter::All);
    assert_eq!(TypeFilter::from([0i32; 0]), TypeFilter::All);
    assert!(TypeFilter::Only(Vec::new()).accepts(7));
}

//! Lookups against servers on the loopback interface.

mod common;

use bytes::Bytes;
use common::init_logging;
use domain_stub::base::{
    Class, Message, MessageBuilder, Rcode, Record, RecordData, Rtype,
};
use domain_stub::resolv::{
    AddrInfoHints, Channel, Family, ResolvConf, ServerConf, Status,
};
use std::net::{Ipv4Addr, SocketAddr};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};

const ADDR: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 7);

/// Creates the answer to a query.
///
/// A queries get one address, everything else an empty answer.
fn reply(query: &Message, truncate: bool) -> Message {
    let mut builder = MessageBuilder::start_answer(query, Rcode::NOERROR);
    if truncate {
        builder.header_mut().set_tc(true);
        return builder.finish().unwrap();
    }
    let question = query.first_question().unwrap();
    if question.qtype() == Rtype::A {
        builder.push_answer(Record::new(
            question.qname().clone(),
            Class::IN,
            3600,
            RecordData::A(ADDR),
        ));
    }
    builder.finish().unwrap()
}

async fn serve_udp(sock: UdpSocket, truncate: bool) {
    let mut buf = vec![0; 1500];
    while let Ok((len, peer)) = sock.recv_from(&mut buf).await {
        let octets = Bytes::copy_from_slice(&buf[..len]);
        let query = Message::from_octets(octets).unwrap();
        let answer = reply(&query, truncate);
        sock.send_to(answer.as_slice(), peer).await.unwrap();
    }
}

async fn serve_tcp(listener: TcpListener) {
    while let Ok((mut sock, _)) = listener.accept().await {
        let len = usize::from(sock.read_u16().await.unwrap());
        let mut buf = vec![0; len];
        sock.read_exact(&mut buf).await.unwrap();
        let query = Message::from_octets(buf.into()).unwrap();
        let answer = reply(&query, false);
        let octets = answer.to_stream_octets().unwrap();
        sock.write_all(&octets).await.unwrap();
    }
}

fn conf(addr: SocketAddr) -> ResolvConf {
    let mut conf = ResolvConf::with_servers(vec![ServerConf::new(addr)]);
    conf.attempts = 1;
    conf
}

#[tokio::test]
async fn udp_lookup() {
    init_logging();
    let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = sock.local_addr().unwrap();
    tokio::spawn(serve_udp(sock, false));

    let mut channel = Channel::open(conf(addr)).unwrap();
    let handle =
        channel.submit("www.example.com", Some("http"), &Default::default());
    assert_eq!(channel.run_until_idle().await, 1);

    let completion = handle.await;
    assert_eq!(completion.status(), Status::Success);
    let info = completion.into_result().unwrap();
    let addrs: Vec<_> = info.addrs().collect();
    assert_eq!(addrs, [SocketAddr::from((ADDR, 80))]);
    assert_eq!(info.nodes()[0].ttl(), 3600);
    assert_eq!(channel.transport().open_transactions(), 0);
}

#[tokio::test]
async fn truncated_udp_falls_back_to_tcp() {
    init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let sock = UdpSocket::bind(addr).await.unwrap();
    tokio::spawn(serve_udp(sock, true));
    tokio::spawn(serve_tcp(listener));

    let mut channel = Channel::open(conf(addr)).unwrap();
    let handle = channel.submit(
        "www.example.com",
        None,
        &AddrInfoHints::with_family(Family::Ipv4),
    );
    channel.run_until_idle().await;

    let completion = handle.await;
    assert_eq!(completion.status(), Status::Success);
    assert_eq!(completion.timeouts(), 0);
    let addrs: Vec<_> = completion.result().unwrap().addrs().collect();
    assert_eq!(addrs, [SocketAddr::from((ADDR, 0))]);
}

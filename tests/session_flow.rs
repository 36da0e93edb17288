//! End-to-End Session Flow Test
//!
//! Menjalankan server asli di thread terpisah dan berbicara CPT lewat
//! TcpStream biasa. Frame di-encode manual untuk test independence.
//!
//! Usage:
//!   cargo test --test session_flow -- --nocapture

use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use cpt::network::{Client, Server, ServerConfig};
use cpt::protocol::{Command, ResponseCode};

const VERSION: u8 = 1;

const CMD_SEND: u8 = 1;
const CMD_GET_USERS: u8 = 3;
const CMD_CREATE_CHANNEL: u8 = 4;
const CMD_JOIN_CHANNEL: u8 = 5;
const CMD_LOGIN: u8 = 7;

const CODE_SUCCESS: u8 = 1;
const CODE_MESSAGE: u8 = 2;
const CODE_USER_CONNECTED: u8 = 3;
const CODE_USER_DISCONNECTED: u8 = 4;
const CODE_CHANNEL_CREATED: u8 = 6;
const CODE_USER_JOINED_CHANNEL: u8 = 9;
const CODE_USER_LIST: u8 = 11;
const CODE_UNKNOWN_CHANNEL: u8 = 14;
const CODE_BAD_VERSION: u8 = 15;
const CODE_SEND_FAILED: u8 = 16;
const CODE_SERVER_FULL: u8 = 23;

/// Encode request manual: version | command | channel_id | msg_len | msg
fn send_request(stream: &mut TcpStream, command: u8, channel_id: u16, payload: &[u8]) {
    let mut buf = Vec::with_capacity(6 + payload.len());
    buf.push(VERSION);
    buf.push(command);
    buf.extend_from_slice(&channel_id.to_be_bytes());
    buf.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    buf.extend_from_slice(payload);
    stream.write_all(&buf).unwrap();
}

/// Baca tepat satu response frame: code | channel_id | user_id | msg_len | msg
fn read_response(stream: &mut TcpStream) -> (u8, u16, u16, Vec<u8>) {
    let mut header = [0u8; 7];
    stream.read_exact(&mut header).unwrap();
    let code = header[0];
    let channel_id = u16::from_be_bytes([header[1], header[2]]);
    let user_id = u16::from_be_bytes([header[3], header[4]]);
    let msg_len = u16::from_be_bytes([header[5], header[6]]) as usize;
    let mut msg = vec![0u8; msg_len];
    stream.read_exact(&mut msg).unwrap();
    (code, channel_id, user_id, msg)
}

fn spawn_server(config: ServerConfig) -> (std::net::SocketAddr, thread::JoinHandle<std::io::Result<()>>) {
    let mut server = Server::bind("127.0.0.1:0".parse().unwrap(), config).unwrap();
    let addr = server.local_addr().unwrap();
    let handle = thread::spawn(move || server.run());
    (addr, handle)
}

fn connect(addr: std::net::SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    stream
}

#[test]
fn full_session_flow() {
    let (addr, handle) = spawn_server(ServerConfig {
        max_connections: 16,
        idle_timeout: Duration::from_millis(500),
    });

    // Alice login, dapat user id 1
    let mut alice = connect(addr);
    send_request(&mut alice, CMD_LOGIN, 0, b"Alice");
    assert_eq!(read_response(&mut alice), (CODE_SUCCESS, 0, 1, vec![]));

    // Bob login; Alice diberi tahu lewat global channel
    let mut bob = connect(addr);
    send_request(&mut bob, CMD_LOGIN, 0, b"Bob");
    assert_eq!(read_response(&mut bob), (CODE_SUCCESS, 0, 2, vec![]));
    assert_eq!(
        read_response(&mut alice),
        (CODE_USER_CONNECTED, 0, 2, b"Bob".to_vec())
    );

    // Alice buat channel dengan Bob di dalamnya
    send_request(&mut alice, CMD_CREATE_CHANNEL, 0, b"2");
    let (code, channel_id, user_id, msg) = read_response(&mut alice);
    assert_eq!((code, user_id, msg), (CODE_CHANNEL_CREATED, 1, vec![]));
    assert_eq!(
        read_response(&mut bob),
        (CODE_USER_JOINED_CHANNEL, channel_id, 2, b"Bob".to_vec())
    );

    // SEND fan-out: Bob terima MESSAGE dengan sender id, Alice terima ack
    send_request(&mut alice, CMD_SEND, channel_id, b"hi");
    assert_eq!(
        read_response(&mut alice),
        (CODE_SUCCESS, channel_id, 1, vec![])
    );
    assert_eq!(
        read_response(&mut bob),
        (CODE_MESSAGE, channel_id, 1, b"hi".to_vec())
    );

    // Roster sorted ascending by user id
    send_request(&mut bob, CMD_GET_USERS, channel_id, b"");
    assert_eq!(
        read_response(&mut bob),
        (CODE_USER_LIST, channel_id, 2, b"1 Alice\n2 Bob\n".to_vec())
    );

    // Join ke channel yang tidak ada: error, connection tetap hidup
    send_request(&mut alice, CMD_JOIN_CHANNEL, 999, b"");
    assert_eq!(
        read_response(&mut alice),
        (CODE_UNKNOWN_CHANNEL, 999, 1, vec![])
    );

    // Bob putus tanpa LOGOUT: implicit logout plus notifikasi
    drop(bob);
    assert_eq!(
        read_response(&mut alice),
        (CODE_USER_DISCONNECTED, 0, 2, b"Bob".to_vec())
    );

    // Channel tinggal Alice sendiri, SEND tidak punya penerima
    send_request(&mut alice, CMD_SEND, channel_id, b"anyone?");
    assert_eq!(
        read_response(&mut alice),
        (CODE_SEND_FAILED, channel_id, 1, vec![])
    );

    // Tanpa connection aktif, loop berhenti di idle timeout
    drop(alice);
    handle.join().unwrap().unwrap();
}

#[test]
fn server_full_rejects_connection() {
    let (addr, handle) = spawn_server(ServerConfig {
        max_connections: 1,
        idle_timeout: Duration::from_millis(500),
    });

    let mut first = connect(addr);
    send_request(&mut first, CMD_LOGIN, 0, b"Alice");
    assert_eq!(read_response(&mut first), (CODE_SUCCESS, 0, 1, vec![]));

    // Connection kedua ditolak dengan SERVER_FULL lalu ditutup
    let mut second = connect(addr);
    let (code, _, _, _) = read_response(&mut second);
    assert_eq!(code, CODE_SERVER_FULL);
    let mut probe = [0u8; 1];
    assert_eq!(second.read(&mut probe).unwrap(), 0);

    drop(first);
    drop(second);
    handle.join().unwrap().unwrap();
}

#[test]
fn bad_version_terminates_connection() {
    let (addr, handle) = spawn_server(ServerConfig {
        max_connections: 16,
        idle_timeout: Duration::from_millis(500),
    });

    let mut client = connect(addr);
    client.write_all(&[9, CMD_LOGIN, 0, 0, 0, 0]).unwrap();

    // Framing error: server kirim BAD_VERSION lalu tutup connection
    let (code, _, _, _) = read_response(&mut client);
    assert_eq!(code, CODE_BAD_VERSION);
    let mut probe = [0u8; 1];
    assert_eq!(client.read(&mut probe).unwrap(), 0);

    drop(client);
    handle.join().unwrap().unwrap();
}

#[test]
fn client_api_flow() {
    let (addr, handle) = spawn_server(ServerConfig {
        max_connections: 16,
        idle_timeout: Duration::from_millis(500),
    });

    let mut alice = Client::connect(addr).unwrap();
    alice
        .stream()
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    let reply = alice.login("Alice").unwrap();
    assert_eq!(reply.code, ResponseCode::Success);
    let alice_id = reply.user_id;

    let mut bob = Client::connect(addr).unwrap();
    bob.stream()
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    assert_eq!(bob.login("Bob").unwrap().code, ResponseCode::Success);
    assert_eq!(
        alice.next_response().unwrap().code,
        ResponseCode::UserConnected
    );

    alice.send_request(Command::CreateChannel, 0, b"2").unwrap();
    let created = alice.next_response().unwrap();
    assert_eq!(created.code, ResponseCode::ChannelCreated);
    assert_eq!(
        bob.next_response().unwrap().code,
        ResponseCode::UserJoinedChannel
    );

    // submit() plus event stream di sisi penerima
    alice.submit(created.channel_id, b"halo").unwrap();
    assert_eq!(alice.next_response().unwrap().code, ResponseCode::Success);
    let message = bob.next_response().unwrap();
    assert_eq!(message.code, ResponseCode::Message);
    assert_eq!(message.channel_id, created.channel_id);
    assert_eq!(message.user_id, alice_id);
    assert_eq!(message.msg, b"halo");

    drop(alice);
    drop(bob);
    handle.join().unwrap().unwrap();
}

#[test]
fn frame_split_across_writes() {
    let (addr, handle) = spawn_server(ServerConfig {
        max_connections: 16,
        idle_timeout: Duration::from_millis(500),
    });

    // Header dan payload dikirim terpisah; decoder menunggu frame utuh
    let mut client = connect(addr);
    client.write_all(&[VERSION, CMD_LOGIN, 0, 0, 0, 5]).unwrap();
    thread::sleep(Duration::from_millis(50));
    client.write_all(b"Al").unwrap();
    thread::sleep(Duration::from_millis(50));
    client.write_all(b"ice").unwrap();
    assert_eq!(read_response(&mut client), (CODE_SUCCESS, 0, 1, vec![]));

    drop(client);
    handle.join().unwrap().unwrap();
}

//! Client behaviour against an in-process fake server.

use loadgen_core::{
    ClientError, Command, ConnectionConfig, Connector, ErrorKind, KvClient, Reply, Subscription,
};
use resp_client::{read_value, RespConnector, Value};
use std::collections::HashMap;
use std::io::{BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

fn args_of(value: Value) -> Vec<String> {
    match value {
        Value::Array(Some(items)) => items
            .into_iter()
            .map(|v| match v {
                Value::Bulk(Some(b)) => String::from_utf8(b).unwrap(),
                other => panic!("unexpected argument {other:?}"),
            })
            .collect(),
        other => panic!("unexpected command frame {other:?}"),
    }
}

fn bulk(s: &str) -> String {
    format!("${}\r\n{}\r\n", s.len(), s)
}

/// Minimal single-connection server. `respond` maps a command to raw reply bytes.
fn serve_one<F>(respond: F) -> u16
where
    F: FnMut(&[String], &mut TcpStream) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut respond = respond;
    thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream);
        while let Ok(value) = read_value(&mut reader) {
            let args = args_of(value);
            respond(&args, &mut writer);
        }
    });
    port
}

fn kv_server() -> u16 {
    let mut store: HashMap<String, String> = HashMap::new();
    serve_one(move |args, out| {
        let reply = match args[0].to_ascii_uppercase().as_str() {
            "CLIENT" => "+OK\r\n".to_string(),
            "PING" => "+PONG\r\n".to_string(),
            "SET" => {
                store.insert(args[1].clone(), args[2].clone());
                "+OK\r\n".to_string()
            }
            "GET" => match store.get(&args[1]) {
                Some(v) => bulk(v),
                None => "$-1\r\n".to_string(),
            },
            "MULTI" => "+OK\r\n".to_string(),
            "INCR" => "+QUEUED\r\n".to_string(),
            "EXEC" => "*2\r\n:1\r\n:2\r\n".to_string(),
            other => format!("-ERR unknown command '{other}'\r\n"),
        };
        out.write_all(reply.as_bytes()).unwrap();
    })
}

fn config_for(port: u16) -> ConnectionConfig {
    ConnectionConfig::new("127.0.0.1", port)
        .with_timeouts(Duration::from_secs(2), Duration::from_millis(500))
}

#[test]
fn test_set_get_and_ping() {
    let port = kv_server();
    let connector = RespConnector::new(config_for(port)).unwrap();
    let mut client = connector.connect(0).unwrap();

    client.ping().unwrap();
    let reply = client
        .execute(&Command::new("SET").arg("k").arg("v1"))
        .unwrap();
    assert!(reply.is_status("OK"));
    let reply = client.execute(&Command::new("GET").arg("k")).unwrap();
    assert_eq!(reply, Reply::Bulk(b"v1".to_vec()));
    let reply = client.execute(&Command::new("GET").arg("missing")).unwrap();
    assert_eq!(reply, Reply::Nil);
    client.close();
}

#[test]
fn test_pipeline_isolates_rejected_command() {
    let port = kv_server();
    let connector = RespConnector::new(config_for(port)).unwrap();
    let mut client = connector.connect(0).unwrap();

    let results = client
        .pipeline(&[
            Command::new("SET").arg("a").arg("1"),
            Command::new("BOGUS").arg("a"),
            Command::new("GET").arg("a"),
        ])
        .unwrap();
    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    let err = results[1].as_ref().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Command);
    assert!(!err.is_transport());
    assert_eq!(results[2].as_ref().unwrap(), &Reply::Bulk(b"1".to_vec()));
}

#[test]
fn test_transaction_replies() {
    let port = kv_server();
    let connector = RespConnector::new(config_for(port)).unwrap();
    let mut client = connector.connect(0).unwrap();

    let replies = client
        .transaction(&[Command::new("INCR").arg("c"), Command::new("INCR").arg("c")])
        .unwrap();
    assert_eq!(replies, vec![Reply::Int(1), Reply::Int(2)]);
    // The stream is still in sync afterwards.
    client.ping().unwrap();
}

#[test]
fn test_transaction_queue_error_aborts() {
    let port = serve_one(|args, out| {
        let reply = match args[0].as_str() {
            "CLIENT" | "MULTI" => "+OK\r\n",
            "SET" => "+QUEUED\r\n",
            "EXEC" => "-EXECABORT Transaction discarded because of previous errors.\r\n",
            "PING" => "+PONG\r\n",
            _ => "-ERR unknown command\r\n",
        };
        out.write_all(reply.as_bytes()).unwrap();
    });
    let connector = RespConnector::new(config_for(port)).unwrap();
    let mut client = connector.connect(0).unwrap();

    let err = client
        .transaction(&[
            Command::new("SET").arg("a").arg("1"),
            Command::new("NOPE"),
        ])
        .unwrap_err();
    assert!(matches!(err, ClientError::TransactionAborted(ref m) if m.contains("unknown command")));
    assert_eq!(err.kind(), ErrorKind::Command);
    client.ping().unwrap();
}

#[test]
fn test_auth_failure_is_classified() {
    let port = serve_one(|_args, out| {
        out.write_all(b"-WRONGPASS invalid username-password pair or user is disabled.\r\n")
            .unwrap();
    });
    let config = config_for(port).with_auth(Some("app".into()), Some("wrong".into()));
    let connector = RespConnector::new(config).unwrap();
    let err = connector.connect(0).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Auth);
}

#[test]
fn test_connection_refused_is_connection_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let connector = RespConnector::new(config_for(port)).unwrap();
    let err = connector.connect(0).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(err.is_transport());
}

#[test]
fn test_silent_server_times_out() {
    let port = serve_one(|args, out| {
        if args[0] == "CLIENT" {
            out.write_all(b"+OK\r\n").unwrap();
        }
        // Everything else is swallowed.
    });
    let connector = RespConnector::new(config_for(port)).unwrap();
    let mut client = connector.connect(0).unwrap();
    let err = client.execute(&Command::new("GET").arg("k")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(err.is_transport());
}

#[test]
fn test_subscription_receives_message() {
    let port = serve_one(|args, out| {
        if args[0] == "SUBSCRIBE" {
            let mut reply = String::new();
            reply.push_str("*3\r\n");
            reply.push_str(&bulk("subscribe"));
            reply.push_str(&bulk(&args[1]));
            reply.push_str(":1\r\n");
            out.write_all(reply.as_bytes()).unwrap();

            let mut message = String::new();
            message.push_str("*3\r\n");
            message.push_str(&bulk("message"));
            message.push_str(&bulk(&args[1]));
            message.push_str(&bulk("hello"));
            out.write_all(message.as_bytes()).unwrap();
        }
    });
    let connector = RespConnector::new(config_for(port)).unwrap();
    let mut subscription = connector.subscribe(&["news".to_string()]).unwrap();

    let mut received = None;
    for _ in 0..10 {
        if let Some(message) = subscription.next_message(Duration::from_millis(200)).unwrap() {
            received = Some(message);
            break;
        }
    }
    let message = received.expect("message should arrive");
    assert_eq!(message.channel, "news");
    assert_eq!(message.payload, b"hello".to_vec());

    // Nothing more is sent, so the next poll times out quietly.
    assert!(subscription
        .next_message(Duration::from_millis(100))
        .unwrap()
        .is_none());
    subscription.close();
}

#[test]
fn test_subscription_survives_frame_split_across_polls() {
    let port = serve_one(|args, out| {
        if args[0] == "SUBSCRIBE" {
            out.set_nodelay(true).unwrap();
            let mut reply = String::from("*3\r\n");
            reply.push_str(&bulk("subscribe"));
            reply.push_str(&bulk(&args[1]));
            reply.push_str(":1\r\n");
            out.write_all(reply.as_bytes()).unwrap();

            let mut message = String::from("*3\r\n");
            message.push_str(&bulk("message"));
            message.push_str(&bulk(&args[1]));
            message.push_str(&bulk("payload"));
            let (head, tail) = message.split_at(message.len() - 6);
            thread::sleep(Duration::from_millis(100));
            out.write_all(head.as_bytes()).unwrap();
            thread::sleep(Duration::from_millis(150));
            out.write_all(tail.as_bytes()).unwrap();
        }
    });
    let connector = RespConnector::new(config_for(port)).unwrap();
    let mut subscription = connector.subscribe(&["news".to_string()]).unwrap();

    // Polls shorter than the gap inside the frame must neither fail nor lose bytes.
    let mut received = None;
    for _ in 0..40 {
        if let Some(message) = subscription.next_message(Duration::from_millis(20)).unwrap() {
            received = Some(message);
            break;
        }
    }
    let message = received.expect("split message should arrive whole");
    assert_eq!(message.channel, "news");
    assert_eq!(message.payload, b"payload".to_vec());
    subscription.close();
}

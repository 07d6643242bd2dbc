//! Shared fixtures and service bootstrap for integration tests.

#![allow(dead_code)]

use slim::Value;
use slim::runtime::error::FixtureError;
use slim::runtime::fixture::{FixtureClass, arg, arg_str, void};
use slim::runtime::interaction::DefaultInteraction;
use slim::runtime::registry::FixtureRegistry;
use slim::runtime::service::{ListenerHandle, Service, SlimListener};
use slim::runtime::service_client::{ClientOptions, RetryPolicy, SlimClient};
use std::io::BufReader;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub const IMPORT: &str = "slim.test";
pub const NORMAL_EXCEPTION: &str = "message:<<FIXTURE_EXCEPTION: This is my exception";
pub const STOP_TEST_EXCEPTION: &str = "message:<<STOP_TEST: This is a stop test exception";

#[derive(Default)]
pub struct TestSlim {
    constructor_arg: Option<String>,
    remembered: String,
}

pub fn test_slim_class() -> FixtureClass<TestSlim> {
    FixtureClass::new(format!("{IMPORT}.TestSlim"))
        .default_constructor()
        .constructor(1, |args| {
            Ok(TestSlim {
                constructor_arg: Some(arg_str(args, 0)?.to_owned()),
                ..TestSlim::default()
            })
        })
        .method("echoInt", 1, |_, args| {
            Ok(Value::str(arg::<i64>(args, 0)?.to_string()))
        })
        .method("echoString", 1, |_, args| Ok(Value::str(arg_str(args, 0)?)))
        .method("constructorArg", 0, |slim, _| {
            Ok(Value::str(slim.constructor_arg.clone().unwrap_or_default()))
        })
        .method("remember", 1, |slim, args| {
            slim.remembered = arg_str(args, 0)?.to_owned();
            Ok(void())
        })
        .method("recall", 0, |slim, _| Ok(Value::str(slim.remembered.clone())))
        .method("throwNormal", 0, |_, _| {
            Err(FixtureError::new("This is my exception"))
        })
        .method("throwIndented", 0, |_, _| {
            Err(FixtureError::new("  indented\nline"))
        })
        .method("throwStopping", 0, |_, _| {
            Err(FixtureError::stop_test("This is a stop test exception"))
        })
}

pub fn registry() -> Arc<FixtureRegistry> {
    let mut registry = FixtureRegistry::new();
    registry.register_class(test_slim_class());
    Arc::new(registry)
}

/// Start a service on an ephemeral port.
pub fn start_service() -> ListenerHandle {
    let service = Service::new(registry(), Arc::new(DefaultInteraction));
    SlimListener::bind("127.0.0.1:0", service)
        .expect("bind")
        .spawn()
        .expect("spawn listener")
}

/// Poll-connect to a service that may still be starting.
pub fn connect(handle: &ListenerHandle) -> SlimClient {
    let options = ClientOptions {
        read_timeout: Some(Duration::from_secs(10)),
        ..ClientOptions::default()
    };
    let policy = RetryPolicy {
        interval: Duration::from_millis(10),
        max_attempts: Some(200),
    };
    SlimClient::connect_with_retry("127.0.0.1", handle.addr().port(), &options, &policy)
        .expect("connect")
}

/// Accept one connection on an ephemeral port and hand it to `script`
/// without any session handling. Returns the port.
pub fn scripted_peer<F>(script: F) -> u16
where
    F: FnOnce(BufReader<TcpStream>, TcpStream) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let reader = BufReader::new(stream.try_clone().expect("clone"));
        script(reader, stream);
    });
    port
}

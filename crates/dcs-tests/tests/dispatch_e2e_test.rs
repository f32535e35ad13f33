//! End-to-end command dispatch against a loaded configuration tree
//!
//! Socket scenarios talk to a loopback `CommandListener`; SMS scenarios use
//! the mock gateway and a mock transport that must stay untouched.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dcs_config::LoaderOptions;
use dcs_core::{
    Account, Device, DeviceStore, MemoryDeviceStore, ResultCode, RuntimeProperties,
    ServerRegistry,
};
use dcs_dispatch::sms::mock::MockSmsGateway;
use dcs_dispatch::transport::mock::MockCommandTransport;
use dcs_dispatch::{
    create_transport, CommandDispatcher, CommandTransport, DispatcherSettings, SmsGateway,
    SmsGatewayRegistry, TransportConfig, DEFAULT_GATEWAY_NAME,
};
use dcs_tests::{closed_port, load_registry, run_concurrently, CommandListener, Fixture};
use pretty_assertions::assert_eq;

const DCSERVERS: &str = r#"
[[dcservers.server]]
name = "acme"
command_protocol = "tcp"
unique_id_prefixes = ["imei:"]

[dcservers.server.commands]
host = "127.0.0.1"
port = @PORT@

[[dcservers.server.commands.command]]
name = "output"
protocol = "tcp"
template = "OUT,${arg0}"

[[dcservers.server.commands.command]]
name = "locate"
protocol = "sms"
template = "LOC ${arg0=1}"
"#;

const DEVICES: &str = r#"
[[account]]
account_id = "demo"

[[device]]
account_id = "demo"
device_id = "t1"
unique_id = "imei:3520"
server_id = "acme"
sim_phone = "+15550100"
"#;

struct Harness {
    _fixture: Fixture,
    runtime: RuntimeProperties,
    registry: Arc<ServerRegistry>,
    store: Arc<MemoryDeviceStore>,
}

impl Harness {
    fn new(command_port: u16, devices: &str) -> Self {
        let fixture = Fixture::new().unwrap();
        let path = fixture
            .write(
                "dcservers.toml",
                &DCSERVERS.replace("@PORT@", &command_port.to_string()),
            )
            .unwrap();
        fixture.write("devices.toml", devices).unwrap();

        let runtime = RuntimeProperties::new();
        let (registry, report) =
            load_registry(&path, runtime.clone(), LoaderOptions::default()).unwrap();
        assert!(report.errors.is_empty(), "{:?}", report.errors);
        let store = fixture.store("devices.toml").unwrap();

        Self {
            _fixture: fixture,
            runtime,
            registry,
            store,
        }
    }

    fn dispatcher(
        &self,
        transport: Arc<dyn CommandTransport>,
        gateways: SmsGatewayRegistry,
    ) -> CommandDispatcher {
        let settings = DispatcherSettings {
            connect_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_secs(2),
            ..Default::default()
        };
        CommandDispatcher::new(
            Arc::clone(&self.registry),
            self.store.clone(),
            transport,
            Arc::new(gateways),
        )
        .with_settings(settings)
    }

    fn tcp_dispatcher(&self) -> CommandDispatcher {
        let transport = create_transport(&TransportConfig::Tcp).unwrap();
        self.dispatcher(transport, SmsGatewayRegistry::new())
    }

    fn tcp_dispatcher_with(&self, settings: DispatcherSettings) -> CommandDispatcher {
        let transport = create_transport(&TransportConfig::Tcp).unwrap();
        CommandDispatcher::new(
            Arc::clone(&self.registry),
            self.store.clone(),
            transport,
            Arc::new(SmsGatewayRegistry::new()),
        )
        .with_settings(settings)
    }

    async fn device(&self) -> Device {
        self.store.load_device("demo", "t1").await.unwrap().unwrap()
    }
}

fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[tokio::test]
async fn test_live_listener_success_increments_ping() {
    let listener = CommandListener::start("result=OK000").await.unwrap();
    let harness = Harness::new(listener.port(), DEVICES);
    let dispatcher = harness.tcp_dispatcher();

    let device = harness.device().await;
    let result = dispatcher
        .send_server_command(Some(&device), "config", "output", &args(&["on"]))
        .await;

    assert_eq!(result.code, ResultCode::Success);
    assert_eq!(harness.device().await.total_ping_count, 1);
    assert_eq!(
        listener.requests(),
        vec!["account=demo device=t1 unique=imei:3520 cmdtype=config cmdname=output arg0=on"
            .to_string()]
    );
}

#[tokio::test]
async fn test_server_reported_failure_keeps_ping() {
    let listener = CommandListener::start("result=CM001 message=\"no such command\"")
        .await
        .unwrap();
    let harness = Harness::new(listener.port(), DEVICES);
    let dispatcher = harness.tcp_dispatcher();

    let device = harness.device().await;
    let result = dispatcher
        .send_server_command(Some(&device), "config", "bogus", &[])
        .await;

    assert_eq!(result.code, ResultCode::InvalidCommand);
    assert_eq!(result.message, "no such command");
    assert_eq!(harness.device().await.total_ping_count, 0);
}

#[tokio::test]
async fn test_no_listener_is_transmit_fail() {
    let port = closed_port().unwrap();
    let harness = Harness::new(port, DEVICES);
    let dispatcher = harness.tcp_dispatcher();

    let device = harness.device().await;
    let result = dispatcher
        .send_server_command(Some(&device), "config", "output", &args(&["on"]))
        .await;

    assert_eq!(result.code, ResultCode::TransmitFail);
    assert!(result.message.starts_with("[acme]"), "{}", result.message);
    assert_eq!(harness.device().await.total_ping_count, 0);
}

#[tokio::test]
async fn test_unanswered_request_times_out() {
    let listener = CommandListener::silent().await.unwrap();
    let harness = Harness::new(listener.port(), DEVICES);
    let dispatcher = harness.tcp_dispatcher_with(DispatcherSettings {
        connect_timeout: Duration::from_secs(2),
        read_timeout: Duration::from_millis(300),
        ..Default::default()
    });

    let device = harness.device().await;
    let started = Instant::now();
    let result = dispatcher
        .send_server_command(Some(&device), "config", "output", &args(&["on"]))
        .await;
    let elapsed = started.elapsed();

    assert_eq!(result.code, ResultCode::TransmitFail);
    assert!(elapsed >= Duration::from_millis(250), "{:?}", elapsed);
    assert!(elapsed < Duration::from_secs(2), "{:?}", elapsed);
    assert_eq!(listener.requests().len(), 1);
    assert_eq!(harness.device().await.total_ping_count, 0);
}

#[tokio::test]
async fn test_sms_fallback_skips_socket_transport() {
    let harness = Harness::new(30400, DEVICES);
    // Deployment-time override disables the command port
    harness.runtime.set("DCServer.acme.commandPort", "0");

    let transport = Arc::new(MockCommandTransport::default());
    let gateway = Arc::new(MockSmsGateway::new());
    let gateways = SmsGatewayRegistry::new();
    gateways.register(DEFAULT_GATEWAY_NAME, gateway.clone() as Arc<dyn SmsGateway>);
    let dispatcher = harness.dispatcher(transport.clone(), gateways);

    let device = harness.device().await;
    let result = dispatcher
        .send_server_command(Some(&device), "locate", "locate", &[])
        .await;

    assert_eq!(result.code, ResultCode::Success);
    assert_eq!(transport.call_count(), 0);
    assert_eq!(
        gateway.sent(),
        vec![("demo/t1".to_string(), "LOC 1".to_string())]
    );
    assert_eq!(harness.device().await.total_ping_count, 1);

    // A socket-only command has no SMS form
    let result = dispatcher
        .send_server_command(Some(&device), "config", "output", &args(&["on"]))
        .await;
    assert_eq!(result.code, ResultCode::NotSupported);
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_over_limit_skips_transport_and_increment() {
    let devices = DEVICES.replace(
        "sim_phone = \"+15550100\"",
        "sim_phone = \"+15550100\"\nmax_ping_count = 2\ntotal_ping_count = 2",
    );
    let harness = Harness::new(30400, &devices);
    let transport = Arc::new(MockCommandTransport::default());
    let dispatcher = harness.dispatcher(transport.clone(), SmsGatewayRegistry::new());

    let device = harness.device().await;
    let result = dispatcher
        .send_server_command(Some(&device), "config", "output", &args(&["on"]))
        .await;

    assert_eq!(result.code, ResultCode::OverLimit);
    assert_eq!(transport.call_count(), 0);
    assert_eq!(harness.device().await.total_ping_count, 2);
}

#[tokio::test]
async fn test_account_limit_applies_to_device() {
    let harness = Harness::new(30400, DEVICES);
    let mut account = Account::new("demo");
    account.max_ping_count = 1;
    account.total_ping_count = 1;
    harness.store.insert_account(account);

    let transport = Arc::new(MockCommandTransport::default());
    let dispatcher = harness.dispatcher(transport.clone(), SmsGatewayRegistry::new());

    let device = harness.device().await;
    let result = dispatcher
        .send_server_command(Some(&device), "config", "output", &args(&["on"]))
        .await;
    assert_eq!(result.code, ResultCode::OverLimit);
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sends_respect_ping_limit() {
    let listener = CommandListener::start("result=OK000").await.unwrap();
    let devices = DEVICES.replace(
        "sim_phone = \"+15550100\"",
        "sim_phone = \"+15550100\"\nmax_ping_count = 3",
    );
    let harness = Harness::new(listener.port(), &devices);
    let dispatcher = harness.tcp_dispatcher();
    let device = harness.device().await;

    let on = args(&["on"]);
    let results = run_concurrently(
        (0..8).map(|_| dispatcher.send_server_command(Some(&device), "config", "output", &on)),
    )
    .await;

    let successes = results.iter().filter(|r| r.is_success()).count();
    let over_limit = results
        .iter()
        .filter(|r| r.code == ResultCode::OverLimit)
        .count();
    assert_eq!((successes, over_limit), (3, 5));
    assert_eq!(harness.device().await.total_ping_count, 3);
    assert_eq!(listener.requests().len(), 3);
}

#[tokio::test]
async fn test_operator_send_skips_limit() {
    let listener = CommandListener::start("result=OK000").await.unwrap();
    let devices = DEVICES.replace(
        "sim_phone = \"+15550100\"",
        "sim_phone = \"+15550100\"\nmax_ping_count = 1\ntotal_ping_count = 1",
    );
    let harness = Harness::new(listener.port(), &devices);
    let dispatcher = harness.tcp_dispatcher();

    let device = harness.device().await;
    let result = dispatcher
        .send_to_server("acme", Some(&device), "config", "output", &args(&["off"]))
        .await;

    assert!(result.is_success(), "{}", result);
    assert_eq!(harness.device().await.total_ping_count, 1);
    assert_eq!(listener.requests().len(), 1);
}

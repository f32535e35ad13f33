//! Command dispatcher
//!
//! Routes an operator command for a device to the communication server
//! that owns it: over the server's command port when one is configured,
//! otherwise as SMS text through a gateway.
//!
//! Every outcome is a [`CommandResult`]; nothing here returns an error or
//! panics on bad input. The ping-limit check, the send and the ping-count
//! increment for one device run under that device's lock, so concurrent
//! calls cannot overshoot the limit.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dcs_core::properties::{encode_line, parse_line};
use dcs_core::{CommandResult, Device, DeviceStore, ResultCode, ServerRegistry};
use tracing::{debug, error, info, warn};

use crate::locks::DeviceLocks;
use crate::sms::{SmsGatewayRegistry, DEFAULT_GATEWAY_NAME};
use crate::transport::{CommandTransport, IoTimeouts};

/// Request keys understood by a server's command port
pub const CMDARG_ACCOUNT: &str = "account";
pub const CMDARG_DEVICE: &str = "device";
pub const CMDARG_UNIQUE: &str = "unique";
pub const CMDARG_CMDTYPE: &str = "cmdtype";
pub const CMDARG_CMDNAME: &str = "cmdname";
/// Positional arguments are `arg0`, `arg1`, ...
pub const CMDARG_ARG: &str = "arg";

/// Dispatcher tuning
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub connect_timeout: Duration,
    /// Bounds the request write and the response read
    pub read_timeout: Duration,
    /// Gateway used by SMS commands that name no handler
    pub default_gateway: String,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
            default_gateway: DEFAULT_GATEWAY_NAME.to_string(),
        }
    }
}

impl DispatcherSettings {
    fn io_timeouts(&self) -> IoTimeouts {
        IoTimeouts {
            connect: self.connect_timeout,
            io: self.read_timeout,
        }
    }
}

/// Build the command-port request line for a device, without the newline
pub fn command_request(device: &Device, cmd_type: &str, cmd_name: &str, args: &[String]) -> String {
    let mut pairs: Vec<(String, &str)> = vec![
        (CMDARG_ACCOUNT.to_string(), device.account_id.as_str()),
        (CMDARG_DEVICE.to_string(), device.device_id.as_str()),
        (CMDARG_UNIQUE.to_string(), device.unique_id.as_str()),
        (CMDARG_CMDTYPE.to_string(), cmd_type),
        (CMDARG_CMDNAME.to_string(), cmd_name),
    ];
    for (i, arg) in args.iter().enumerate() {
        pairs.push((format!("{}{}", CMDARG_ARG, i), arg.as_str()));
    }
    encode_line(pairs)
}

pub struct CommandDispatcher {
    registry: Arc<ServerRegistry>,
    store: Arc<dyn DeviceStore>,
    transport: Arc<dyn CommandTransport>,
    gateways: Arc<SmsGatewayRegistry>,
    settings: DispatcherSettings,
    locks: DeviceLocks,
}

impl CommandDispatcher {
    pub fn new(
        registry: Arc<ServerRegistry>,
        store: Arc<dyn DeviceStore>,
        transport: Arc<dyn CommandTransport>,
        gateways: Arc<SmsGatewayRegistry>,
    ) -> Self {
        Self {
            registry,
            store,
            transport,
            gateways,
            settings: DispatcherSettings::default(),
            locks: DeviceLocks::new(),
        }
    }

    pub fn with_settings(mut self, settings: DispatcherSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &DispatcherSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn DeviceStore> {
        &self.store
    }

    // =========================================================================
    // Public entry points
    // =========================================================================

    /// Send a command to the server that owns `device`.
    ///
    /// The device is reloaded from the store before the ping-limit check.
    /// On success its ping count is incremented.
    pub async fn send_server_command(
        &self,
        device: Option<&Device>,
        cmd_type: &str,
        cmd_name: &str,
        args: &[String],
    ) -> CommandResult {
        let Some(device) = device else {
            warn!("Device is missing");
            return CommandResult::new(ResultCode::InvalidDevice);
        };

        let _guard = self.locks.acquire(&device.key()).await;

        let device = match self.gate(device).await {
            Ok(device) => device,
            Err(result) => return result,
        };

        let server = device.server_id.trim();
        if server.is_empty() {
            warn!(device = %device.key(), "Device has no server assigned");
            return CommandResult::new(ResultCode::InvalidServer);
        }

        let result = self
            .dispatch(server, &device, cmd_type, cmd_name, args)
            .await;
        self.record_ping(&device, &result).await;
        result
    }

    /// Send a command through an explicitly named server.
    ///
    /// Operator path: no ping-limit check and no ping-count increment.
    pub async fn send_to_server(
        &self,
        server: &str,
        device: Option<&Device>,
        cmd_type: &str,
        cmd_name: &str,
        args: &[String],
    ) -> CommandResult {
        let Some(device) = device else {
            warn!("Device is missing");
            return CommandResult::new(ResultCode::InvalidDevice);
        };
        let _guard = self.locks.acquire(&device.key()).await;
        self.dispatch(server.trim(), device, cmd_type, cmd_name, args)
            .await
    }

    /// Send raw SMS text to a device through `handler` (blank means the
    /// default gateway), with the ping-limit check and increment.
    pub async fn send_sms_command(
        &self,
        handler: Option<&str>,
        device: Option<&Device>,
        text: &str,
    ) -> CommandResult {
        let Some(device) = device else {
            warn!("Device is missing");
            return CommandResult::new(ResultCode::InvalidDevice);
        };

        let _guard = self.locks.acquire(&device.key()).await;

        let device = match self.gate(device).await {
            Ok(device) => device,
            Err(result) => return result,
        };

        let result = self.send_sms(handler, &device, text).await;
        self.record_ping(&device, &result).await;
        result
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Reload the device and enforce its ping limit
    async fn gate(&self, device: &Device) -> Result<Device, CommandResult> {
        let fresh = match self
            .store
            .load_device(&device.account_id, &device.device_id)
            .await
        {
            Ok(Some(fresh)) => fresh,
            Ok(None) => {
                warn!(device = %device.key(), "Device not found in store");
                return Err(CommandResult::new(ResultCode::InvalidDevice));
            }
            Err(e) => {
                error!(device = %device.key(), error = %e, "Device reload failed");
                return Err(CommandResult::with_message(e.result_code(), e.to_string()));
            }
        };

        match self.store.exceeds_max_ping_count(&fresh).await {
            Ok(false) => Ok(fresh),
            Ok(true) => {
                warn!(device = %fresh.key(), "Account/Device exceeded maximum allowed pings");
                Err(CommandResult::new(ResultCode::OverLimit))
            }
            Err(e) => {
                error!(device = %fresh.key(), error = %e, "Ping limit check failed");
                Err(CommandResult::with_message(e.result_code(), e.to_string()))
            }
        }
    }

    async fn record_ping(&self, device: &Device, result: &CommandResult) {
        if !result.is_success() {
            info!(device = %device.key(), result = %result, "Command not accepted");
            return;
        }
        debug!(device = %device.key(), "Incrementing ping count");
        if let Err(e) = self
            .store
            .increment_ping_count(&device.account_id, &device.device_id, Utc::now())
            .await
        {
            warn!(device = %device.key(), error = %e, "Ping count increment failed");
        }
    }

    async fn dispatch(
        &self,
        server: &str,
        device: &Device,
        cmd_type: &str,
        cmd_name: &str,
        args: &[String],
    ) -> CommandResult {
        let Some(dcs) = self.registry.get(server) else {
            error!(server = %server, "Server not found");
            return CommandResult::new(ResultCode::InvalidServer);
        };

        let command = dcs.command(cmd_name);
        if let Some(cmd) = command {
            if let Err(e) = cmd.check_args(args) {
                warn!(server = %server, command = %cmd_name, "{}", e);
                return CommandResult::with_message(ResultCode::InvalidArg, e.to_string());
            }
        }

        let port = dcs.command_dispatch_port();
        if port <= 0 {
            let Some(cmd) = command else {
                error!(server = %server, command = %cmd_name, "Command not supported");
                return CommandResult::new(ResultCode::InvalidCommand);
            };
            if !cmd.uses_sms() {
                error!(server = %server, command = %cmd_name, "Command port not supported");
                return CommandResult::new(ResultCode::NotSupported);
            }
            let text = cmd.expand(args);
            return self.send_sms(cmd.sms_handler.as_deref(), device, &text).await;
        }

        let Ok(port) = u16::try_from(port) else {
            error!(server = %server, port, "Command port out of range");
            return CommandResult::with_message(
                ResultCode::TransmitFail,
                format!("Command port out of range: {}", port),
            );
        };
        let host = dcs.command_dispatch_host();
        let request = command_request(device, cmd_type, cmd_name, args);
        info!(
            server = %server,
            transport = self.transport.name(),
            "Sending command to '{}:{}' ==> {}",
            host,
            port,
            request
        );

        let line = format!("{}\n", request);
        match self
            .transport
            .send_line(&host, port, &line, self.settings.io_timeouts())
            .await
        {
            Ok(reply) => {
                info!(server = %server, "Command response: {}", reply);
                CommandResult::from_response(parse_line(&reply))
            }
            Err(e) => {
                error!(server = %server, error = %e, "Unable to reach command port");
                CommandResult::with_message(e.result_code(), format!("[{}] {}", server, e))
            }
        }
    }

    async fn send_sms(&self, handler: Option<&str>, device: &Device, text: &str) -> CommandResult {
        let (name, gateway) = self
            .gateways
            .resolve(handler, &self.settings.default_gateway);
        let Some(gateway) = gateway else {
            error!(gateway = %name, "SMS gateway handler not found");
            return CommandResult::with_message(
                ResultCode::InvalidProto,
                format!("SMS gateway not found: {}", name),
            );
        };

        debug!(device = %device.key(), gateway = %name, "SMS command: {}", text);
        match gateway.send(device, text).await {
            Ok(()) => CommandResult::new(ResultCode::Success),
            Err(e) => {
                warn!(device = %device.key(), gateway = %name, error = %e, "SMS send failed");
                CommandResult::with_message(e.result_code(), e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sms::mock::MockSmsGateway;
    use crate::sms::SmsError;
    use crate::transport::mock::MockCommandTransport;
    use crate::transport::TransportError;
    use dcs_core::{
        Account, CommandArg, CommandDefinition, CommandProtocol, MemoryDeviceStore,
        RuntimeProperties, ServerDescriptor,
    };
    use pretty_assertions::assert_eq;

    struct Fixture {
        dispatcher: Arc<CommandDispatcher>,
        store: Arc<MemoryDeviceStore>,
        transport: Arc<MockCommandTransport>,
        sms: Arc<MockSmsGateway>,
        runtime: RuntimeProperties,
    }

    fn socket_server(runtime: &RuntimeProperties) -> ServerDescriptor {
        let mut dcs = ServerDescriptor::new("acme", runtime.clone());
        dcs.set_command_dispatch(Some("127.0.0.1"), 30400);
        let mut output = CommandDefinition::new("output", "OUT,${arg0}");
        output.protocol = CommandProtocol::Tcp;
        output.args = vec![CommandArg::new("state").with_length("3")];
        dcs.add_command(output);
        dcs
    }

    fn sms_server(runtime: &RuntimeProperties) -> ServerDescriptor {
        let mut dcs = ServerDescriptor::new("textonly", runtime.clone());
        let mut locate = CommandDefinition::new("locate", "LOC,${arg0=now}");
        locate.protocol = CommandProtocol::Sms;
        dcs.add_command(locate);
        let mut routed = CommandDefinition::new("routed", "RT");
        routed.protocol = CommandProtocol::Sms;
        routed.sms_handler = Some("twilio".into());
        dcs.add_command(routed);
        dcs.add_command(CommandDefinition::new("udponly", "U"));
        dcs
    }

    fn device(server: &str, max_pings: u32, pings: u32) -> Device {
        let mut d = Device::new("demo", "t1");
        d.unique_id = "imei:3520".into();
        d.server_id = server.into();
        d.sim_phone = Some("5551234".into());
        d.max_ping_count = max_pings;
        d.total_ping_count = pings;
        d
    }

    fn fixture(device: Device) -> Fixture {
        let runtime = RuntimeProperties::new();
        let registry = ServerRegistry::default();
        registry.mark_initialized();
        registry.register(socket_server(&runtime));
        registry.register(sms_server(&runtime));

        let store = Arc::new(MemoryDeviceStore::new());
        store.insert_account(Account::new("demo"));
        store.insert_device(device);

        let transport = Arc::new(MockCommandTransport::default());
        let sms = Arc::new(MockSmsGateway::new());
        let gateways = Arc::new(SmsGatewayRegistry::new());
        gateways.register(DEFAULT_GATEWAY_NAME, sms.clone());

        let dispatcher = Arc::new(CommandDispatcher::new(
            Arc::new(registry),
            store.clone(),
            transport.clone(),
            gateways,
        ));
        Fixture {
            dispatcher,
            store,
            transport,
            sms,
            runtime,
        }
    }

    async fn pings(store: &MemoryDeviceStore) -> u32 {
        store
            .load_device("demo", "t1")
            .await
            .unwrap()
            .unwrap()
            .total_ping_count
    }

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_missing_device() {
        let fx = fixture(device("acme", 0, 0));
        let result = fx
            .dispatcher
            .send_server_command(None, "config", "output", &[])
            .await;
        assert_eq!(result.code, ResultCode::InvalidDevice);
    }

    #[tokio::test]
    async fn test_socket_success_increments() {
        let d = device("acme", 0, 0);
        let fx = fixture(d.clone());
        let result = fx
            .dispatcher
            .send_server_command(Some(&d), "config", "output", &args(&["on"]))
            .await;

        assert_eq!(result.code, ResultCode::Success);
        assert_eq!(pings(&fx.store).await, 1);
        let sent = fx.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!((sent[0].host.as_str(), sent[0].port), ("127.0.0.1", 30400));
        assert_eq!(
            sent[0].request,
            "account=demo device=t1 unique=imei:3520 cmdtype=config cmdname=output arg0=on\n"
        );
    }

    #[test]
    fn test_request_line_escapes_line_breaks() {
        let d = device("acme", 0, 0);
        let request = command_request(
            &d,
            "config",
            "output",
            &args(&["on\naccount=victim device=other cmdtype=config cmdname=reboot"]),
        );
        assert_eq!(request.lines().count(), 1);

        let parsed = parse_line(&request);
        assert_eq!(parsed["account"], "demo");
        assert_eq!(parsed["device"], "t1");
        assert_eq!(parsed["cmdname"], "output");
        assert_eq!(
            parsed["arg0"],
            "on\naccount=victim device=other cmdtype=config cmdname=reboot"
        );
    }

    #[tokio::test]
    async fn test_multiline_argument_sent_as_one_line() {
        let d = device("acme", 0, 0);
        let fx = fixture(d.clone());
        let result = fx
            .dispatcher
            .send_server_command(Some(&d), "config", "raw", &args(&["a\r\nb"]))
            .await;

        assert!(result.is_success());
        let sent = fx.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].request.matches('\n').count(), 1);
        assert!(sent[0].request.ends_with('\n'));
    }

    #[tokio::test]
    async fn test_runtime_command_port_override() {
        let d = device("acme", 0, 0);
        let fx = fixture(d.clone());
        fx.runtime.set("DCServer.acme.commandPort", "31000");
        fx.dispatcher
            .send_server_command(Some(&d), "config", "output", &[])
            .await;
        assert_eq!(fx.transport.sent()[0].port, 31000);
    }

    #[tokio::test]
    async fn test_transport_failure_no_increment() {
        let d = device("acme", 0, 0);
        let fx = fixture(d.clone());
        fx.transport
            .set_failure(TransportError::ConnectionFailed("refused".into()));
        let result = fx
            .dispatcher
            .send_server_command(Some(&d), "config", "output", &[])
            .await;
        assert_eq!(result.code, ResultCode::TransmitFail);
        assert!(result.message.contains("acme"));
        assert_eq!(pings(&fx.store).await, 0);
    }

    #[tokio::test]
    async fn test_server_reported_failure() {
        let d = device("acme", 0, 0);
        let fx = fixture(d.clone());
        fx.transport.set_response("result=CM001");
        let result = fx
            .dispatcher
            .send_server_command(Some(&d), "config", "output", &[])
            .await;
        assert_eq!(result.code, ResultCode::InvalidCommand);
        assert_eq!(pings(&fx.store).await, 0);

        fx.transport.set_response("result=ZZ999");
        let result = fx
            .dispatcher
            .send_server_command(Some(&d), "config", "output", &[])
            .await;
        assert_eq!(result.code, ResultCode::InternalError);
        assert!(result.message.contains("ZZ999"));
    }

    #[tokio::test]
    async fn test_over_limit_touches_nothing() {
        let d = device("acme", 1, 1);
        let fx = fixture(d.clone());
        let result = fx
            .dispatcher
            .send_server_command(Some(&d), "config", "output", &[])
            .await;
        assert_eq!(result.code, ResultCode::OverLimit);
        assert_eq!(fx.transport.call_count(), 0);
        assert!(fx.sms.sent().is_empty());
        assert_eq!(pings(&fx.store).await, 1);
    }

    #[tokio::test]
    async fn test_account_limit_applies() {
        let d = device("acme", 0, 0);
        let fx = fixture(d.clone());
        let mut account = Account::new("demo");
        account.max_ping_count = 2;
        account.total_ping_count = 2;
        fx.store.insert_account(account);
        let result = fx
            .dispatcher
            .send_server_command(Some(&d), "config", "output", &[])
            .await;
        assert_eq!(result.code, ResultCode::OverLimit);
    }

    #[tokio::test]
    async fn test_stale_device_is_reloaded() {
        // Caller's copy is under the limit, the stored record is not
        let stale = device("acme", 1, 0);
        let fx = fixture(device("acme", 1, 1));
        let result = fx
            .dispatcher
            .send_server_command(Some(&stale), "config", "output", &[])
            .await;
        assert_eq!(result.code, ResultCode::OverLimit);
    }

    #[tokio::test]
    async fn test_invalid_server() {
        let d = device("", 0, 0);
        let fx = fixture(d.clone());
        let result = fx
            .dispatcher
            .send_server_command(Some(&d), "config", "output", &[])
            .await;
        assert_eq!(result.code, ResultCode::InvalidServer);

        let d = device("nosuch", 0, 0);
        let fx = fixture(d.clone());
        let result = fx
            .dispatcher
            .send_server_command(Some(&d), "config", "output", &[])
            .await;
        assert_eq!(result.code, ResultCode::InvalidServer);
        assert_eq!(fx.transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_argument_too_long_rejected() {
        let d = device("acme", 0, 0);
        let fx = fixture(d.clone());
        let result = fx
            .dispatcher
            .send_server_command(Some(&d), "config", "output", &args(&["toolong"]))
            .await;
        assert_eq!(result.code, ResultCode::InvalidArg);
        assert_eq!(fx.transport.call_count(), 0);
        assert_eq!(pings(&fx.store).await, 0);
    }

    #[tokio::test]
    async fn test_sms_fallback_skips_socket() {
        let d = device("textonly", 0, 0);
        let fx = fixture(d.clone());
        let result = fx
            .dispatcher
            .send_server_command(Some(&d), "config", "locate", &[])
            .await;
        assert_eq!(result.code, ResultCode::Success);
        assert_eq!(fx.transport.call_count(), 0);
        assert_eq!(fx.sms.sent(), vec![("demo/t1".to_string(), "LOC,now".to_string())]);
        assert_eq!(pings(&fx.store).await, 1);
    }

    #[tokio::test]
    async fn test_sms_path_failures() {
        let d = device("textonly", 0, 0);
        let fx = fixture(d.clone());

        let unknown = fx
            .dispatcher
            .send_server_command(Some(&d), "config", "reboot", &[])
            .await;
        assert_eq!(unknown.code, ResultCode::InvalidCommand);

        let not_sms = fx
            .dispatcher
            .send_server_command(Some(&d), "config", "udponly", &[])
            .await;
        assert_eq!(not_sms.code, ResultCode::NotSupported);

        let no_gateway = fx
            .dispatcher
            .send_server_command(Some(&d), "config", "routed", &[])
            .await;
        assert_eq!(no_gateway.code, ResultCode::InvalidProto);

        fx.sms
            .set_failure(Some(SmsError::Connect("unreachable".into())));
        let gw_fail = fx
            .dispatcher
            .send_server_command(Some(&d), "config", "locate", &[])
            .await;
        assert_eq!(gw_fail.code, ResultCode::GatewayConnect);

        assert_eq!(fx.transport.call_count(), 0);
        assert_eq!(pings(&fx.store).await, 0);
    }

    #[tokio::test]
    async fn test_send_to_server_skips_gate() {
        let d = device("textonly", 1, 1);
        let fx = fixture(d.clone());
        let result = fx
            .dispatcher
            .send_to_server("acme", Some(&d), "config", "output", &[])
            .await;
        assert_eq!(result.code, ResultCode::Success);
        assert_eq!(pings(&fx.store).await, 1);
    }

    #[tokio::test]
    async fn test_send_sms_command() {
        let d = device("textonly", 0, 0);
        let fx = fixture(d.clone());
        let result = fx
            .dispatcher
            .send_sms_command(Some(""), Some(&d), "PING")
            .await;
        assert_eq!(result.code, ResultCode::Success);
        assert_eq!(pings(&fx.store).await, 1);

        let missing = fx
            .dispatcher
            .send_sms_command(Some("twilio"), Some(&d), "PING")
            .await;
        assert_eq!(missing.code, ResultCode::InvalidProto);

        let none = fx.dispatcher.send_sms_command(None, None, "PING").await;
        assert_eq!(none.code, ResultCode::InvalidDevice);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sends_respect_limit() {
        let d = device("acme", 3, 0);
        let fx = fixture(d.clone());

        let mut handles = Vec::new();
        for _ in 0..10 {
            let dispatcher = fx.dispatcher.clone();
            let d = d.clone();
            handles.push(tokio::spawn(async move {
                dispatcher
                    .send_server_command(Some(&d), "config", "output", &[])
                    .await
            }));
        }

        let mut ok = 0;
        for handle in handles {
            if handle.await.unwrap().is_success() {
                ok += 1;
            }
        }
        assert_eq!(ok, 3);
        assert_eq!(pings(&fx.store).await, 3);
        assert_eq!(fx.transport.call_count(), 3);
    }
}

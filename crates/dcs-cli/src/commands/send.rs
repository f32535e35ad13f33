//! Send command - dispatch one command to a device through a named server

use anyhow::{bail, Context, Result};
use dcs_core::{CommandResult, DeviceStore};
use dcs_dispatch::CommandDispatcher;

use crate::output::OutputContext;

/// Arguments of `dcs send`
#[derive(Debug, Clone)]
pub struct SendArgs {
    pub server: String,
    pub account: String,
    pub device: String,
    pub cmd_type: String,
    pub cmd_name: String,
    pub args: Vec<String>,
}

/// Send the command and print the outcome. Returns the dispatch result;
/// lookup failures before dispatch are errors.
pub async fn send(
    dispatcher: &CommandDispatcher,
    args: &SendArgs,
    ctx: &OutputContext,
) -> Result<CommandResult> {
    let server = args.server.trim();
    if !dispatcher.registry().contains(server) {
        bail!("Invalid server id: {}", server);
    }

    let store = dispatcher.store();
    if store
        .load_account(&args.account)
        .await
        .context("Failed to load account")?
        .is_none()
    {
        bail!("Account-ID does not exist: {}", args.account);
    }
    let device = store
        .load_device(&args.account, &args.device)
        .await
        .context("Failed to load device")?
        .with_context(|| {
            format!(
                "Device-ID does not exist: {}/{}",
                args.account, args.device
            )
        })?;

    let result = dispatcher
        .send_to_server(
            server,
            Some(&device),
            &args.cmd_type,
            &args.cmd_name,
            &args.args,
        )
        .await;

    let mut pairs = vec![
        ("result", result.code.code().to_string()),
        ("message", result.message.clone()),
    ];
    if let Some(response) = &result.response {
        for (k, v) in response {
            if k != "result" && k != "message" {
                pairs.push((k.as_str(), v.clone()));
            }
        }
    }

    if result.is_success() {
        ctx.success(&format!("Command Response: {}", result));
    } else {
        ctx.error(&format!("Unable to send command: {}", result));
    }
    if !ctx.quiet {
        ctx.print_kv(&pairs);
    }
    Ok(result)
}

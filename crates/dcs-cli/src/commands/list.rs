//! List command - show loaded communication servers

use anyhow::Result;
use dcs_core::{ServerDescriptor, ServerRegistry};

use crate::output::{OutputContext, ServerRow};

fn join_ports(ports: &[u16]) -> String {
    ports
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn server_row(dcs: &ServerDescriptor, deployed: bool) -> ServerRow {
    let port = dcs.command_dispatch_port();
    ServerRow {
        name: dcs.name().to_string(),
        description: dcs.description().to_string(),
        tcp: join_ports(&dcs.tcp_ports()),
        udp: join_ports(&dcs.udp_ports()),
        command_port: if port > 0 {
            port.to_string()
        } else {
            "-".to_string()
        },
        protocol: dcs.command_protocol().to_string(),
        commands: dcs
            .commands()
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(","),
        status: if deployed { "deployed" } else { "missing" }.to_string(),
    }
}

/// List registered servers; `all` includes undeployed ones
pub async fn list(registry: &ServerRegistry, all: bool, ctx: &OutputContext) -> Result<()> {
    let rows: Vec<ServerRow> = registry
        .list(all)
        .iter()
        .map(|dcs| server_row(dcs, registry.is_deployed(dcs.name())))
        .collect();

    ctx.print(&rows);

    let missing = registry.missing();
    if !all && !missing.is_empty() {
        ctx.info(&format!("Not deployed: {}", missing.join(", ")));
    }
    Ok(())
}

//! Lookup command - find devices by unique ID across server prefixes

use anyhow::{Context, Result};
use dcs_core::{DeviceStore, ServerRegistry};

use crate::output::{DeviceRow, OutputContext};

/// Find devices registered under `unique_id` with any known prefix
pub async fn lookup(
    registry: &ServerRegistry,
    store: &dyn DeviceStore,
    unique_id: &str,
    ctx: &OutputContext,
) -> Result<()> {
    let devices = registry
        .lookup_unique_id(store, unique_id)
        .await
        .with_context(|| format!("Unique ID lookup failed: {}", unique_id))?;

    if devices.is_empty() {
        ctx.info(&format!("No device found for unique ID '{}'", unique_id));
        return Ok(());
    }

    let rows: Vec<DeviceRow> = devices
        .into_iter()
        .map(|d| DeviceRow {
            unique_id: d.unique_id,
            account: d.account_id,
            device: d.device_id,
            server: d.server_id,
            pings: if d.max_ping_count > 0 {
                format!("{}/{}", d.total_ping_count, d.max_ping_count)
            } else {
                d.total_ping_count.to_string()
            },
        })
        .collect();

    ctx.print(&rows);
    Ok(())
}

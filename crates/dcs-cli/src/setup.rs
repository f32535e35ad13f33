//! Wiring of registry, device store and dispatcher from merged settings

use std::sync::Arc;

use anyhow::{Context, Result};
use dcs_config::{ConfigLoader, LoadReport, LoaderOptions};
use dcs_core::{
    AlwaysDeployed, ArtifactCheck, DeploymentContext, DirectoryArtifactCheck, MemoryDeviceStore,
    RuntimeProperties, ServerRegistry,
};
use dcs_dispatch::{
    create_gateway, create_transport, CommandDispatcher, SmsGatewayRegistry, TransportConfig,
};
use tracing::{debug, info};

use crate::config::MergedConfig;
use crate::output::OutputContext;

/// Loader switches taken from the command line
#[derive(Debug, Clone, Default)]
pub struct LoadArgs {
    pub only_server: Option<String>,
    pub port_offset: i32,
}

/// Load the DCS configuration and register every accepted server
pub fn load_registry(
    merged: &MergedConfig,
    args: &LoadArgs,
    ctx: &OutputContext,
) -> Result<Arc<ServerRegistry>> {
    let runtime = RuntimeProperties::new();
    runtime.extend(merged.properties.clone());

    let mut options = LoaderOptions::default()
        .with_only_server(args.only_server.as_deref())
        .with_port_offset(args.port_offset);
    if let Some(dir) = &merged.include_dir {
        options = options.with_include_dir(dir);
    }

    let loaded = ConfigLoader::new(runtime, options)
        .load(&merged.dcservers)
        .with_context(|| {
            format!(
                "Failed to load DCS configuration: {}",
                merged.dcservers.display()
            )
        })?;
    report_problems(&loaded.report, ctx);

    let artifact_check: Arc<dyn ArtifactCheck> = match &merged.artifact_dir {
        Some(dir) => Arc::new(DirectoryArtifactCheck::new(
            dir,
            merged.artifact_extension.as_str(),
        )),
        None => Arc::new(AlwaysDeployed),
    };
    let context = if merged.web_app {
        DeploymentContext::WebApp
    } else {
        DeploymentContext::Standalone
    };

    let registry = ServerRegistry::new(artifact_check, context);
    let registered = loaded.register_into(&registry);
    registry.mark_initialized();
    info!(registered, "Server registry ready");

    Ok(Arc::new(registry))
}

fn report_problems(report: &LoadReport, ctx: &OutputContext) {
    for warning in &report.warnings {
        ctx.warn(&format!("warning: {}", warning));
    }
    for error in &report.errors {
        ctx.error(&format!("error: {}", error));
    }
}

/// Load the device store file
pub fn load_store(merged: &MergedConfig) -> Result<Arc<MemoryDeviceStore>> {
    let store = MemoryDeviceStore::load(&merged.devices).with_context(|| {
        format!("Failed to load device store: {}", merged.devices.display())
    })?;
    debug!(devices = store.device_count(), "Device store loaded");
    Ok(Arc::new(store))
}

/// Build a dispatcher over a TCP transport and the configured gateways
pub fn build_dispatcher(
    merged: &MergedConfig,
    registry: Arc<ServerRegistry>,
    store: Arc<MemoryDeviceStore>,
) -> Result<CommandDispatcher> {
    let transport = create_transport(&TransportConfig::Tcp)
        .context("Failed to create command transport")?;

    let gateways = SmsGatewayRegistry::new();
    for (name, config) in &merged.sms_gateways {
        let gateway = create_gateway(config)
            .with_context(|| format!("Failed to create SMS gateway '{}'", name))?;
        gateways.register(name.clone(), gateway);
    }
    if gateways.get(&merged.dispatch.default_gateway).is_none() {
        // Without a configured default, SMS commands are only logged
        let gateway = create_gateway(&Default::default())
            .context("Failed to create default SMS gateway")?;
        gateways.register(merged.dispatch.default_gateway.clone(), gateway);
    }

    Ok(
        CommandDispatcher::new(registry, store, transport, Arc::new(gateways))
            .with_settings(merged.dispatch.clone()),
    )
}

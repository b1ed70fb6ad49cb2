use std::{env, sync::Arc};

use anyhow::Result;
use futures::StreamExt;
use kube::{
    api::{Api, PostParams},
    runtime::controller::{Action, Controller},
    runtime::watcher,
    Client, CustomResourceExt,
};
use thiserror::Error;
use tokio::time::Duration;
use tracing::*;

use nexus_controller::admission;
use nexus_controller::cluster::discovery::ClusterDiscovery;
use nexus_controller::nexus_types::Nexus;
use nexus_controller::update::HubUpdateSource;

#[derive(Debug, Error)]
enum Error {
    #[error("Failed to get CR: {0}")]
    CRGetFailed(#[source] kube::Error),
    #[error("Failed to update CR with its defaults: {0}")]
    DefaultsUpdateFailed(#[source] kube::Error),
    #[error("MissingObjectKey: {0}")]
    MissingObjectKey(&'static str),
}

/// Controller triggers this whenever our main object changed
async fn reconcile(nexus_from_cache: Arc<Nexus>, ctx: Arc<Data>) -> Result<Action, Error> {
    let client = &ctx.client;

    let nexus_name = nexus_from_cache
        .metadata
        .name
        .as_ref()
        .ok_or(Error::MissingObjectKey(".metadata.name"))?;
    let nexus_ns = nexus_from_cache
        .metadata
        .namespace
        .as_ref()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;

    let nexus_api = Api::<Nexus>::namespaced(client.clone(), nexus_ns);

    // Get the Nexus custom resource before taking any actions.
    let nexus = match nexus_api.get(nexus_name).await {
        Ok(nexus) => nexus,
        Err(kube::Error::Api(response)) if response.reason == "NotFound" => {
            info!("{} not found, end reconcile", nexus_name);
            return Ok(Action::await_change());
        }
        Err(e) => return Err(Error::CRGetFailed(e)),
    };

    let discovery = ClusterDiscovery::new(client.clone());
    let updates = HubUpdateSource::community();

    let mut defaulted = nexus.clone();
    admission::set_defaults(&mut defaulted, &discovery, &updates).await;
    if defaulted.spec != nexus.spec {
        info!("Update {} with its computed defaults", nexus_name);
        nexus_api
            .replace(nexus_name, &PostParams::default(), &defaulted)
            .await
            .map_err(Error::DefaultsUpdateFailed)?;
    }

    if let Err(violation) = admission::validate(&defaulted, &discovery).await {
        warn!("{} rejected: {}", nexus_name, violation);
    }

    Ok(Action::requeue(Duration::from_secs(60)))
}

/// The controller triggers this on reconcile errors
fn error_policy(_object: Arc<Nexus>, error: &Error, _ctx: Arc<Data>) -> Action {
    warn!("Reconcile failed due to error: {}", error);
    Action::requeue(Duration::from_secs(10))
}

// Data we want access to in error/reconcile calls
struct Data {
    client: Client,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let cmd = args.get(1).cloned().unwrap_or_default();
    if cmd == "export" {
        info!("exporting custom resource definition");
        println!("{}", serde_yaml::to_string(&Nexus::crd())?);
    } else if cmd == "run" {
        info!("running nexus-controller");
        let client = Client::try_default().await?;
        let nexuses = Api::<Nexus>::all(client.clone());

        Controller::new(nexuses, watcher::Config::default())
            .shutdown_on_signal()
            .run(reconcile, error_policy, Arc::new(Data { client }))
            .for_each(|res| async move {
                match res {
                    Ok(o) => info!("reconciled {:?}", o),
                    Err(e) => warn!("reconcile failed: {}", e),
                }
            })
            .await;
        info!("controller terminated");
    } else {
        warn!("wrong command; please use \"export\" or \"run\"");
    }
    Ok(())
}

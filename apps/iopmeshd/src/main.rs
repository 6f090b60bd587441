use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use iopmesh_agent::{AgentBuilder, AgentConfig, AgentHandle};
use iopmesh_protocol::{
    AgentName, Category, Definition, InboundEvent, Iop, IopKind, Mapping, MappingRule, ValueType,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "iopmeshd")]
#[command(about = "iopmesh agent demo daemon")]
struct Cli {
    #[arg(long, default_value = "monitor")]
    name: String,
    /// Definition JSON for the local agent.
    #[arg(long)]
    definition: Option<PathBuf>,
    /// Mapping JSON for the local agent.
    #[arg(long)]
    mapping: Option<PathBuf>,
    /// Number of simulated sensor peers.
    #[arg(long, default_value_t = 3)]
    peers: usize,
    /// Values each simulated peer publishes.
    #[arg(long, default_value_t = 4)]
    samples: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .compact()
        .init();

    let cli = Cli::parse();
    let sensors = Arc::new(sensors_category()?);

    let definition = match &cli.definition {
        Some(path) => Definition::from_json(&read(path).await?)
            .with_context(|| format!("invalid definition {path:?}"))?,
        None => monitor_definition(&cli.name)?,
    };
    let mapping = match &cli.mapping {
        Some(path) => Mapping::from_json(&read(path).await?)
            .with_context(|| format!("invalid mapping {path:?}"))?,
        None => Mapping {
            name: "sensors".to_owned(),
            rules: vec![MappingRule::category("*", sensors.name.clone())],
            ..Mapping::default()
        },
    };

    let mut agent = AgentBuilder::new(AgentConfig::new(cli.name.as_str()))
        .category(sensors.clone())
        .definition(definition)
        .mapping(mapping)
        .build()?;
    if agent.iop_exists(IopKind::Output, "latest") && agent.iop_exists(IopKind::Input, "temperature")
    {
        agent.observe(IopKind::Input, "temperature", |agent, _, iop| {
            let relayed = iop
                .value()
                .as_double()
                .and_then(|celsius| agent.write_as_double(IopKind::Output, "latest", celsius));
            if let Err(error) = relayed {
                warn!(%error, "latest reading not relayed");
            }
        })?;
    }
    let hub = agent
        .hub()
        .cloned()
        .context("agent was built without an outbound hub")?;
    let handle = AgentHandle::new(agent);

    let mut outbound = hub.subscribe();
    let outbound_task = tokio::spawn(async move {
        loop {
            match outbound.recv().await {
                Ok(record) => {
                    let rendered =
                        serde_json::to_string(&record.event).unwrap_or_else(|_| "{}".to_owned());
                    info!(sequence = record.sequence, event = %rendered, "outbound");
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "outbound logger lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let (tx, rx) = mpsc::channel(64);
    let driver = tokio::spawn({
        let handle = handle.clone();
        async move { handle.drain(rx).await }
    });

    let peers: Vec<AgentName> = (1..=cli.peers)
        .map(|n| AgentName::new(format!("sensor-{n}")))
        .collect();
    for peer in &peers {
        let definition = Definition::new(peer.as_str())?.with_category(sensors.clone())?;
        tx.send(InboundEvent::PeerDefinitionChanged {
            agent: peer.clone(),
            definition: Some(definition),
        })
        .await?;
    }
    for sample in 0..cli.samples {
        for (offset, peer) in peers.iter().enumerate() {
            let celsius = 18.0 + f64::from(sample) * 0.5 + offset as f64;
            tx.send(InboundEvent::ValueReceived {
                agent: peer.clone(),
                output: "temperature".to_owned(),
                value_type: ValueType::Double,
                payload: celsius.to_le_bytes().to_vec(),
            })
            .await?;
        }
    }
    if let Some(leaving) = peers.first() {
        tx.send(InboundEvent::PeerDefinitionChanged {
            agent: leaving.clone(),
            definition: None,
        })
        .await?;
    }
    drop(tx);

    let handled = driver.await?;
    info!(handled, "inbound queue drained");

    handle.with(|agent| {
        for entry in agent.mapping_entries() {
            info!(
                id = %entry.id,
                rule = %entry.rule,
                state = %entry.state,
                peers = agent.sub_connections(entry.id).len(),
                "mapping entry"
            );
        }
    });

    // The hub closes once the agent's transport and our clone are gone.
    drop(hub);
    drop(handle);
    outbound_task.await?;
    info!("outbound stream closed");

    Ok(())
}

async fn read(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed reading {path:?}"))
}

fn sensors_category() -> Result<Category> {
    Ok(Category::new("Sensors", "1.0")?
        .with_iop(IopKind::Output, Iop::new("temperature", ValueType::Double)?)?
        .with_iop(IopKind::Output, Iop::new("alarm", ValueType::Impulsion)?)?)
}

fn monitor_definition(name: &str) -> Result<Definition> {
    Ok(Definition::new(name)?
        .with_description("Collects readings from every Sensors peer")
        .with_version("1.0")
        .with_iop(IopKind::Input, Iop::new("temperature", ValueType::Double)?)?
        .with_iop(IopKind::Input, Iop::new("alarm", ValueType::Impulsion)?)?
        .with_iop(IopKind::Output, Iop::new("latest", ValueType::Double)?)?)
}

//! # Network Provider
//!
//! Declares the isolated virtual network shared by the database and the
//! container cluster.
//!
//! The network's /16 address space is carved into /20 subnets, one public
//! and one private per availability zone, in zone order.

use crate::constants::{MAX_AVAILABILITY_ZONES, NETWORK_CIDR, SUBNET_PREFIX_LENGTH};
use crate::error::StackError;
use crate::graph::{Binding, Properties, ResourceId, ResourceKind, StackGraph};
use serde::Serialize;
use tracing::info;

/// Subnet tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubnetTier {
    /// Routed to the internet gateway; hosts internet-facing load balancers
    Public,
    /// Egress only; hosts the database, tasks and internal load balancers
    Private,
}

impl SubnetTier {
    pub fn as_str(self) -> &'static str {
        match self {
            SubnetTier::Public => "Public",
            SubnetTier::Private => "Private",
        }
    }
}

/// One allocated subnet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubnetAllocation {
    pub name: String,
    pub zone_index: u32,
    pub tier: SubnetTier,
    pub cidr_block: String,
}

/// Handle to the declared network
#[derive(Debug, Clone)]
pub struct NetworkIdentity {
    id: ResourceId,
    name: String,
    subnets: Vec<SubnetAllocation>,
}

impl NetworkIdentity {
    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cidr_block(&self) -> &'static str {
        NETWORK_CIDR
    }

    pub fn subnets(&self) -> &[SubnetAllocation] {
        &self.subnets
    }

    pub fn availability_zones(&self) -> u32 {
        self.subnets.iter().map(|s| s.zone_index + 1).max().unwrap_or(0)
    }

    pub fn vpc_id(&self) -> Binding {
        Binding::attribute(self.id, "VpcId")
    }

    /// Subnet IDs of one tier, for placing resources
    pub fn subnet_ids(&self, tier: SubnetTier) -> Binding {
        Binding::List(
            self.subnets
                .iter()
                .filter(|s| s.tier == tier)
                .map(|s| Binding::attribute(self.id, format!("Subnets.{}.SubnetId", s.name)))
                .collect(),
        )
    }
}

/// Allocate per-zone subnets inside the network address space
pub fn allocate_subnets(max_availability_zones: u32) -> Result<Vec<SubnetAllocation>, StackError> {
    if max_availability_zones == 0 || max_availability_zones > MAX_AVAILABILITY_ZONES {
        return Err(StackError::configuration(format!(
            "max availability zones must be between 1 and {MAX_AVAILABILITY_ZONES}, got {max_availability_zones}"
        )));
    }

    // Each /20 spans 16 values of the third octet.
    let block_step = 1u32 << (24 - u32::from(SUBNET_PREFIX_LENGTH));
    let mut subnets = Vec::new();
    // Tiers interleave per zone: zone 1 gets blocks 0 and 1, zone 2 gets 2 and 3.
    let mut block = 0u32;
    for zone in 0..max_availability_zones {
        for tier in [SubnetTier::Public, SubnetTier::Private] {
            subnets.push(SubnetAllocation {
                name: format!("{}{}", tier.as_str(), zone + 1),
                zone_index: zone,
                tier,
                cidr_block: format!("10.0.{}.0/{SUBNET_PREFIX_LENGTH}", block * block_step),
            });
            block += 1;
        }
    }
    Ok(subnets)
}

/// Declare the virtual network
pub fn create_network(
    graph: &mut StackGraph,
    name: impl Into<String>,
    max_availability_zones: u32,
) -> Result<NetworkIdentity, StackError> {
    let name = name.into();
    let subnets = allocate_subnets(max_availability_zones)?;

    let subnet_values = serde_json::to_value(&subnets).map_err(|e| {
        StackError::Provisioning(anyhow::anyhow!("failed to encode subnet layout: {e}"))
    })?;
    let properties = Properties::new()
        .with_literal("CidrBlock", NETWORK_CIDR)
        .with_literal("MaxAzs", max_availability_zones)
        .with_literal("EnableDnsHostnames", true)
        .with_literal("EnableDnsSupport", true)
        .with_literal("Subnets", subnet_values);
    let id = graph.declare(name.as_str(), ResourceKind::Network, properties)?;

    info!(
        network = %name,
        cidr = NETWORK_CIDR,
        zones = max_availability_zones,
        subnets = subnets.len(),
        "Declared network"
    );
    Ok(NetworkIdentity { id, name, subnets })
}

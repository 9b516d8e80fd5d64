//! AWS provider implementation
//!
//! Thin, near-1:1 mappings from the four-verb APIs onto the AWS SDK: EC2 for
//! network, subnet, firewall and instances, ECS for clusters and services,
//! Route53 for DNS, ELBv2, ECR, IAM and SSM for the rest. No retry logic
//! lives here; the orchestrators wrap every mutation in their own budgets.

use crate::model::*;
use crate::provider::*;
use async_trait::async_trait;
use aws_sdk_ec2::types::{
    Filter, InstanceStateName, InstanceType as Ec2InstanceType, IpPermission, IpRange,
    ResourceType, Tag as Ec2Tag, TagSpecification,
};
use aws_sdk_ec2::Client as Ec2Client;
use aws_sdk_ecr::Client as EcrClient;
use aws_sdk_ecs::types::{
    ClusterField, Compatibility, ContainerDefinition, KeyValuePair, LaunchType, PortMapping,
    ServiceField, Tag as EcsTag,
};
use aws_sdk_ecs::Client as EcsClient;
use aws_sdk_elasticloadbalancingv2::Client as ElbClient;
use aws_sdk_iam::Client as IamClient;
use aws_sdk_route53::types::{
    Change, ChangeAction, ChangeBatch, ResourceRecord, ResourceRecordSet, RrType,
};
use aws_sdk_route53::Client as Route53Client;
use aws_sdk_ssm::types::ParameterType;
use aws_sdk_ssm::Client as SsmClient;
use berth_core::error::{not_found, provider};
use berth_core::name::TagFilter;
use berth_core::Result;
use berth_utils::config::CloudSettings;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// AWS cloud provider
pub struct AwsProvider {
    ec2: Ec2Client,
    ecs: EcsClient,
    route53: Route53Client,
    elb: ElbClient,
    ecr: EcrClient,
    iam: IamClient,
    ssm: SsmClient,
    settings: CloudSettings,
}

impl AwsProvider {
    /// Create a provider for the configured region and hosted zone
    pub async fn new(settings: CloudSettings) -> Result<Self> {
        let config = aws_config::from_env()
            .region(aws_sdk_ec2::config::Region::new(settings.region.clone()))
            .load()
            .await;

        Ok(Self {
            ec2: Ec2Client::new(&config),
            ecs: EcsClient::new(&config),
            route53: Route53Client::new(&config),
            elb: ElbClient::new(&config),
            ecr: EcrClient::new(&config),
            iam: IamClient::new(&config),
            ssm: SsmClient::new(&config),
            settings,
        })
    }

    /// Check that credentials are present and the region answers
    pub async fn is_available(&self) -> bool {
        match self.ec2.describe_regions().send().await {
            Ok(_) => true,
            Err(e) => {
                warn!("AWS not available: {}", e);
                false
            }
        }
    }

    /// Translate a tag filter into EC2 server-side filters
    fn ec2_filters(filter: &TagFilter) -> Vec<Filter> {
        filter
            .entries()
            .map(|(k, v)| Filter::builder().name(format!("tag:{k}")).values(v).build())
            .collect()
    }

    /// Tag specification for an EC2 create call
    fn ec2_tag_spec(resource_type: ResourceType, tags: &HashMap<String, String>) -> TagSpecification {
        let tags: Vec<Ec2Tag> = tags
            .iter()
            .map(|(k, v)| Ec2Tag::builder().key(k).value(v).build())
            .collect();
        TagSpecification::builder()
            .resource_type(resource_type)
            .set_tags(Some(tags))
            .build()
    }

    fn ec2_tag_map(tags: &[Ec2Tag]) -> HashMap<String, String> {
        tags.iter()
            .filter_map(|t| Some((t.key()?.to_string(), t.value()?.to_string())))
            .collect()
    }

    fn ecs_tags(tags: &HashMap<String, String>) -> Vec<EcsTag> {
        tags.iter()
            .map(|(k, v)| EcsTag::builder().key(k).value(v).build())
            .collect()
    }

    fn ecs_tag_map(tags: &[EcsTag]) -> HashMap<String, String> {
        tags.iter()
            .filter_map(|t| Some((t.key()?.to_string(), t.value()?.to_string())))
            .collect()
    }

    /// Map AWS instance state to our state
    fn map_state(aws_state: &InstanceStateName) -> InstanceState {
        match aws_state {
            InstanceStateName::Pending => InstanceState::Pending,
            InstanceStateName::Running => InstanceState::Running,
            InstanceStateName::Stopping => InstanceState::Stopping,
            InstanceStateName::Stopped => InstanceState::Stopped,
            InstanceStateName::ShuttingDown => InstanceState::Terminating,
            InstanceStateName::Terminated => InstanceState::Terminated,
            _ => InstanceState::Unknown,
        }
    }

    /// Task-level cpu units / memory MB from the fractional core / GB spec
    fn task_resources(spec: &ServiceSpec) -> (i32, i32) {
        let cpu_units = (spec.cpu.unwrap_or(0.25) * 1024.0) as i32;
        let memory_mb = (spec.memory.unwrap_or(0.5) * 1024.0) as i32;
        (cpu_units.max(128), memory_mb.max(128))
    }

    /// Route53 names come back with a trailing dot
    fn fqdn(name: &str) -> String {
        if name.ends_with('.') {
            name.to_string()
        } else {
            format!("{name}.")
        }
    }
}

#[async_trait]
impl Networks for AwsProvider {
    async fn describe(&self, filter: &TagFilter) -> Result<Vec<Network>> {
        debug!("Describing VPCs in region: {}", self.settings.region);
        let resp = self
            .ec2
            .describe_vpcs()
            .set_filters(Some(Self::ec2_filters(filter)))
            .send()
            .await
            .map_err(|e| provider("ec2.describe_vpcs", e))?;

        Ok(resp
            .vpcs()
            .iter()
            .map(|vpc| Network {
                id: vpc.vpc_id().unwrap_or_default().to_string(),
                cidr: vpc.cidr_block().unwrap_or_default().to_string(),
                tags: Self::ec2_tag_map(vpc.tags()),
            })
            .collect())
    }

    async fn create(&self, spec: NetworkSpec) -> Result<Network> {
        info!("Creating VPC with CIDR {}", spec.cidr);
        let resp = self
            .ec2
            .create_vpc()
            .cidr_block(&spec.cidr)
            .tag_specifications(Self::ec2_tag_spec(ResourceType::Vpc, &spec.tags))
            .send()
            .await
            .map_err(|e| provider("ec2.create_vpc", e))?;

        let vpc = resp
            .vpc()
            .ok_or_else(|| provider("ec2.create_vpc", "no VPC returned"))?;
        Ok(Network {
            id: vpc.vpc_id().unwrap_or_default().to_string(),
            cidr: spec.cidr,
            tags: spec.tags,
        })
    }

    async fn destroy(&self, id: &str) -> Result<()> {
        info!("Deleting VPC {}", id);
        self.ec2
            .delete_vpc()
            .vpc_id(id)
            .send()
            .await
            .map_err(|e| provider("ec2.delete_vpc", e))?;
        Ok(())
    }
}

#[async_trait]
impl Subnets for AwsProvider {
    async fn describe(&self, filter: &TagFilter) -> Result<Vec<Subnet>> {
        let resp = self
            .ec2
            .describe_subnets()
            .set_filters(Some(Self::ec2_filters(filter)))
            .send()
            .await
            .map_err(|e| provider("ec2.describe_subnets", e))?;

        Ok(resp
            .subnets()
            .iter()
            .map(|s| Subnet {
                id: s.subnet_id().unwrap_or_default().to_string(),
                network_id: s.vpc_id().unwrap_or_default().to_string(),
                cidr: s.cidr_block().unwrap_or_default().to_string(),
                tags: Self::ec2_tag_map(s.tags()),
            })
            .collect())
    }

    async fn create(&self, spec: SubnetSpec) -> Result<Subnet> {
        info!("Creating subnet {} in {}", spec.cidr, spec.network_id);
        let resp = self
            .ec2
            .create_subnet()
            .vpc_id(&spec.network_id)
            .cidr_block(&spec.cidr)
            .tag_specifications(Self::ec2_tag_spec(ResourceType::Subnet, &spec.tags))
            .send()
            .await
            .map_err(|e| provider("ec2.create_subnet", e))?;

        let subnet = resp
            .subnet()
            .ok_or_else(|| provider("ec2.create_subnet", "no subnet returned"))?;
        Ok(Subnet {
            id: subnet.subnet_id().unwrap_or_default().to_string(),
            network_id: spec.network_id,
            cidr: spec.cidr,
            tags: spec.tags,
        })
    }

    async fn destroy(&self, id: &str) -> Result<()> {
        info!("Deleting subnet {}", id);
        self.ec2
            .delete_subnet()
            .subnet_id(id)
            .send()
            .await
            .map_err(|e| provider("ec2.delete_subnet", e))?;
        Ok(())
    }
}

#[async_trait]
impl Firewalls for AwsProvider {
    async fn describe(&self, filter: &TagFilter) -> Result<Vec<FirewallRuleSet>> {
        let resp = self
            .ec2
            .describe_security_groups()
            .set_filters(Some(Self::ec2_filters(filter)))
            .send()
            .await
            .map_err(|e| provider("ec2.describe_security_groups", e))?;

        Ok(resp
            .security_groups()
            .iter()
            .map(|g| FirewallRuleSet {
                id: g.group_id().unwrap_or_default().to_string(),
                name: g.group_name().unwrap_or_default().to_string(),
                network_id: g.vpc_id().map(|v| v.to_string()),
                tags: Self::ec2_tag_map(g.tags()),
            })
            .collect())
    }

    async fn create(&self, spec: FirewallSpec) -> Result<FirewallRuleSet> {
        info!("Creating security group {}", spec.name);
        let resp = self
            .ec2
            .create_security_group()
            .group_name(&spec.name)
            .description(&spec.name)
            .set_vpc_id(spec.network_id.clone())
            .tag_specifications(Self::ec2_tag_spec(ResourceType::SecurityGroup, &spec.tags))
            .send()
            .await
            .map_err(|e| provider("ec2.create_security_group", e))?;

        let id = resp
            .group_id()
            .ok_or_else(|| provider("ec2.create_security_group", "no group id returned"))?
            .to_string();

        if !spec.open_ports.is_empty() {
            let permissions: Vec<IpPermission> = spec
                .open_ports
                .iter()
                .map(|port| {
                    IpPermission::builder()
                        .ip_protocol("tcp")
                        .from_port(i32::from(*port))
                        .to_port(i32::from(*port))
                        .ip_ranges(IpRange::builder().cidr_ip("0.0.0.0/0").build())
                        .build()
                })
                .collect();
            self.ec2
                .authorize_security_group_ingress()
                .group_id(&id)
                .set_ip_permissions(Some(permissions))
                .send()
                .await
                .map_err(|e| provider("ec2.authorize_security_group_ingress", e))?;
        }

        Ok(FirewallRuleSet {
            id,
            name: spec.name,
            network_id: spec.network_id,
            tags: spec.tags,
        })
    }

    async fn destroy(&self, id: &str) -> Result<()> {
        info!("Deleting security group {}", id);
        self.ec2
            .delete_security_group()
            .group_id(id)
            .send()
            .await
            .map_err(|e| provider("ec2.delete_security_group", e))?;
        Ok(())
    }
}

#[async_trait]
impl Instances for AwsProvider {
    async fn describe(&self, filter: &TagFilter) -> Result<Vec<Instance>> {
        debug!("Describing instances in region: {}", self.settings.region);
        let resp = self
            .ec2
            .describe_instances()
            .set_filters(Some(Self::ec2_filters(filter)))
            .send()
            .await
            .map_err(|e| provider("ec2.describe_instances", e))?;

        let mut instances = Vec::new();
        for reservation in resp.reservations() {
            for aws_inst in reservation.instances() {
                let Some(id) = aws_inst.instance_id() else {
                    continue;
                };
                let tags = Self::ec2_tag_map(aws_inst.tags());
                let name = tags.get("Name").cloned().unwrap_or_default();

                let mut instance = Instance::new(InstanceId::new(id), name);
                instance.state = aws_inst
                    .state()
                    .and_then(|s| s.name())
                    .map(Self::map_state)
                    .unwrap_or(InstanceState::Unknown);
                instance.public_ip = aws_inst.public_ip_address().map(|ip| ip.to_string());
                instance.private_ip = aws_inst.private_ip_address().map(|ip| ip.to_string());
                instance.launched_at = aws_inst
                    .launch_time()
                    .and_then(|t| Utc.timestamp_opt(t.secs(), t.subsec_nanos()).single());
                instance.tags = tags;
                instances.push(instance);
            }
        }
        Ok(instances)
    }

    async fn create(&self, spec: InstanceSpec) -> Result<Vec<Instance>> {
        info!("Launching {} instance(s) named {}", spec.count, spec.name);
        let mut tags = spec.tags.clone();
        tags.insert("Name".to_string(), spec.name.clone());

        let count = spec.count.max(1) as i32;
        let resp = self
            .ec2
            .run_instances()
            .image_id(&spec.image_id)
            .instance_type(Ec2InstanceType::from(spec.instance_type.as_str()))
            .min_count(count)
            .max_count(count)
            .set_subnet_id(spec.subnet_id.clone())
            .set_security_group_ids(spec.firewall_id.clone().map(|id| vec![id]))
            .tag_specifications(Self::ec2_tag_spec(ResourceType::Instance, &tags))
            .send()
            .await
            .map_err(|e| provider("ec2.run_instances", e))?;

        let mut created = Vec::new();
        for aws_inst in resp.instances() {
            let Some(id) = aws_inst.instance_id() else {
                continue;
            };
            let mut instance = Instance::new(InstanceId::new(id), spec.name.clone());
            instance.tags = tags.clone();
            instance.private_ip = aws_inst.private_ip_address().map(|ip| ip.to_string());
            created.push(instance);
        }
        if created.is_empty() {
            return Err(provider("ec2.run_instances", "no instances returned"));
        }
        Ok(created)
    }

    async fn destroy(&self, id: &InstanceId) -> Result<()> {
        info!("Terminating instance {}", id);
        self.ec2
            .terminate_instances()
            .instance_ids(id.as_str())
            .send()
            .await
            .map_err(|e| provider("ec2.terminate_instances", e))?;
        Ok(())
    }

    async fn list(&self, filter: &TagFilter) -> Result<Vec<InstanceId>> {
        let instances = Instances::describe(self, filter).await?;
        Ok(instances.into_iter().map(|i| i.id).collect())
    }
}

#[async_trait]
impl Clusters for AwsProvider {
    async fn describe(&self, filter: &TagFilter) -> Result<Vec<Cluster>> {
        let arns = self
            .ecs
            .list_clusters()
            .send()
            .await
            .map_err(|e| provider("ecs.list_clusters", e))?
            .cluster_arns()
            .to_vec();
        if arns.is_empty() {
            return Ok(Vec::new());
        }

        let resp = self
            .ecs
            .describe_clusters()
            .set_clusters(Some(arns))
            .include(ClusterField::Tags)
            .send()
            .await
            .map_err(|e| provider("ecs.describe_clusters", e))?;

        Ok(resp
            .clusters()
            .iter()
            .filter(|c| c.status() != Some("INACTIVE"))
            .map(|c| Cluster {
                name: c.cluster_name().unwrap_or_default().to_string(),
                arn: c.cluster_arn().map(|a| a.to_string()),
                tags: Self::ecs_tag_map(c.tags()),
            })
            .filter(|c| filter.matches(&c.tags))
            .collect())
    }

    async fn get(&self, name: &str) -> Result<Option<Cluster>> {
        let resp = self
            .ecs
            .describe_clusters()
            .clusters(name)
            .include(ClusterField::Tags)
            .send()
            .await
            .map_err(|e| provider("ecs.describe_clusters", e))?;

        Ok(resp
            .clusters()
            .iter()
            .find(|c| c.status() == Some("ACTIVE"))
            .map(|c| Cluster {
                name: c.cluster_name().unwrap_or_default().to_string(),
                arn: c.cluster_arn().map(|a| a.to_string()),
                tags: Self::ecs_tag_map(c.tags()),
            }))
    }

    async fn create(&self, spec: ClusterSpec) -> Result<Cluster> {
        info!("Creating ECS cluster {}", spec.name);
        let resp = self
            .ecs
            .create_cluster()
            .cluster_name(&spec.name)
            .set_tags(Some(Self::ecs_tags(&spec.tags)))
            .send()
            .await
            .map_err(|e| provider("ecs.create_cluster", e))?;

        let cluster = resp
            .cluster()
            .ok_or_else(|| provider("ecs.create_cluster", "no cluster returned"))?;
        Ok(Cluster {
            name: cluster.cluster_name().unwrap_or_default().to_string(),
            arn: cluster.cluster_arn().map(|a| a.to_string()),
            tags: spec.tags,
        })
    }

    async fn destroy(&self, name: &str) -> Result<()> {
        info!("Deleting ECS cluster {}", name);
        self.ecs
            .delete_cluster()
            .cluster(name)
            .send()
            .await
            .map_err(|e| provider("ecs.delete_cluster", e))?;
        Ok(())
    }
}

#[async_trait]
impl Services for AwsProvider {
    async fn describe(&self, filter: &TagFilter) -> Result<Vec<Service>> {
        let mut out = Vec::new();
        for cluster in Clusters::describe(self, &TagFilter::new()).await? {
            let arns = self
                .ecs
                .list_services()
                .cluster(&cluster.name)
                .send()
                .await
                .map_err(|e| provider("ecs.list_services", e))?
                .service_arns()
                .to_vec();
            if arns.is_empty() {
                continue;
            }
            let resp = self
                .ecs
                .describe_services()
                .cluster(&cluster.name)
                .set_services(Some(arns))
                .include(ServiceField::Tags)
                .send()
                .await
                .map_err(|e| provider("ecs.describe_services", e))?;
            for s in resp.services() {
                let tags = Self::ecs_tag_map(s.tags());
                if filter.matches(&tags) {
                    out.push(Service {
                        name: s.service_name().unwrap_or_default().to_string(),
                        cluster: cluster.name.clone(),
                        task_definition: s.task_definition().unwrap_or_default().to_string(),
                        desired_count: s.desired_count().max(0) as u32,
                        tags,
                    });
                }
            }
        }
        Ok(out)
    }

    async fn get(&self, cluster: &str, name: &str) -> Result<Option<Service>> {
        let resp = self
            .ecs
            .describe_services()
            .cluster(cluster)
            .services(name)
            .include(ServiceField::Tags)
            .send()
            .await
            .map_err(|e| provider("ecs.describe_services", e))?;

        Ok(resp
            .services()
            .iter()
            .find(|s| s.status() == Some("ACTIVE"))
            .map(|s| Service {
                name: s.service_name().unwrap_or_default().to_string(),
                cluster: cluster.to_string(),
                task_definition: s.task_definition().unwrap_or_default().to_string(),
                desired_count: s.desired_count().max(0) as u32,
                tags: Self::ecs_tag_map(s.tags()),
            }))
    }

    async fn create(&self, spec: ServiceSpec) -> Result<Service> {
        info!("Registering task definition {}", spec.name);
        let (cpu_units, memory_mb) = Self::task_resources(&spec);
        let env: Vec<KeyValuePair> = spec
            .env
            .iter()
            .map(|(k, v)| KeyValuePair::builder().name(k).value(v).build())
            .collect();
        let container = ContainerDefinition::builder()
            .name(&spec.name)
            .image(&spec.image)
            .cpu(cpu_units)
            .memory(memory_mb)
            .port_mappings(
                PortMapping::builder()
                    .container_port(i32::from(spec.container_port))
                    .build(),
            )
            .set_environment(Some(env))
            .build();

        let registered = self
            .ecs
            .register_task_definition()
            .family(&spec.name)
            .requires_compatibilities(Compatibility::Ec2)
            .container_definitions(container)
            .send()
            .await
            .map_err(|e| provider("ecs.register_task_definition", e))?;

        let task_definition = registered
            .task_definition()
            .and_then(|t| t.task_definition_arn())
            .ok_or_else(|| provider("ecs.register_task_definition", "no task definition arn"))?
            .to_string();

        let existing = Services::get(self, &spec.cluster, &spec.name).await?;
        if existing.is_some() {
            info!("Updating service {} on {}", spec.name, spec.cluster);
            self.ecs
                .update_service()
                .cluster(&spec.cluster)
                .service(&spec.name)
                .task_definition(&task_definition)
                .desired_count(spec.desired_count as i32)
                .send()
                .await
                .map_err(|e| provider("ecs.update_service", e))?;
        } else {
            info!("Creating service {} on {}", spec.name, spec.cluster);
            self.ecs
                .create_service()
                .cluster(&spec.cluster)
                .service_name(&spec.name)
                .task_definition(&task_definition)
                .desired_count(spec.desired_count as i32)
                .launch_type(LaunchType::Ec2)
                .set_tags(Some(Self::ecs_tags(&spec.tags)))
                .send()
                .await
                .map_err(|e| provider("ecs.create_service", e))?;
        }

        Ok(Service {
            name: spec.name,
            cluster: spec.cluster,
            task_definition,
            desired_count: spec.desired_count,
            tags: spec.tags,
        })
    }

    async fn destroy(&self, cluster: &str, name: &str) -> Result<()> {
        info!("Deleting service {} on {}", name, cluster);
        self.ecs
            .delete_service()
            .cluster(cluster)
            .service(name)
            .force(true)
            .send()
            .await
            .map_err(|e| provider("ecs.delete_service", e))?;
        Ok(())
    }
}

#[async_trait]
impl DnsRecords for AwsProvider {
    async fn describe(&self, name: &str) -> Result<Option<DnsRecord>> {
        let wanted = Self::fqdn(name);
        let resp = self
            .route53
            .list_resource_record_sets()
            .hosted_zone_id(&self.settings.hosted_zone_id)
            .start_record_name(&wanted)
            .start_record_type(RrType::A)
            .max_items(1)
            .send()
            .await
            .map_err(|e| provider("route53.list_resource_record_sets", e))?;

        Ok(resp
            .resource_record_sets()
            .iter()
            .find(|set| set.name() == wanted)
            .map(|set| DnsRecord {
                name: set.name().trim_end_matches('.').to_string(),
                record_type: set.r#type().as_str().to_string(),
                value: set
                    .resource_records()
                    .first()
                    .map(|r| r.value().to_string())
                    .unwrap_or_default(),
                ttl_seconds: set.ttl().unwrap_or(60),
            }))
    }

    async fn create(&self, spec: DnsRecordSpec) -> Result<DnsRecord> {
        info!("Upserting A record {} -> {}", spec.name, spec.value);
        let record = ResourceRecord::builder()
            .value(&spec.value)
            .build()
            .map_err(|e| provider("route53.change_resource_record_sets", e))?;
        let record_set = ResourceRecordSet::builder()
            .name(Self::fqdn(&spec.name))
            .r#type(RrType::A)
            .ttl(spec.ttl_seconds)
            .resource_records(record)
            .build()
            .map_err(|e| provider("route53.change_resource_record_sets", e))?;
        let change = Change::builder()
            .action(ChangeAction::Upsert)
            .resource_record_set(record_set)
            .build()
            .map_err(|e| provider("route53.change_resource_record_sets", e))?;
        let batch = ChangeBatch::builder()
            .changes(change)
            .build()
            .map_err(|e| provider("route53.change_resource_record_sets", e))?;

        self.route53
            .change_resource_record_sets()
            .hosted_zone_id(&self.settings.hosted_zone_id)
            .change_batch(batch)
            .send()
            .await
            .map_err(|e| provider("route53.change_resource_record_sets", e))?;

        Ok(DnsRecord {
            name: spec.name,
            record_type: "A".to_string(),
            value: spec.value,
            ttl_seconds: spec.ttl_seconds,
        })
    }

    async fn destroy(&self, name: &str) -> Result<()> {
        // Route53 deletes require the record's current value and TTL
        let existing = DnsRecords::describe(self, name)
            .await?
            .ok_or_else(|| not_found(format!("no DNS record named {name}")))?;

        info!("Deleting A record {}", name);
        let record = ResourceRecord::builder()
            .value(&existing.value)
            .build()
            .map_err(|e| provider("route53.change_resource_record_sets", e))?;
        let record_set = ResourceRecordSet::builder()
            .name(Self::fqdn(name))
            .r#type(RrType::A)
            .ttl(existing.ttl_seconds)
            .resource_records(record)
            .build()
            .map_err(|e| provider("route53.change_resource_record_sets", e))?;
        let change = Change::builder()
            .action(ChangeAction::Delete)
            .resource_record_set(record_set)
            .build()
            .map_err(|e| provider("route53.change_resource_record_sets", e))?;
        let batch = ChangeBatch::builder()
            .changes(change)
            .build()
            .map_err(|e| provider("route53.change_resource_record_sets", e))?;

        self.route53
            .change_resource_record_sets()
            .hosted_zone_id(&self.settings.hosted_zone_id)
            .change_batch(batch)
            .send()
            .await
            .map_err(|e| provider("route53.change_resource_record_sets", e))?;
        Ok(())
    }
}

#[async_trait]
impl LoadBalancers for AwsProvider {
    async fn describe(&self, name: &str) -> Result<Option<LoadBalancer>> {
        match self.elb.describe_load_balancers().names(name).send().await {
            Ok(resp) => Ok(resp.load_balancers().first().map(|lb| LoadBalancer {
                id: lb.load_balancer_arn().unwrap_or_default().to_string(),
                name: lb.load_balancer_name().unwrap_or_default().to_string(),
                dns_name: lb.dns_name().map(|d| d.to_string()),
                tags: HashMap::new(),
            })),
            Err(err) => {
                let err = err.into_service_error();
                if err.is_load_balancer_not_found_exception() {
                    Ok(None)
                } else {
                    Err(provider("elb.describe_load_balancers", err))
                }
            }
        }
    }

    async fn create(&self, spec: LoadBalancerSpec) -> Result<LoadBalancer> {
        info!("Creating load balancer {}", spec.name);
        let resp = self
            .elb
            .create_load_balancer()
            .name(&spec.name)
            .set_subnets(Some(spec.subnet_ids.clone()))
            .send()
            .await
            .map_err(|e| provider("elb.create_load_balancer", e))?;

        let lb = resp
            .load_balancers()
            .first()
            .ok_or_else(|| provider("elb.create_load_balancer", "no load balancer returned"))?;
        Ok(LoadBalancer {
            id: lb.load_balancer_arn().unwrap_or_default().to_string(),
            name: spec.name,
            dns_name: lb.dns_name().map(|d| d.to_string()),
            tags: spec.tags,
        })
    }

    async fn destroy(&self, id: &str) -> Result<()> {
        info!("Deleting load balancer {}", id);
        self.elb
            .delete_load_balancer()
            .load_balancer_arn(id)
            .send()
            .await
            .map_err(|e| provider("elb.delete_load_balancer", e))?;
        Ok(())
    }
}

#[async_trait]
impl Identities for AwsProvider {
    async fn describe(&self, user_name: &str) -> Result<Option<Identity>> {
        match self.iam.get_user().user_name(user_name).send().await {
            Ok(resp) => Ok(resp.user().map(|u| Identity {
                user_name: u.user_name().to_string(),
                access_key_id: None,
                secret_access_key: None,
                tags: u
                    .tags()
                    .iter()
                    .map(|t| (t.key().to_string(), t.value().to_string()))
                    .collect(),
            })),
            Err(err) => {
                let err = err.into_service_error();
                if err.is_no_such_entity_exception() {
                    Ok(None)
                } else {
                    Err(provider("iam.get_user", err))
                }
            }
        }
    }

    async fn create(&self, spec: IdentitySpec) -> Result<Identity> {
        info!("Creating IAM user {}", spec.user_name);
        let tags = spec
            .tags
            .iter()
            .map(|(k, v)| {
                aws_sdk_iam::types::Tag::builder()
                    .key(k)
                    .value(v)
                    .build()
                    .map_err(|e| provider("iam.create_user", e))
            })
            .collect::<Result<Vec<_>>>()?;

        self.iam
            .create_user()
            .user_name(&spec.user_name)
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(|e| provider("iam.create_user", e))?;

        let key_resp = self
            .iam
            .create_access_key()
            .user_name(&spec.user_name)
            .send()
            .await
            .map_err(|e| provider("iam.create_access_key", e))?;
        let key = key_resp
            .access_key()
            .ok_or_else(|| provider("iam.create_access_key", "no access key returned"))?;

        Ok(Identity {
            user_name: spec.user_name,
            access_key_id: Some(key.access_key_id().to_string()),
            secret_access_key: Some(key.secret_access_key().to_string()),
            tags: spec.tags,
        })
    }

    async fn destroy(&self, user_name: &str) -> Result<()> {
        info!("Deleting IAM user {}", user_name);
        let keys = self
            .iam
            .list_access_keys()
            .user_name(user_name)
            .send()
            .await
            .map_err(|e| provider("iam.list_access_keys", e))?;
        for meta in keys.access_key_metadata() {
            if let Some(key_id) = meta.access_key_id() {
                self.iam
                    .delete_access_key()
                    .user_name(user_name)
                    .access_key_id(key_id)
                    .send()
                    .await
                    .map_err(|e| provider("iam.delete_access_key", e))?;
            }
        }
        self.iam
            .delete_user()
            .user_name(user_name)
            .send()
            .await
            .map_err(|e| provider("iam.delete_user", e))?;
        Ok(())
    }
}

#[async_trait]
impl Repositories for AwsProvider {
    async fn describe(&self, name: &str) -> Result<Option<Repository>> {
        match self
            .ecr
            .describe_repositories()
            .repository_names(name)
            .send()
            .await
        {
            Ok(resp) => Ok(resp.repositories().first().map(|r| Repository {
                name: r.repository_name().unwrap_or_default().to_string(),
                uri: r.repository_uri().map(|u| u.to_string()),
                tags: HashMap::new(),
            })),
            Err(err) => {
                let err = err.into_service_error();
                if err.is_repository_not_found_exception() {
                    Ok(None)
                } else {
                    Err(provider("ecr.describe_repositories", err))
                }
            }
        }
    }

    async fn create(&self, spec: RepositorySpec) -> Result<Repository> {
        info!("Creating image repository {}", spec.name);
        let tags = spec
            .tags
            .iter()
            .map(|(k, v)| {
                aws_sdk_ecr::types::Tag::builder()
                    .key(k)
                    .value(v)
                    .build()
                    .map_err(|e| provider("ecr.create_repository", e))
            })
            .collect::<Result<Vec<_>>>()?;

        let resp = self
            .ecr
            .create_repository()
            .repository_name(&spec.name)
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(|e| provider("ecr.create_repository", e))?;

        let repository = resp
            .repository()
            .ok_or_else(|| provider("ecr.create_repository", "no repository returned"))?;
        Ok(Repository {
            name: repository.repository_name().unwrap_or_default().to_string(),
            uri: repository.repository_uri().map(|u| u.to_string()),
            tags: spec.tags,
        })
    }

    async fn destroy(&self, name: &str) -> Result<()> {
        info!("Deleting image repository {}", name);
        self.ecr
            .delete_repository()
            .repository_name(name)
            .force(true)
            .send()
            .await
            .map_err(|e| provider("ecr.delete_repository", e))?;
        Ok(())
    }
}

#[async_trait]
impl Parameters for AwsProvider {
    async fn describe(&self, name: &str) -> Result<Option<Parameter>> {
        match self
            .ssm
            .get_parameter()
            .name(name)
            .with_decryption(true)
            .send()
            .await
        {
            Ok(resp) => Ok(resp.parameter().map(|p| Parameter {
                name: p.name().unwrap_or_default().to_string(),
                value: p.value().unwrap_or_default().to_string(),
            })),
            Err(err) => {
                let err = err.into_service_error();
                if err.is_parameter_not_found() {
                    Ok(None)
                } else {
                    Err(provider("ssm.get_parameter", err))
                }
            }
        }
    }

    async fn create(&self, spec: ParameterSpec) -> Result<Parameter> {
        debug!("Writing parameter {}", spec.name);
        let parameter_type = if spec.secret {
            ParameterType::SecureString
        } else {
            ParameterType::String
        };
        self.ssm
            .put_parameter()
            .name(&spec.name)
            .value(&spec.value)
            .r#type(parameter_type)
            .overwrite(true)
            .send()
            .await
            .map_err(|e| provider("ssm.put_parameter", e))?;

        Ok(Parameter {
            name: spec.name,
            value: spec.value,
        })
    }

    async fn destroy(&self, name: &str) -> Result<()> {
        debug!("Deleting parameter {}", name);
        self.ssm
            .delete_parameter()
            .name(name)
            .send()
            .await
            .map_err(|e| provider("ssm.delete_parameter", e))?;
        Ok(())
    }
}

impl CloudProvider for AwsProvider {
    fn networks(&self) -> &dyn Networks {
        self
    }
    fn subnets(&self) -> &dyn Subnets {
        self
    }
    fn firewalls(&self) -> &dyn Firewalls {
        self
    }
    fn instances(&self) -> &dyn Instances {
        self
    }
    fn clusters(&self) -> &dyn Clusters {
        self
    }
    fn services(&self) -> &dyn Services {
        self
    }
    fn dns(&self) -> &dyn DnsRecords {
        self
    }
    fn load_balancers(&self) -> &dyn LoadBalancers {
        self
    }
    fn identities(&self) -> &dyn Identities {
        self
    }
    fn repositories(&self) -> &dyn Repositories {
        self
    }
    fn parameters(&self) -> &dyn Parameters {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_state() {
        assert_eq!(
            AwsProvider::map_state(&InstanceStateName::Running),
            InstanceState::Running
        );
        assert_eq!(
            AwsProvider::map_state(&InstanceStateName::ShuttingDown),
            InstanceState::Terminating
        );
        assert_eq!(
            AwsProvider::map_state(&InstanceStateName::Terminated),
            InstanceState::Terminated
        );
    }

    #[test]
    fn test_ec2_filters_from_tag_filter() {
        let filter = TagFilter::new().with("berth", "managed").with("pid", "demo");
        let filters = AwsProvider::ec2_filters(&filter);
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0].name(), Some("tag:berth"));
    }

    #[test]
    fn test_task_resources_defaults_and_floor() {
        let mut spec = ServiceSpec {
            name: "web".to_string(),
            cluster: "c".to_string(),
            image: "nginx".to_string(),
            container_port: 80,
            env: HashMap::new(),
            cpu: None,
            memory: None,
            desired_count: 1,
            tags: HashMap::new(),
        };
        assert_eq!(AwsProvider::task_resources(&spec), (256, 512));

        spec.cpu = Some(0.05);
        spec.memory = Some(0.05);
        assert_eq!(AwsProvider::task_resources(&spec), (128, 128));
    }

    #[test]
    fn test_fqdn() {
        assert_eq!(AwsProvider::fqdn("a.example.com"), "a.example.com.");
        assert_eq!(AwsProvider::fqdn("a.example.com."), "a.example.com.");
    }
}

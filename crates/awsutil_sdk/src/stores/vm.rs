use aws_sdk_ec2::types::{InstanceType, ResourceType, Tag, TagSpecification};
use serde::Serialize;

/// Parameters for launching one or more instances.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub image_id: String,
    pub instance_type: String,
    pub min_count: i32,
    pub max_count: i32,
    pub key_name: Option<String>,
    pub security_group_ids: Vec<String>,
    pub subnet_id: Option<String>,
    pub name_tag: Option<String>,
}

impl LaunchSpec {
    /// Single `t2.micro` instance from the given image; callers override the
    /// fields they care about.
    pub fn new(image_id: impl Into<String>) -> Self {
        Self {
            image_id: image_id.into(),
            instance_type: "t2.micro".to_string(),
            min_count: 1,
            max_count: 1,
            key_name: None,
            security_group_ids: Vec::new(),
            subnet_id: None,
            name_tag: None,
        }
    }
}

/// One listed instance, flattened to the fields callers report on.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct InstanceSummary {
    pub instance_id: String,
    pub state: Option<String>,
    pub instance_type: Option<String>,
    pub image_id: Option<String>,
    pub public_ip: Option<String>,
    pub private_ip: Option<String>,
    pub name: Option<String>,
}

/// High-level virtual-machine operations over one owned EC2 client.
#[derive(Debug, Clone)]
pub struct InstanceFleet {
    client: aws_sdk_ec2::Client,
}

impl InstanceFleet {
    pub fn new(client: aws_sdk_ec2::Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &aws_sdk_ec2::Client {
        &self.client
    }

    /// Launch instances per the spec and return their ids.
    pub async fn launch(&self, spec: &LaunchSpec) -> Result<Vec<String>, String> {
        let mut request = self
            .client
            .run_instances()
            .image_id(&spec.image_id)
            .instance_type(InstanceType::from(spec.instance_type.as_str()))
            .min_count(spec.min_count)
            .max_count(spec.max_count);

        if let Some(key_name) = &spec.key_name {
            request = request.key_name(key_name);
        }
        for group_id in &spec.security_group_ids {
            request = request.security_group_ids(group_id);
        }
        if let Some(subnet_id) = &spec.subnet_id {
            request = request.subnet_id(subnet_id);
        }
        if let Some(name) = &spec.name_tag {
            request = request.tag_specifications(
                TagSpecification::builder()
                    .resource_type(ResourceType::Instance)
                    .tags(Tag::builder().key("Name").value(name).build())
                    .build(),
            );
        }

        let response = request
            .send()
            .await
            .map_err(|error| format!("failed to launch instances: {error}"))?;

        Ok(response
            .instances()
            .iter()
            .filter_map(|instance| instance.instance_id().map(str::to_string))
            .collect())
    }

    /// Flattened view of every instance visible to the account.
    pub async fn list(&self) -> Result<Vec<InstanceSummary>, String> {
        let response = self
            .client
            .describe_instances()
            .send()
            .await
            .map_err(|error| format!("failed to describe instances: {error}"))?;

        let mut summaries = Vec::new();
        for reservation in response.reservations() {
            for instance in reservation.instances() {
                let Some(instance_id) = instance.instance_id() else {
                    continue;
                };
                summaries.push(InstanceSummary {
                    instance_id: instance_id.to_string(),
                    state: instance
                        .state()
                        .and_then(|state| state.name())
                        .map(|name| name.as_str().to_string()),
                    instance_type: instance
                        .instance_type()
                        .map(|kind| kind.as_str().to_string()),
                    image_id: instance.image_id().map(str::to_string),
                    public_ip: instance.public_ip_address().map(str::to_string),
                    private_ip: instance.private_ip_address().map(str::to_string),
                    name: instance
                        .tags()
                        .iter()
                        .find(|tag| tag.key() == Some("Name"))
                        .and_then(|tag| tag.value())
                        .map(str::to_string),
                });
            }
        }
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_spec_defaults_to_one_micro_instance() {
        let spec = LaunchSpec::new("ami-0123456789abcdef0");

        assert_eq!(spec.image_id, "ami-0123456789abcdef0");
        assert_eq!(spec.instance_type, "t2.micro");
        assert_eq!((spec.min_count, spec.max_count), (1, 1));
        assert!(spec.key_name.is_none());
        assert!(spec.security_group_ids.is_empty());
    }
}

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use aws_sdk_lambda::error::ProvideErrorMetadata;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::{Environment, FunctionCode, Runtime, State};
use serde_json::{json, Value};

const BASIC_EXECUTION_POLICY_ARN: &str =
    "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole";

const ROLE_PROPAGATION_ATTEMPTS: usize = 10;
const ROLE_PROPAGATION_POLL: Duration = Duration::from_secs(2);
const CREATE_FUNCTION_ATTEMPTS: usize = 5;
const CREATE_FUNCTION_RETRY_DELAY: Duration = Duration::from_secs(3);
const FUNCTION_ACTIVE_ATTEMPTS: usize = 30;
const FUNCTION_ACTIVE_POLL: Duration = Duration::from_secs(2);

/// Everything needed to create or update one function.
#[derive(Debug, Clone)]
pub struct FunctionSpec {
    pub function_name: String,
    pub handler: String,
    pub runtime: String,
    pub role_arn: String,
    pub zip_archive: Vec<u8>,
    pub timeout_seconds: i32,
    pub memory_megabytes: i32,
    pub environment: BTreeMap<String, String>,
}

impl FunctionSpec {
    /// Spec with the custom-runtime defaults; callers override fields as
    /// needed.
    pub fn new(
        function_name: impl Into<String>,
        handler: impl Into<String>,
        role_arn: impl Into<String>,
        zip_archive: Vec<u8>,
    ) -> Self {
        Self {
            function_name: function_name.into(),
            handler: handler.into(),
            runtime: "provided.al2023".to_string(),
            role_arn: role_arn.into(),
            zip_archive,
            timeout_seconds: 300,
            memory_megabytes: 128,
            environment: BTreeMap::new(),
        }
    }
}

/// Deploys functions and manages their execution roles.
///
/// Owns its own function and identity clients; constructed by the handle
/// factory with no configuration beyond the ambient SDK config.
#[derive(Debug, Clone)]
pub struct FunctionDeployer {
    lambda_client: aws_sdk_lambda::Client,
    iam_client: aws_sdk_iam::Client,
}

impl FunctionDeployer {
    pub fn new(lambda_client: aws_sdk_lambda::Client, iam_client: aws_sdk_iam::Client) -> Self {
        Self {
            lambda_client,
            iam_client,
        }
    }

    pub fn lambda_client(&self) -> &aws_sdk_lambda::Client {
        &self.lambda_client
    }

    pub fn iam_client(&self) -> &aws_sdk_iam::Client {
        &self.iam_client
    }

    /// Return the ARN of `role_name`, creating the role with the standard
    /// Lambda trust policy when it does not exist. Newly created roles get
    /// the basic execution policy plus any `additional_policy_arns`, and the
    /// call waits for IAM propagation before returning.
    pub async fn ensure_execution_role(
        &self,
        role_name: &str,
        additional_policy_arns: &[String],
    ) -> Result<String, String> {
        match self.iam_client.get_role().role_name(role_name).send().await {
            Ok(response) => {
                let arn = response
                    .role()
                    .map(|role| role.arn().to_string())
                    .ok_or_else(|| format!("role {role_name} has no ARN in response"))?;
                Ok(arn)
            }
            Err(error) => {
                let missing = error
                    .as_service_error()
                    .map(|service| service.is_no_such_entity_exception())
                    .unwrap_or(false);
                if !missing {
                    return Err(format!("failed to look up role {role_name}: {error}"));
                }
                self.create_execution_role(role_name, additional_policy_arns)
                    .await
            }
        }
    }

    async fn create_execution_role(
        &self,
        role_name: &str,
        additional_policy_arns: &[String],
    ) -> Result<String, String> {
        let response = self
            .iam_client
            .create_role()
            .role_name(role_name)
            .assume_role_policy_document(lambda_trust_policy().to_string())
            .description("Execution role for Lambda functions")
            .send()
            .await
            .map_err(|error| format!("failed to create role {role_name}: {error}"))?;

        let arn = response
            .role()
            .map(|role| role.arn().to_string())
            .ok_or_else(|| format!("created role {role_name} has no ARN in response"))?;

        self.attach_policy(role_name, BASIC_EXECUTION_POLICY_ARN)
            .await?;
        for policy_arn in additional_policy_arns {
            self.attach_policy(role_name, policy_arn).await?;
        }

        log_deploy_event(
            "role_created",
            json!({
                "role_name": role_name,
                "attached_policies": additional_policy_arns.len() + 1,
            }),
        );

        self.wait_for_role_propagation(role_name).await?;
        Ok(arn)
    }

    async fn attach_policy(&self, role_name: &str, policy_arn: &str) -> Result<(), String> {
        self.iam_client
            .attach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map(|_| ())
            .map_err(|error| {
                format!("failed to attach policy {policy_arn} to {role_name}: {error}")
            })
    }

    async fn wait_for_role_propagation(&self, role_name: &str) -> Result<(), String> {
        let mut last_error = String::new();
        for _ in 0..ROLE_PROPAGATION_ATTEMPTS {
            match self.iam_client.get_role().role_name(role_name).send().await {
                Ok(_) => {
                    tokio::time::sleep(ROLE_PROPAGATION_POLL).await;
                    return Ok(());
                }
                Err(error) => last_error = error.to_string(),
            }
            tokio::time::sleep(ROLE_PROPAGATION_POLL).await;
        }
        Err(format!(
            "role {role_name} did not propagate within {ROLE_PROPAGATION_ATTEMPTS} checks: {last_error}"
        ))
    }

    /// Create the function, or update its code and configuration when it
    /// already exists.
    pub async fn deploy_function(&self, spec: &FunctionSpec) -> Result<(), String> {
        let exists = match self
            .lambda_client
            .get_function()
            .function_name(&spec.function_name)
            .send()
            .await
        {
            Ok(_) => true,
            Err(error) => {
                let missing = error
                    .as_service_error()
                    .map(|service| service.is_resource_not_found_exception())
                    .unwrap_or(false);
                if !missing {
                    return Err(format!(
                        "failed to look up function {}: {error}",
                        spec.function_name
                    ));
                }
                false
            }
        };

        if exists {
            self.update_function(spec).await
        } else {
            self.create_function(spec).await
        }
    }

    async fn update_function(&self, spec: &FunctionSpec) -> Result<(), String> {
        self.lambda_client
            .update_function_code()
            .function_name(&spec.function_name)
            .zip_file(Blob::new(spec.zip_archive.clone()))
            .send()
            .await
            .map_err(|error| {
                format!("failed to update code for {}: {error}", spec.function_name)
            })?;

        self.lambda_client
            .update_function_configuration()
            .function_name(&spec.function_name)
            .runtime(Runtime::from(spec.runtime.as_str()))
            .role(&spec.role_arn)
            .handler(&spec.handler)
            .timeout(spec.timeout_seconds)
            .memory_size(spec.memory_megabytes)
            .environment(environment(&spec.environment))
            .send()
            .await
            .map_err(|error| {
                format!(
                    "failed to update configuration for {}: {error}",
                    spec.function_name
                )
            })?;

        log_deploy_event(
            "function_updated",
            json!({ "function_name": spec.function_name }),
        );
        Ok(())
    }

    async fn create_function(&self, spec: &FunctionSpec) -> Result<(), String> {
        // A freshly created role can take a few seconds to become assumable;
        // retry the create while the service reports exactly that.
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self
                .lambda_client
                .create_function()
                .function_name(&spec.function_name)
                .runtime(Runtime::from(spec.runtime.as_str()))
                .role(&spec.role_arn)
                .handler(&spec.handler)
                .code(
                    FunctionCode::builder()
                        .zip_file(Blob::new(spec.zip_archive.clone()))
                        .build(),
                )
                .timeout(spec.timeout_seconds)
                .memory_size(spec.memory_megabytes)
                .environment(environment(&spec.environment))
                .publish(true)
                .send()
                .await;

            match result {
                Ok(_) => {
                    log_deploy_event(
                        "function_created",
                        json!({
                            "function_name": spec.function_name,
                            "attempt": attempt,
                        }),
                    );
                    return Ok(());
                }
                Err(error) => {
                    let role_not_ready = error
                        .as_service_error()
                        .map(|service| {
                            service.is_invalid_parameter_value_exception()
                                && service
                                    .message()
                                    .unwrap_or_default()
                                    .contains("cannot be assumed")
                        })
                        .unwrap_or(false);
                    if !role_not_ready || attempt >= CREATE_FUNCTION_ATTEMPTS {
                        return Err(format!(
                            "failed to create function {}: {error}",
                            spec.function_name
                        ));
                    }
                    tokio::time::sleep(CREATE_FUNCTION_RETRY_DELAY).await;
                }
            }
        }
    }

    /// Poll until the function leaves the Pending state. Errors if the
    /// service reports Failed or the bounded wait elapses.
    pub async fn wait_until_active(&self, function_name: &str) -> Result<(), String> {
        for _ in 0..FUNCTION_ACTIVE_ATTEMPTS {
            let response = self
                .lambda_client
                .get_function_configuration()
                .function_name(function_name)
                .send()
                .await
                .map_err(|error| {
                    format!("failed to read state of function {function_name}: {error}")
                })?;

            let state = response.state();
            if state == Some(&State::Active) {
                return Ok(());
            }
            if state == Some(&State::Failed) {
                let reason = response.state_reason().unwrap_or("unknown");
                return Err(format!(
                    "function {function_name} entered Failed state: {reason}"
                ));
            }
            tokio::time::sleep(FUNCTION_ACTIVE_POLL).await;
        }
        Err(format!(
            "function {function_name} did not become active within {FUNCTION_ACTIVE_ATTEMPTS} checks"
        ))
    }
}

/// Trust policy allowing the Lambda service to assume an execution role.
pub fn lambda_trust_policy() -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Effect": "Allow",
                "Principal": { "Service": "lambda.amazonaws.com" },
                "Action": "sts:AssumeRole",
            }
        ],
    })
}

fn environment(variables: &BTreeMap<String, String>) -> Environment {
    let variables: HashMap<String, String> = variables
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Environment::builder().set_variables(Some(variables)).build()
}

fn log_deploy_event(event: &str, details: Value) {
    eprintln!(
        "{}",
        json!({
            "component": "function_deployer",
            "event": event,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trust_policy_grants_assume_role_to_lambda() {
        let policy = lambda_trust_policy();

        assert_eq!(policy["Version"], "2012-10-17");
        let statement = &policy["Statement"][0];
        assert_eq!(statement["Effect"], "Allow");
        assert_eq!(statement["Principal"]["Service"], "lambda.amazonaws.com");
        assert_eq!(statement["Action"], "sts:AssumeRole");
    }

    #[test]
    fn function_spec_defaults_match_the_custom_runtime() {
        let spec = FunctionSpec::new(
            "sweep-child",
            "bootstrap",
            "arn:aws:iam::123456789012:role/sweep-child-execution-role",
            vec![0x50, 0x4b],
        );

        assert_eq!(spec.runtime, "provided.al2023");
        assert_eq!(spec.timeout_seconds, 300);
        assert_eq!(spec.memory_megabytes, 128);
        assert!(spec.environment.is_empty());
    }

    #[test]
    fn environment_carries_every_variable() {
        let mut variables = BTreeMap::new();
        variables.insert("SWEEP_RESULTS_BUCKET".to_string(), "bucket".to_string());
        variables.insert("SWEEP_RESULTS_PREFIX".to_string(), "outcomes".to_string());

        let environment = environment(&variables);
        let resolved = environment.variables().expect("variables should be set");
        assert_eq!(resolved.len(), 2);
        assert_eq!(
            resolved.get("SWEEP_RESULTS_BUCKET").map(String::as_str),
            Some("bucket")
        );
    }
}

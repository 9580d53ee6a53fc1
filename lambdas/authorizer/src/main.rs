//! FleetOps Authorizer Lambda
//!
//! API Gateway TOKEN authorizer. Verifies the bearer JWT against the
//! configured JWKS and answers with an `execute-api:Invoke` policy. Every
//! verification failure is a Deny, never an error response.

mod token;

use lambda_runtime::{run, service_fn, Error as LambdaError, LambdaEvent};
use serde::{Deserialize, Serialize};
use token::TokenVerifier;
use tracing::{info, warn};

const JWKS_JSON_ENV: &str = "JWKS_JSON";
const JWT_ISSUER_ENV: &str = "JWT_ISSUER";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizerRequest {
    #[serde(default)]
    authorization_token: Option<String>,
    method_arn: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizerResponse {
    principal_id: String,
    policy_document: PolicyDocument,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct PolicyDocument {
    #[serde(rename = "Version")]
    version: String,
    #[serde(rename = "Statement")]
    statement: Vec<Statement>,
}

#[derive(Debug, Serialize)]
struct Statement {
    #[serde(rename = "Action")]
    action: String,
    #[serde(rename = "Effect")]
    effect: String,
    #[serde(rename = "Resource")]
    resource: String,
}

async fn handler(event: LambdaEvent<AuthorizerRequest>) -> Result<AuthorizerResponse, LambdaError> {
    let (request, _context) = event.into_parts();

    let jwks_json =
        std::env::var(JWKS_JSON_ENV).map_err(|_| format!("{} not set", JWKS_JSON_ENV))?;
    let issuer =
        std::env::var(JWT_ISSUER_ENV).map_err(|_| format!("{} not set", JWT_ISSUER_ENV))?;
    let verifier = TokenVerifier::from_jwks_json(&jwks_json, issuer)?;

    let Some(token) = request
        .authorization_token
        .as_deref()
        .map(|t| t.trim_start_matches("Bearer ").to_string())
    else {
        warn!("No authorization token presented");
        return Ok(policy("user", "Deny", &request.method_arn, None));
    };

    match verifier.verify(&token) {
        Ok(claims) => {
            info!(sub = %claims.sub, "Token verified");
            let context = claims
                .scope
                .map(|scope| serde_json::json!({ "scope": scope }));
            Ok(policy(&claims.sub, "Allow", &request.method_arn, context))
        }
        Err(e) => {
            warn!(error = %e, "Token verification failed");
            Ok(policy("user", "Deny", &request.method_arn, None))
        }
    }
}

fn policy(
    principal_id: &str,
    effect: &str,
    resource: &str,
    context: Option<serde_json::Value>,
) -> AuthorizerResponse {
    AuthorizerResponse {
        principal_id: principal_id.to_string(),
        policy_document: PolicyDocument {
            version: "2012-10-17".to_string(),
            statement: vec![Statement {
                action: "execute-api:Invoke".to_string(),
                effect: effect.to_string(),
                resource: resource.to_string(),
            }],
        },
        context,
    }
}

#[tokio::main]
async fn main() -> Result<(), LambdaError> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    run(service_fn(handler)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_policy_shape() {
        let response = policy(
            "user-1",
            "Allow",
            "arn:aws:execute-api:us-west-2:123:api/prod/GET/patches",
            Some(serde_json::json!({ "scope": "fleet/read" })),
        );
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["principalId"], "user-1");
        assert_eq!(json["policyDocument"]["Version"], "2012-10-17");
        let statement = &json["policyDocument"]["Statement"][0];
        assert_eq!(statement["Action"], "execute-api:Invoke");
        assert_eq!(statement["Effect"], "Allow");
        assert_eq!(
            statement["Resource"],
            "arn:aws:execute-api:us-west-2:123:api/prod/GET/patches"
        );
        assert_eq!(json["context"]["scope"], "fleet/read");
    }

    #[test]
    fn test_deny_policy_has_no_context() {
        let response = policy("user", "Deny", "arn:aws:execute-api:*", None);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["policyDocument"]["Statement"][0]["Effect"], "Deny");
        assert!(json.get("context").is_none());
    }
}

//! Registration pipeline: validate the payload, verify the signed card,
//! then atomically replace the agent's capability set across both stores.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use uuid::Uuid;

use crate::card::{self, Card};
use crate::db::tables::agents::NewAgent;
use crate::error::ApiError;
use crate::models::{CapabilityInput, RegisterRequest};
use crate::vector::PointPayload;

use super::Registry;

const MAX_CAPABILITIES: usize = 25;
const MAX_DESCRIPTION_CHARS: usize = 500;
const MAX_TAGS: usize = 10;
const MAX_TAG_CHARS: usize = 64;

static WALLET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").unwrap());

/// A capability normalized for persistence.
#[derive(Debug, Clone)]
pub(crate) struct NormalizedCapability {
    pub capability_id: String,
    pub description: String,
    pub tags: Vec<String>,
    pub output_schema: Option<Value>,
}

impl Registry {
    /// Returns the number of capabilities registered.
    ///
    /// Idempotent by did: a retry after a mid-write failure re-runs the
    /// whole replacement and converges.
    pub async fn register(&self, request: RegisterRequest) -> Result<usize, ApiError> {
        let capabilities = validate_capabilities(&request.capabilities)?;
        let wallet_address = validate_wallet(request.wallet_address.as_deref())?;

        if request.card.is_some() != request.card_signature.is_some() {
            return Err(ApiError::BadRequest(
                "card and card_signature must both be present or both be absent".to_string(),
            ));
        }

        let (endpoint, public_key) = match (&request.card, &request.card_signature) {
            (Some(card_obj), Some(signature)) => {
                let endpoint = check_card(&request, card_obj, signature, &capabilities)?;
                (endpoint, Some(card_obj.public_key.clone()))
            }
            _ => {
                let endpoint = card::normalize_endpoint(request.endpoint.as_deref())
                    .ok_or_else(|| ApiError::BadRequest("endpoint is required".to_string()))?;
                (endpoint, None)
            }
        };

        let agent = NewAgent {
            did: request.did.clone(),
            name: request.name.clone(),
            endpoint,
            public_key,
            wallet_address,
            card_version: request.card.as_ref().map(|c| c.version),
            card_lineage: request.card.as_ref().and_then(|c| c.lineage.clone()),
            card_signature: request.card_signature.clone(),
            card_raw: request
                .card
                .as_ref()
                .and_then(|c| serde_json::to_value(c).ok()),
        };

        // Replacement is atomic from the client's view: both stores are
        // emptied of the agent's capabilities before the first new row
        self.db.upsert_agent(&agent).await?;
        self.db.delete_capabilities(&request.did).await?;
        self.vector
            .delete_by_agent(&request.did)
            .await
            .map_err(|e| ApiError::internal("Vector index error", e))?;

        for cap in &capabilities {
            let input = Self::embedding_input(
                &cap.capability_id,
                &cap.description,
                cap.output_schema.as_ref(),
                &cap.tags,
            );
            let vector = self.embedder.embed(&input).await;
            let tags_value = Value::from(cap.tags.clone());
            let payload = PointPayload {
                agent_did: request.did.clone(),
                capability_id: cap.capability_id.clone(),
                description: cap.description.clone(),
                tags: tags_value.clone(),
            };

            // Vector point before the row: a crash here leaves an orphan
            // point that the next register's delete_by_agent removes
            self.vector
                .upsert_point(&Uuid::new_v4().to_string(), &vector, &payload)
                .await
                .map_err(|e| ApiError::internal("Vector index error", e))?;
            self.db
                .insert_capability(
                    &request.did,
                    &cap.capability_id,
                    &cap.description,
                    &tags_value,
                    cap.output_schema.as_ref(),
                )
                .await?;
        }

        log::info!(
            "Registered agent {} with {} capabilities",
            request.did,
            capabilities.len()
        );
        Ok(capabilities.len())
    }
}

fn validate_capabilities(
    inputs: &[CapabilityInput],
) -> Result<Vec<NormalizedCapability>, ApiError> {
    let mut problems = Vec::new();

    if inputs.is_empty() {
        problems.push("capabilities: at least 1 entry required".to_string());
    }
    if inputs.len() > MAX_CAPABILITIES {
        problems.push(format!("capabilities: at most {} entries", MAX_CAPABILITIES));
    }

    let mut normalized = Vec::with_capacity(inputs.len());
    for (index, input) in inputs.iter().enumerate() {
        let description_chars = input.description.chars().count();
        if description_chars == 0 || description_chars > MAX_DESCRIPTION_CHARS {
            problems.push(format!(
                "capabilities[{}].description: length must be 1..{}",
                index, MAX_DESCRIPTION_CHARS
            ));
        }

        let tags = input.tags.clone().unwrap_or_default();
        if tags.len() > MAX_TAGS {
            problems.push(format!(
                "capabilities[{}].tags: at most {} entries",
                index, MAX_TAGS
            ));
        }
        if tags.iter().any(|tag| tag.chars().count() > MAX_TAG_CHARS) {
            problems.push(format!(
                "capabilities[{}].tags: each tag at most {} characters",
                index, MAX_TAG_CHARS
            ));
        }

        normalized.push(NormalizedCapability {
            capability_id: input
                .capability_id
                .clone()
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            description: input.description.clone(),
            tags,
            output_schema: input.output_schema.clone(),
        });
    }

    let mut ids = HashSet::new();
    for cap in &normalized {
        if !ids.insert(cap.capability_id.as_str()) {
            problems.push(format!("capabilities: duplicate id '{}'", cap.capability_id));
        }
    }

    if problems.is_empty() {
        Ok(normalized)
    } else {
        Err(ApiError::Validation(problems))
    }
}

fn validate_wallet(wallet: Option<&str>) -> Result<Option<String>, ApiError> {
    match wallet {
        None => Ok(None),
        Some(address) if WALLET_RE.is_match(address) => Ok(Some(address.to_lowercase())),
        Some(_) => Err(ApiError::Validation(vec![
            "walletAddress: must match ^0x[0-9a-fA-F]{40}$".to_string(),
        ])),
    }
}

/// Run the card-side checks and resolve the endpoint to persist.
fn check_card(
    request: &RegisterRequest,
    card_obj: &Card,
    signature: &str,
    capabilities: &[NormalizedCapability],
) -> Result<String, ApiError> {
    let body_endpoint = request.endpoint.as_deref().filter(|e| !e.is_empty());
    let endpoint = card::normalize_endpoint(body_endpoint.or(Some(card_obj.endpoint.as_str())))
        .ok_or_else(|| ApiError::BadRequest("endpoint is required".to_string()))?;

    if card_obj.did != request.did {
        return Err(ApiError::BadRequest(
            "card.did does not match did".to_string(),
        ));
    }
    if card::normalize_endpoint(Some(&card_obj.endpoint)).as_deref() != Some(endpoint.as_str()) {
        return Err(ApiError::BadRequest(
            "card.endpoint does not match endpoint".to_string(),
        ));
    }
    if !card::verify(card_obj, signature) {
        return Err(ApiError::Unauthorized(
            "Invalid card signature".to_string(),
        ));
    }

    let declared: HashSet<&str> = card_obj.capabilities.iter().map(|c| c.id.as_str()).collect();
    for cap in capabilities {
        if !declared.contains(cap.capability_id.as_str()) {
            return Err(ApiError::BadRequest(format!(
                "capability '{}' is not declared in the card",
                cap.capability_id
            )));
        }
    }

    Ok(endpoint)
}

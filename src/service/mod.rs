use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{Identity, Operation, Payload, Verdict};
use crate::observability::MetricsRegistry;
use crate::rules::{evaluate, EvalLimits};
use crate::storage::{BufferStatus, RuleSetRef, RuleSetStore, StoreError};
use crate::wire::{Instruction, WireError};

/// Errors from the service layer.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Result of a validation request.
#[derive(Debug, Clone, Serialize)]
pub struct Validation {
    pub request_id: Uuid,
    pub name: String,
    pub version: u32,
    pub operation: Operation,
    #[serde(flatten)]
    pub verdict: Verdict,
}

/// Result of applying a wire instruction.
#[derive(Debug, Clone)]
pub enum Outcome {
    Written(BufferStatus),
    Committed { version: u32 },
    Validated(Validation),
}

/// The externally callable entry point: composes the store and the
/// evaluator. Committed snapshots are resolved per request, so partially
/// staged buffer state is never observable here.
pub struct ValidationService {
    store: Arc<dyn RuleSetStore>,
    limits: EvalLimits,
    metrics: Arc<MetricsRegistry>,
}

impl ValidationService {
    pub fn new(
        store: Arc<dyn RuleSetStore>,
        limits: EvalLimits,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        ValidationService {
            store,
            limits,
            metrics,
        }
    }

    /// Resolve the rule set (latest version if unspecified) and evaluate.
    ///
    /// A missing rule set is a resource error; a missing root for the
    /// operation is the fail-closed "no rule configured" denial.
    pub async fn validate(
        &self,
        creator: Identity,
        name: &str,
        version: Option<u32>,
        operation: Operation,
        payload: &Payload,
    ) -> Result<Validation, ServiceError> {
        let start = Instant::now();
        let reference = RuleSetRef::new(creator, name);

        let revision = self.store.get(&reference, version).await?;
        let verdict = evaluate(
            &revision.rule_set,
            operation,
            payload,
            Utc::now(),
            self.limits,
        );

        self.metrics.record_validation(&verdict);
        self.metrics.record_latency(start);

        if let Some(reason) = verdict.reason.as_ref().filter(|d| d.kind.is_fault()) {
            warn!(
                reference = %reference,
                version = revision.version,
                operation = %operation,
                reason = %reason,
                "Validation fault: rule set is misconfigured"
            );
        }

        info!(
            reference = %reference,
            version = revision.version,
            operation = %operation,
            allowed = verdict.allowed,
            rules_evaluated = verdict.rules_evaluated,
            latency_ms = start.elapsed().as_millis() as u64,
            "Validation completed"
        );

        Ok(Validation {
            request_id: Uuid::new_v4(),
            name: name.to_string(),
            version: revision.version,
            operation,
            verdict,
        })
    }

    /// Dispatch a decoded wire instruction against `target`.
    pub async fn apply(
        &self,
        authority: &Identity,
        target: &RuleSetRef,
        instruction: Instruction,
    ) -> Result<Outcome, ServiceError> {
        match instruction {
            Instruction::WriteToBuffer(args) => {
                let status = self
                    .store
                    .write_chunk(authority, target, args.offset, &args.data)
                    .await?;
                self.metrics.record_buffer_write(args.data.len());
                Ok(Outcome::Written(status))
            }
            Instruction::Commit(args) => {
                let result = self
                    .store
                    .commit(authority, target, &args.serialized_rule_set)
                    .await;
                self.metrics.record_commit(result.is_ok());
                Ok(Outcome::Committed { version: result? })
            }
            Instruction::Validate(args) => {
                let validation = self
                    .validate(
                        target.creator,
                        &args.name,
                        None,
                        args.operation,
                        &args.payload,
                    )
                    .await?;
                Ok(Outcome::Validated(validation))
            }
        }
    }

    /// Decode raw instruction bytes, then apply.
    pub async fn apply_bytes(
        &self,
        authority: &Identity,
        target: &RuleSetRef,
        bytes: &[u8],
    ) -> Result<Outcome, ServiceError> {
        let instruction = Instruction::decode(bytes)?;
        self.apply(authority, target, instruction).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DenialKind, PayloadKey, PayloadValue, RuleSet};
    use crate::rules::{CompareOp, Rule};
    use crate::storage::MemoryStore;
    use crate::wire::{CommitArgs, ValidateArgs, WriteToBufferArgs};

    fn creator() -> Identity {
        Identity::new([1u8; 32])
    }

    fn service() -> ValidationService {
        ValidationService::new(
            Arc::new(MemoryStore::new()),
            EvalLimits::default(),
            Arc::new(MetricsRegistry::new()),
        )
    }

    fn sample_rule_set() -> RuleSet {
        let mut rule_set = RuleSet::new("transfer-policy", creator());
        rule_set.add(
            Operation::Transfer,
            Rule::Amount {
                field: PayloadKey::AMOUNT,
                operator: CompareOp::LtEq,
                amount: 1000,
            },
        );
        rule_set
    }

    async fn commit_sample(service: &ValidationService) {
        let target = RuleSetRef::new(creator(), "transfer-policy");
        service
            .apply(
                &creator(),
                &target,
                Instruction::Commit(CommitArgs {
                    serialized_rule_set: sample_rule_set().to_bytes().unwrap(),
                }),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_validate_allows_and_denies() {
        let service = service();
        commit_sample(&service).await;

        let payload = Payload::new().with(PayloadKey::AMOUNT, PayloadValue::Number(500));
        let validation = service
            .validate(creator(), "transfer-policy", None, Operation::Transfer, &payload)
            .await
            .unwrap();
        assert!(validation.verdict.allowed);
        assert_eq!(validation.version, 1);

        let payload = Payload::new().with(PayloadKey::AMOUNT, PayloadValue::Number(2000));
        let validation = service
            .validate(creator(), "transfer-policy", None, Operation::Transfer, &payload)
            .await
            .unwrap();
        assert!(!validation.verdict.allowed);
    }

    #[tokio::test]
    async fn test_validate_unconfigured_operation_denies() {
        let service = service();
        commit_sample(&service).await;

        let validation = service
            .validate(
                creator(),
                "transfer-policy",
                None,
                Operation::Burn,
                &Payload::new(),
            )
            .await
            .unwrap();

        assert!(!validation.verdict.allowed);
        assert_eq!(
            validation.verdict.reason.unwrap().kind,
            DenialKind::NoRuleConfigured
        );
    }

    #[tokio::test]
    async fn test_validate_missing_rule_set_is_error() {
        let service = service();

        let result = service
            .validate(creator(), "absent", None, Operation::Transfer, &Payload::new())
            .await;

        assert!(matches!(
            result,
            Err(ServiceError::Store(StoreError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_apply_chunked_ingestion_then_validate() {
        let service = service();
        let target = RuleSetRef::new(creator(), "transfer-policy");
        let bytes = sample_rule_set().to_bytes().unwrap();
        let split = bytes.len() / 2;

        service
            .apply(
                &creator(),
                &target,
                Instruction::WriteToBuffer(WriteToBufferArgs {
                    offset: 0,
                    data: bytes[..split].to_vec(),
                }),
            )
            .await
            .unwrap();
        service
            .apply(
                &creator(),
                &target,
                Instruction::WriteToBuffer(WriteToBufferArgs {
                    offset: split as u64,
                    data: bytes[split..].to_vec(),
                }),
            )
            .await
            .unwrap();

        // The staged buffer is not validatable state.
        assert!(service
            .validate(creator(), "transfer-policy", None, Operation::Transfer, &Payload::new())
            .await
            .is_err());

        service.store.finalize(&creator(), &target).await.unwrap();

        let outcome = service
            .apply(
                &creator(),
                &target,
                Instruction::Validate(ValidateArgs {
                    name: "transfer-policy".to_string(),
                    operation: Operation::Transfer,
                    payload: Payload::new().with(PayloadKey::AMOUNT, PayloadValue::Number(1)),
                }),
            )
            .await
            .unwrap();

        match outcome {
            Outcome::Validated(validation) => assert!(validation.verdict.allowed),
            other => panic!("expected Validated, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_apply_bytes_rejects_malformed_instruction() {
        let service = service();
        let target = RuleSetRef::new(creator(), "transfer-policy");

        let result = service.apply_bytes(&creator(), &target, &[99]).await;
        assert!(matches!(result, Err(ServiceError::Wire(_))));
    }

    #[tokio::test]
    async fn test_apply_bytes_round_trip() {
        let service = service();
        let target = RuleSetRef::new(creator(), "transfer-policy");

        let commit = Instruction::Commit(CommitArgs {
            serialized_rule_set: sample_rule_set().to_bytes().unwrap(),
        });
        let outcome = service
            .apply_bytes(&creator(), &target, &commit.encode())
            .await
            .unwrap();

        assert!(matches!(outcome, Outcome::Committed { version: 1 }));
    }
}

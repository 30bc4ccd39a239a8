//! Tool-call interception and approval.
//!
//! Each intent moves through
//! `Detected -> AwaitingApproval -> Approved -> Executing -> Completed`, or
//! ends `Cancelled`. Every intent yields exactly one [`ToolResult`], whatever
//! path it takes. Calls in a batch are processed one at a time, in the order
//! the model emitted them.

use std::collections::HashSet;
use std::fmt;

use tokio_util::sync::CancellationToken;

use crate::approval::{ApprovalGate, ApprovalPolicy, ApprovalPreset, ApprovalRequest};
use crate::tools::{self, ToolContext, ToolRegistry};
use crate::types::{ToolCallIntent, ToolResult};

pub const UNKNOWN_TOOL: &str = "unknown tool";
pub const CANCELLED_BY_USER: &str = "cancelled by user";
pub const DENIED_BY_POLICY: &str = "denied by policy";
pub const DUPLICATE_CALL: &str = "duplicate call id";
pub const REQUEST_ABORTED: &str = "request aborted before this call ran";

/// Where a tool call is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolCallState {
    Detected,
    AwaitingApproval,
    Approved,
    Executing,
    Completed,
    Cancelled,
}

impl fmt::Display for ToolCallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Detected => "detected",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Approved => "approved",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// A processed call and the state it ended in.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedCall {
    pub result: ToolResult,
    pub state: ToolCallState,
}

/// Results of one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    /// One entry per intent, in received order.
    pub calls: Vec<ProcessedCall>,
    /// The request was cancelled while the batch ran.
    pub aborted: bool,
}

impl BatchOutcome {
    #[must_use]
    pub fn results(&self) -> Vec<ToolResult> {
        self.calls.iter().map(|c| c.result.clone()).collect()
    }
}

/// Request-level facts every call in a batch shares.
#[derive(Debug, Clone)]
pub struct BatchContext {
    pub model: String,
    pub target: String,
    pub cancel: CancellationToken,
    /// Tool names offered to the model in this request.
    pub offered: HashSet<String>,
}

/// Drives tool calls through approval and execution.
pub struct ToolCycle<'a> {
    tools: &'a ToolRegistry,
    gate: &'a dyn ApprovalGate,
    policy: &'a ApprovalPolicy,
}

impl fmt::Debug for ToolCycle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolCycle")
            .field("tools", self.tools)
            .field("policy", self.policy)
            .finish_non_exhaustive()
    }
}

enum Step {
    Done(ProcessedCall),
    Aborted(ProcessedCall),
}

impl<'a> ToolCycle<'a> {
    #[must_use]
    pub const fn new(
        tools: &'a ToolRegistry,
        gate: &'a dyn ApprovalGate,
        policy: &'a ApprovalPolicy,
    ) -> Self {
        Self {
            tools,
            gate,
            policy,
        }
    }

    /// Process every intent in order.
    ///
    /// Once the cancellation token fires, the current call ends cancelled and
    /// the remaining calls get failure results without running.
    pub async fn process_batch(&self, calls: &[ToolCallIntent], ctx: &BatchContext) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let mut seen = HashSet::new();

        for intent in calls {
            if outcome.aborted || ctx.cancel.is_cancelled() {
                outcome.aborted = true;
                outcome.calls.push(ProcessedCall {
                    result: ToolResult::failure(intent, REQUEST_ABORTED),
                    state: ToolCallState::Cancelled,
                });
                continue;
            }

            if !seen.insert(intent.call_id.clone()) {
                tracing::warn!(call_id = %intent.call_id, "duplicate tool call id in batch");
                outcome.calls.push(ProcessedCall {
                    result: ToolResult::failure(intent, DUPLICATE_CALL),
                    state: ToolCallState::Completed,
                });
                continue;
            }

            match self.process_call(intent, ctx).await {
                Step::Done(call) => outcome.calls.push(call),
                Step::Aborted(call) => {
                    outcome.aborted = true;
                    outcome.calls.push(call);
                }
            }
        }

        outcome
    }

    async fn process_call(&self, intent: &ToolCallIntent, ctx: &BatchContext) -> Step {
        let mut state = ToolCallState::Detected;
        let mut advance = |next: ToolCallState| {
            tracing::debug!(call_id = %intent.call_id, tool = %intent.tool_name, from = %state, to = %next, "tool call transition");
            state = next;
            next
        };

        let handler = Some(&intent.tool_name)
            .filter(|name| ctx.offered.contains(*name))
            .and_then(|name| self.tools.get(name));
        let Some(handler) = handler else {
            tracing::warn!(tool = %intent.tool_name, "model requested a tool it was not offered");
            return Step::Done(ProcessedCall {
                result: ToolResult::failure(intent, UNKNOWN_TOOL),
                state: advance(ToolCallState::Completed),
            });
        };

        let arguments = match self.policy.preset_for(&intent.tool_name) {
            ApprovalPreset::Deny => {
                return Step::Done(ProcessedCall {
                    result: ToolResult::failure(intent, DENIED_BY_POLICY),
                    state: advance(ToolCallState::Completed),
                });
            }
            ApprovalPreset::Allow => intent.arguments.clone(),
            ApprovalPreset::Ask => {
                advance(ToolCallState::AwaitingApproval);
                let request = ApprovalRequest {
                    call_id: intent.call_id.clone(),
                    tool_name: intent.tool_name.clone(),
                    arguments: intent.arguments.clone(),
                    model: ctx.model.clone(),
                };
                let decision = tokio::select! {
                    biased;
                    () = ctx.cancel.cancelled() => {
                        return Step::Aborted(ProcessedCall {
                            result: ToolResult::failure(intent, CANCELLED_BY_USER),
                            state: advance(ToolCallState::Cancelled),
                        });
                    }
                    decision = self.gate.present(request) => decision,
                };
                if !decision.approved {
                    tracing::info!(tool = %intent.tool_name, "tool call cancelled by user");
                    return Step::Done(ProcessedCall {
                        result: ToolResult::failure(intent, CANCELLED_BY_USER),
                        state: advance(ToolCallState::Cancelled),
                    });
                }
                decision.arguments
            }
        };

        advance(ToolCallState::Approved);
        advance(ToolCallState::Executing);
        let context = ToolContext {
            call_id: intent.call_id.clone(),
            tool_name: intent.tool_name.clone(),
            model: ctx.model.clone(),
            target: ctx.target.clone(),
            cancel: ctx.cancel.clone(),
        };

        match tools::execute(handler.as_ref(), arguments, &context).await {
            Ok(outcome) => Step::Done(ProcessedCall {
                result: ToolResult {
                    call_id: intent.call_id.clone(),
                    tool_name: intent.tool_name.clone(),
                    outcome,
                },
                state: advance(ToolCallState::Completed),
            }),
            Err(_) => Step::Aborted(ProcessedCall {
                result: ToolResult::failure(intent, CANCELLED_BY_USER),
                state: advance(ToolCallState::Cancelled),
            }),
        }
    }
}

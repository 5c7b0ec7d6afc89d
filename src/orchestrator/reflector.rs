//! 反思：对刚执行完的步骤结果做一次判断
//!
//! 回复按最先出现的关键词分类为 CONTINUE / REVISE / COMPLETE / ABORT；
//! 分类不出时用纠偏提示重试一次，仍不可分类则返回 ReflectionAmbiguous（默认按 abort 处理）。
//! 重试/退避从不藏在执行桥里——失败步骤在这里决策。

use std::sync::Arc;

use crate::core::RunError;
use crate::inference::{InferenceClient, Prompt};
use crate::orchestrator::types::ReflectionDecision;
use crate::tools::ToolInvocationResult;

/// 输出内容注入反思 prompt 时的最大字符数
const OUTCOME_PREVIEW_CHARS: usize = 400;

/// 反思输入：刚执行完的步骤，或计划已耗尽的信号
pub enum ReflectInput<'a> {
    StepOutcome {
        description: &'a str,
        tool_name: &'a str,
        result: &'a ToolInvocationResult,
    },
    PlanExhausted,
}

fn classify(output: &str) -> Option<ReflectionDecision> {
    let upper = output.to_uppercase();
    let candidates = [
        ("CONTINUE", ReflectionDecision::Continue),
        ("REVISE", ReflectionDecision::Revise),
        ("COMPLETE", ReflectionDecision::Complete),
        ("ABORT", ReflectionDecision::Abort),
    ];
    candidates
        .iter()
        .filter_map(|(kw, d)| upper.find(kw).map(|pos| (pos, *d)))
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, d)| d)
}

/// Reflector：持有推理客户端，reflect 返回四选一决策
pub struct Reflector {
    inference: Arc<dyn InferenceClient>,
}

impl Reflector {
    pub fn new(inference: Arc<dyn InferenceClient>) -> Self {
        Self { inference }
    }

    fn build_prompt(
        &self,
        goal: &str,
        input: &ReflectInput<'_>,
        remaining_pending: usize,
        corrective: Option<&str>,
    ) -> Prompt {
        let system = "You evaluate one step of an autonomous agent's plan and decide what \
                      happens next. Respond with exactly one word: CONTINUE (advance to the \
                      next planned step), REVISE (discard remaining steps and replan), \
                      COMPLETE (the goal is satisfied), or ABORT (unrecoverable)."
            .to_string();

        let outcome = match input {
            ReflectInput::StepOutcome {
                description,
                tool_name,
                result,
            } => {
                let detail = if result.success {
                    let preview: String = result
                        .output
                        .to_string()
                        .chars()
                        .take(OUTCOME_PREVIEW_CHARS)
                        .collect();
                    format!("succeeded, output: {preview}")
                } else {
                    let err = result.error.as_ref();
                    format!(
                        "failed ({}): {}",
                        err.map(|e| e.kind.to_string()).unwrap_or_default(),
                        err.map(|e| e.message.as_str()).unwrap_or("unknown"),
                    )
                };
                format!("Step \"{description}\" using tool {tool_name} {detail}")
            }
            ReflectInput::PlanExhausted => {
                "All planned steps have been executed; the plan is exhausted.".to_string()
            }
        };

        let mut text = format!(
            "Overall goal: {goal}\n\nLatest outcome: {outcome}\n\
             Remaining planned steps: {remaining_pending}\n\n\
             Decide: CONTINUE, REVISE, COMPLETE, or ABORT."
        );
        if let Some(c) = corrective {
            text.push_str("\n\n");
            text.push_str(c);
        }
        Prompt::new(system, text)
    }

    /// 做一次反思决策；引擎故障与分类失败各本地重试一次
    pub async fn reflect(
        &self,
        goal: &str,
        input: ReflectInput<'_>,
        remaining_pending: usize,
    ) -> Result<ReflectionDecision, RunError> {
        let mut corrective: Option<String> = None;
        let mut engine_retried = false;
        let mut classify_retried = false;

        loop {
            let prompt = self.build_prompt(goal, &input, remaining_pending, corrective.as_deref());
            let output = match self.inference.generate(&prompt).await {
                Ok(o) => o,
                Err(e) => {
                    if engine_retried {
                        return Err(RunError::InferenceUnavailable(e));
                    }
                    engine_retried = true;
                    tracing::warn!(error = %e, "reflection inference failed, retrying once");
                    continue;
                }
            };

            match classify(&output) {
                Some(decision) => return Ok(decision),
                None => {
                    if classify_retried {
                        return Err(RunError::ReflectionAmbiguous(
                            output.chars().take(200).collect(),
                        ));
                    }
                    classify_retried = true;
                    tracing::warn!("ambiguous reflection, re-prompting once");
                    corrective = Some(
                        "Your previous reply was ambiguous. Respond with exactly one word: \
                         CONTINUE, REVISE, COMPLETE, or ABORT."
                            .to_string(),
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::ScriptedInference;

    #[test]
    fn test_classify_single_keyword() {
        assert_eq!(classify("CONTINUE"), Some(ReflectionDecision::Continue));
        assert_eq!(classify("revise"), Some(ReflectionDecision::Revise));
        assert_eq!(
            classify("The goal is satisfied. COMPLETE."),
            Some(ReflectionDecision::Complete)
        );
        assert_eq!(classify("we must ABORT now"), Some(ReflectionDecision::Abort));
    }

    #[test]
    fn test_classify_earliest_keyword_wins() {
        assert_eq!(
            classify("REVISE the plan, do not CONTINUE"),
            Some(ReflectionDecision::Revise)
        );
    }

    #[test]
    fn test_classify_none() {
        assert_eq!(classify("hmm, not sure what to do"), None);
    }

    #[tokio::test]
    async fn test_ambiguous_then_corrected() {
        let mock = Arc::new(ScriptedInference::from_texts(vec![
            "well, it depends",
            "CONTINUE",
        ]));
        let reflector = Reflector::new(mock.clone());
        let d = reflector
            .reflect("audit files", ReflectInput::PlanExhausted, 0)
            .await
            .unwrap();
        assert_eq!(d, ReflectionDecision::Continue);
        assert!(mock.prompts()[1].text.contains("exactly one word"));
    }

    #[tokio::test]
    async fn test_ambiguous_twice_is_error() {
        let mock = Arc::new(ScriptedInference::from_texts(vec!["eh", "dunno"]));
        let reflector = Reflector::new(mock);
        let err = reflector
            .reflect("audit files", ReflectInput::PlanExhausted, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::ReflectionAmbiguous(_)));
    }
}

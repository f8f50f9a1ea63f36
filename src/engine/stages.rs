use crate::engine::llm_client::{LanguageModel, LlmError};
use crate::engine::output_parser::strip_code_fences;
use crate::engine::prompt_builder::PromptBuilder;

/// Paraphrase `sentence` into active, present-tense English the parser accepts.
pub fn rewrite(llm: &dyn LanguageModel, sentence: &str) -> Result<String, LlmError> {
    let reply = llm.complete(&PromptBuilder::rewrite(sentence))?;
    Ok(strip_code_fences(&reply))
}

/// Revise parsed logic so it reflects the tense, aspect and voice of `original`.
pub fn adjust(llm: &dyn LanguageModel, original: &str, raw_logic: &str) -> Result<String, LlmError> {
    let reply = llm.complete(&PromptBuilder::adjust(original, raw_logic))?;
    Ok(strip_code_fences(&reply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::LlmSettings;
    use crate::engine::llm_client::tests::ScriptedModel;
    use crate::engine::llm_client::ChatClient;

    const SENTENCE: &str = "The report was written by Alice after she reviewed the data.";

    #[test]
    fn rewrite_strips_fences_from_reply() {
        let llm = ScriptedModel::new(&["```text\nAlice writes the report.\n```"]);
        assert_eq!(rewrite(&llm, SENTENCE).unwrap(), "Alice writes the report.");
        assert!(llm.prompts.borrow()[0].contains(SENTENCE));
    }

    #[test]
    fn adjust_sends_original_and_logic() {
        let llm = ScriptedModel::new(&["past(write(alice, report1))."]);
        let logic = "write(alice, report1). review(alice, data1).";

        assert_eq!(
            adjust(&llm, SENTENCE, logic).unwrap(),
            "past(write(alice, report1))."
        );
        let prompts = llm.prompts.borrow();
        assert!(prompts[0].contains(SENTENCE));
        assert!(prompts[0].contains(logic));
    }

    #[test]
    fn llm_failure_propagates() {
        let llm = ScriptedModel::failing();
        assert!(matches!(
            rewrite(&llm, SENTENCE),
            Err(LlmError::Status { status: 401, .. })
        ));
    }

    #[test]
    #[ignore = "calls the hosted LLM; needs OPENAI_API_KEY"]
    fn live_rewrite_uses_active_present_verb() {
        let llm = ChatClient::from_settings(&LlmSettings::default()).unwrap();
        let rewritten = rewrite(&llm, SENTENCE).unwrap().to_lowercase();
        assert!(rewritten.contains("writes") || rewritten.contains("write"));
        assert!(!rewritten.contains("was written"));
    }

    #[test]
    #[ignore = "calls the hosted LLM; needs OPENAI_API_KEY"]
    fn live_adjust_restores_past_or_passive() {
        let llm = ChatClient::from_settings(&LlmSettings::default()).unwrap();
        let adjusted = adjust(&llm, SENTENCE, "write(alice, report1). review(alice, data1).")
            .unwrap()
            .to_lowercase();

        assert!(adjusted.contains("past") || adjusted.contains("passive"));
        assert!(adjusted.contains("write") && adjusted.contains("review"));
        assert!(adjusted.contains("alice"));
    }
}

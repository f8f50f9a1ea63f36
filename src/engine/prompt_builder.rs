/// Builds the two prompts sent to the LLM.
/// Only formats text: no networking, no parsing of replies.
pub struct PromptBuilder;

impl PromptBuilder {
    /// Paraphrase request that normalizes a sentence for the ACE grammar.
    pub fn rewrite(sentence: &str) -> String {
        let mut prompt = String::new();

        prompt.push_str(
            "Convert the following sentence into active voice, present tense, \
             declarative form, so it can be parsed by ACE controlled English.\n\n",
        );
        push_quoted(&mut prompt, "Sentence", sentence, false);
        prompt.push_str("Rewritten:");

        prompt
    }

    /// Revision request that restores tense, aspect and voice in parsed logic.
    pub fn adjust(original: &str, logic: &str) -> String {
        let mut prompt = String::new();

        prompt.push_str(
            "The following original sentence has been rewritten to ACE-compatible \
             English and parsed into logical form. Please revise the logic to reflect \
             the original sentence's tense, aspect, and voice (e.g., past tense, \
             passive voice), while preserving the structure and entities.\n\n",
        );
        push_quoted(&mut prompt, "Original sentence", original, true);
        push_block(&mut prompt, "Original ACE-based logic", logic);
        prompt.push_str("Revised logic:");

        prompt
    }
}

fn push_quoted(prompt: &mut String, label: &str, text: &str, own_line: bool) {
    prompt.push_str(label);
    prompt.push(':');
    prompt.push(if own_line { '\n' } else { ' ' });
    prompt.push('"');
    prompt.push_str(text);
    prompt.push_str("\"\n\n");
}

fn push_block(prompt: &mut String, label: &str, text: &str) {
    prompt.push_str(label);
    prompt.push_str(":\n");
    prompt.push_str(text.trim_end());
    prompt.push_str("\n\n");
}

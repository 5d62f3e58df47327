pub fn ground_truth_prompt(question: &str, context: &str) -> String {
    format!(
        r#"Write a concise ground-truth answer strictly from provided chunks. Do not add facts not in context.

Question:
{question}

Context chunks:
{context}"#
    )
}

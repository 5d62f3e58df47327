use pqb_core::difficulty::ReferenceType;

pub const COMMON_PROFILE_INSTRUCTION: &str = "You are a RAG (Retrieval-Augmented Generation) tester. \
Your task is to generate questions based strictly on the content of a provided document in order to \
evaluate retrieval performance. Do not generate questions about content found in the acknowledgements \
or references sections.";

const SYSTEM_INSTRUCTION: &str =
    "You generate benchmark questions for retrieval evaluation. Return one question only.";

const AVOID_WINDOW: usize = 5;

/// Chunk excerpts a prompt is anchored on.
#[derive(Debug, Clone, Copy)]
pub struct Seeds<'a> {
    pub seed_a: &'a str,
    pub seed_b: &'a str,
    pub near: &'a str,
}

fn profile_body(paper_id: &str, reference_type: ReferenceType, s: Seeds<'_>) -> String {
    let Seeds {
        seed_a,
        seed_b,
        near,
    } = s;
    match reference_type {
        ReferenceType::SingleSingle => format!(
            "Create a query grounded in one document only. The question should be answerable by a \
Single-hop Retrieval-Augmented Generation (RAG) system. The question should require retrieving \
information from a single, self-contained passage within the document, without cross-referencing \
multiple sections. Use this document title and passage as evidence context: '{paper_id}' and '{seed_a}'."
        ),
        ReferenceType::SingleMulti => format!(
            "Create a query grounded in one document only. The question should be answerable by a \
Multi-hop Retrieval-Augmented Generation (RAG) system. The question should require retrieving \
and combining information from multiple sections or passages within the document. \
Use this document title and these evidence contexts: '{paper_id}', '{seed_a}', and '{seed_b}'."
        ),
        ReferenceType::Multiple => format!(
            "Create a query that is best answered by retrieving evidence from multiple different documents in the corpus. \
The question should not depend on a single local passage. \
Use these evidence contexts as anchors: '{seed_a}' and '{seed_b}'."
        ),
        ReferenceType::Comparison => format!(
            "Create a comparison question that asks the system to distinguish, contrast, or weigh two related ideas. \
The question should require comparing separate pieces of evidence rather than repeating one fact. \
Use these evidence contexts: '{seed_a}' and '{seed_b}'."
        ),
        ReferenceType::Negative => format!(
            "Create a question whose correct answer is negative, absent, null, or explicitly indicates that a claim \
is unsupported by the provided evidence. The question should still be grounded in the document. \
Use this evidence context and nearby text to define the boundary of what is not stated: '{seed_a}' and '{near}'."
        ),
    }
}

pub fn profile_prompt(
    paper_id: &str,
    reference_type: ReferenceType,
    seeds: Seeds<'_>,
    feedback: &str,
    avoid: &[String],
) -> String {
    let body = profile_body(paper_id, reference_type, seeds);
    let mut prompt = format!(
        "{SYSTEM_INSTRUCTION}\n\n{COMMON_PROFILE_INSTRUCTION} {body} \
Output exactly one question only, with no explanation, no preface, and no quotation marks."
    );
    if !avoid.is_empty() {
        let start = avoid.len().saturating_sub(AVOID_WINDOW);
        let list: Vec<String> = avoid[start..].iter().map(|q| format!("- {q}")).collect();
        prompt.push_str(" Avoid duplicating or closely paraphrasing any of these existing questions:\n");
        prompt.push_str(&list.join("\n"));
    }
    if !feedback.is_empty() {
        prompt.push_str(&format!(
            " Regenerate with a clearly different angle and satisfy this feedback: {feedback}."
        ));
    }
    prompt
}

pub fn fallback_question(paper_id: &str, reference_type: ReferenceType, seeds: Seeds<'_>) -> String {
    let Seeds { seed_a, seed_b, .. } = seeds;
    match reference_type {
        ReferenceType::SingleSingle => format!("In {paper_id}, what is stated about {seed_a}?"),
        ReferenceType::SingleMulti => {
            format!("In {paper_id}, how do these two points connect: {seed_a} and {seed_b}?")
        }
        ReferenceType::Multiple => format!(
            "What conclusion requires combining evidence from multiple documents related to: {seed_a} and {seed_b}?"
        ),
        ReferenceType::Comparison => {
            format!("How do these two points compare: {seed_a} versus {seed_b}?")
        }
        ReferenceType::Negative => {
            format!("What claim is not supported by the evidence around: {seed_a}?")
        }
    }
}

pub fn empty_paper_question(multi_hop: bool) -> &'static str {
    if multi_hop {
        "How do two key ideas in this work connect to support the main claim?"
    } else {
        "What key claim is made, and what evidence supports it?"
    }
}

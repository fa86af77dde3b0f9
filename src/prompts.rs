//! System prompts for the VLM page structurer and question reader.
//!
//! Callers can override either via [`crate::config::IngestConfig`]; the
//! constants here are used only when no override is provided.

/// System prompt for extracting scoring points from a mark-scheme page.
///
/// Used when `IngestConfig::mark_scheme_prompt` is `None`.
pub const MARK_SCHEME_PROMPT: &str = r#"Extract all scoring points from the provided mark-scheme page image.

Return a JSON object of the form:

{
  "marks": [
    {
      "question_number": "12",
      "label": "(a)(i)",
      "level": "subsub",
      "mark_code": "M1",
      "mark_content": "Method to find p, e.g. divides 32000 = Ap⁴ by 50000 = Ap¹¹ → p = (50000 / 32000)^(1/7)",
      "ao_code": "3.1a",
      "explanation": "M1: Attempts to use both pieces of information within V = Ap^t and solves for p."
    }
  ],
  "explanation": ""
}

Label and level rules:
- question_number is always the outer number, e.g. "2", "11"
- label is the subpart or sub-subpart, e.g. "(a)", "(a)(i)", "(b)"
- level is one of:
  - "main" if there is no label (whole question)
  - "sub" if the label is like "(a)", "(b)"
  - "subsub" if the label is like "(a)(i)", "(b)(ii)"
- Do not merge the label into question_number.

Notes:
- Note lines below a question's mark table (text after "(n marks)") belong in
  the matching mark's "explanation". Match by label and mark_code; do not
  attach unmatched notes.
- If the page has no scoring points, return an empty "marks" array and put
  the page's note text in the top-level "explanation".

Return only JSON. Do not include markdown fences or commentary."#;

/// User-turn instruction sent alongside a mark-scheme page image.
pub const MARK_SCHEME_INSTRUCTION: &str = "Extract all mark points from this mark scheme page: question_number, label, level, mark_code, mark_content, ao_code, explanation.";

/// System prompt for extracting questions from a question-paper page.
///
/// Used when `IngestConfig::question_prompt` is `None`.
pub const QUESTION_PAPER_PROMPT: &str = r#"Extract all math exam questions from this A-level question paper page image. For each question, sub-question, sub-sub-question or structural heading (even without text or marks), return:
- question_number (e.g. "2")
- level: one of "main", "sub" or "subsub"
- label: e.g. "2", "(a)", "(i)"
- marks: number or null
- question_text (preserve line breaks; may be empty)
- latex_blocks: display-math blocks appearing in the question
- for level "subsub", a "parent_label" naming its parent sub-question, e.g. "(a)"

Example element:
{
  "question_number": "2",
  "level": "subsub",
  "label": "(i)",
  "marks": 3,
  "question_text": "Given that \\(\\theta\\) is small...",
  "latex_blocks": ["\\[ \\frac{dy}{dx} \\]"],
  "parent_label": "(a)"
}

Use LaTeX for all mathematics. Wrap inline math in \( ... \) and block math in \[ ... \].
Only wrap pure mathematical expressions; never wrap natural-language sentences.
Include each expression once, inside its delimiters; do not repeat raw LaTeX outside them.
Do not skip questions containing diagrams or graphs; extract all visible question text.
Escape every LaTeX backslash as \\ so the output is valid JSON.
Return only a raw JSON array of question objects, without markdown or explanations."#;

/// User-turn instruction sent alongside a question-paper page image.
pub const QUESTION_PAPER_INSTRUCTION: &str = "Extract every question on this page as a JSON array.";

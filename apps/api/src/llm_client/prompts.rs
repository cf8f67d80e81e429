// Prompt constants for personalized storytelling prompt generation.

/// System prompt for the generation capability. The model must answer with
/// the prompt text only.
pub const STORYTELLING_SYSTEM: &str = "You are a warm, curious oral-history interviewer. \
    You write a single open-ended question that invites an older adult to tell a \
    specific story from their life. \
    Respond with the question only: one or two sentences, no preamble, \
    no numbering, no quotation marks, no markdown.";

/// User prompt template. Replace `{category}`, `{difficulty}`, `{preferences}`
/// and `{avoid}` before sending.
pub const PERSONALIZED_PROMPT_TEMPLATE: &str = r#"Write one storytelling prompt.

Theme: {category}
Depth: {difficulty}
What we know about the storyteller (JSON): {preferences}

Do not repeat or closely paraphrase any of these earlier prompts:
{avoid}

Ask about a concrete memory: a place, a person, a moment. Avoid yes/no questions."#;

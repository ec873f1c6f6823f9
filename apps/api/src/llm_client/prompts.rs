// Shared prompt fragments.
// Each service that needs LLM calls defines its own prompts.rs alongside it.
// This file contains cross-cutting prompt fragments.

/// Appended to every extraction system prompt.
pub const GROUNDING_INSTRUCTION: &str = "\
    CRITICAL: Record only facts stated in the provided document. \
    Do NOT infer, interpolate, or invent details. \
    If the document does not support a field, leave it null or leave the list empty.";

/// Instruction that the tool call is the only accepted output channel.
pub const TOOL_ONLY_INSTRUCTION: &str = "\
    Respond ONLY by calling the provided tool exactly once. \
    Do NOT include prose, explanations, or apologies.";

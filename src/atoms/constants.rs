// ── Atoms: Constants ───────────────────────────────────────────────────────
// All named constants for the crate live here.
// Rationale: collecting constants in one place eliminates magic strings and
// keeps the wire conventions auditable.

// ── Prompt marker ──────────────────────────────────────────────────────────
// The hosted model echoes the submitted prompt back into its output stream.
// Prompts are sent prefixed with this sentinel so the reconciler can find
// where the echo ends and the reply begins. Changing it breaks every
// in-flight conversation against a model fine-tuned on the old marker —
// treat as a stable wire convention.
pub const PROMPT_MARKER: &str = "[PROMPT]";

// ── Hosted model variant ───────────────────────────────────────────────────
// The one Llama 2 variant the endpoint currently serves. The version id is
// the hosted platform's immutable model-version hash.
pub const LLAMA2_PROMPTER_NAME: &str = "Llama 2 Prompter";
pub const LLAMA2_PROMPTER_SHORT: &str = "prompter";
pub const LLAMA2_PROMPTER_VERSION: &str =
    "4f815ea4e4d6d070cd00469d1960c303f15b9b5634a8faa0a0f0136a93a8acd5";

// ── Default inference parameters ───────────────────────────────────────────
// Starting values for the settings panel; the user can change them per
// session but they are what a fresh session requests.
pub const DEFAULT_TEMPERATURE: f64 = 0.75;
pub const DEFAULT_TOP_P: f64 = 0.9;
pub const DEFAULT_MAX_TOKENS: u32 = 100;

// ── Endpoint path ──────────────────────────────────────────────────────────
// The completion endpoint is mounted at this path on the hosted API origin.
pub const COMPLETION_PATH: &str = "/api";
